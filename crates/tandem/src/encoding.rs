//! Text handling for raw terminal output.
//!
//! Output arrives as arbitrary byte chunks. [`Utf8Decoder`] turns them into
//! text without corrupting characters split across chunk boundaries, and
//! [`strip_ansi_mapped`] produces an escape-free view of that text that can
//! be mapped back onto the original offsets.

use std::borrow::Cow;

/// Streaming UTF-8 decoder.
///
/// Incomplete trailing sequences are held back until the next chunk.
/// Invalid bytes become U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    replacements: usize,
}

impl Utf8Decoder {
    /// Create a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning the text that is complete so far.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        let owned;
        let mut input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            self.pending.extend_from_slice(chunk);
            owned = std::mem::take(&mut self.pending);
            &owned
        };

        let mut out = String::with_capacity(input.len());
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.replacements += 1;
                            input = &rest[len..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush any held-back bytes as replacement characters.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.replacements += 1;
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Number of bytes held back waiting for the rest of a character.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of replacement characters emitted so far.
    #[must_use]
    pub const fn replacements(&self) -> usize {
        self.replacements
    }
}

/// Text with escape sequences removed, plus a map back to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedText {
    /// The visible text.
    pub text: String,
    /// For every byte of `text`, its byte offset in the source.
    offsets: Vec<usize>,
}

impl StrippedText {
    /// Map a byte span of the stripped text onto the source text.
    ///
    /// The returned span covers any escape sequences embedded inside the
    /// visible span, but not those surrounding it.
    #[must_use]
    pub fn source_span(&self, start: usize, end: usize) -> (usize, usize) {
        debug_assert!(start < end && end <= self.offsets.len());
        (self.offsets[start], self.offsets[end - 1] + 1)
    }
}

/// Skip over one escape sequence whose `ESC` has already been consumed.
///
/// Recognizes CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL` or `ESC \`),
/// charset designation (`ESC ( X`) and two-byte `ESC X` forms.
fn skip_escape<I>(chars: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = (usize, char)>,
{
    let Some(&(_, next)) = chars.peek() else {
        return;
    };

    match next {
        '[' => {
            chars.next();
            while let Some(&(_, param)) = chars.peek() {
                chars.next();
                if param.is_ascii_alphabetic() || param == '@' || param == '`' || param == '~' {
                    break;
                }
            }
        }
        ']' => {
            chars.next();
            while let Some((_, osc_char)) = chars.next() {
                if osc_char == '\x07' {
                    break;
                }
                if osc_char == '\x1b' {
                    if matches!(chars.peek(), Some(&(_, '\\'))) {
                        chars.next();
                    }
                    break;
                }
            }
        }
        '(' | ')' | '*' | '+' => {
            chars.next();
            chars.next();
        }
        _ if next.is_ascii_uppercase() || next == '=' || next == '>' => {
            chars.next();
        }
        _ => {}
    }
}

/// Strip ANSI escape sequences, keeping a byte map back to `text`.
#[must_use]
pub fn strip_ansi_mapped(text: &str) -> StrippedText {
    let mut out = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c == '\x1b' {
            skip_escape(&mut chars);
        } else {
            out.push(c);
            offsets.extend(idx..idx + c.len_utf8());
        }
    }

    StrippedText { text: out, offsets }
}

/// Strip ANSI escape sequences from text.
///
/// Returns the input unchanged when it contains no `ESC`.
#[must_use]
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(strip_ansi_mapped(text).text)
}
