//! Pattern types and the pattern-set matcher.
//!
//! Matching is a pure function of `(buffer, patterns)`: nothing here holds
//! state between calls or consumes input.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::encoding::strip_ansi_mapped;
use crate::error::{ExpectError, Result};

/// One alternative an `expect` waits for.
#[derive(Clone)]
pub enum Pattern {
    /// Match an exact string, ignoring ANSI escape sequences in the output.
    Literal(String),

    /// Match a regular expression against the raw output.
    Regex(CompiledRegex),
}

impl Pattern {
    /// Exact text, matched with escape sequences ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty string, which would match
    /// anywhere.
    pub fn literal(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(ExpectError::invalid_argument("empty literal pattern"));
        }
        Ok(Self::Literal(s))
    }

    /// A `regex` crate expression, matched against the raw output.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the regex does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        Ok(Self::Regex(CompiledRegex::new(pattern.to_string(), regex)))
    }

    /// Source text, for messages and reports.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Regex(r) => r.pattern(),
        }
    }

    /// Check if this is a literal pattern.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "Literal({s:?})"),
            Self::Regex(r) => write!(f, "Regex({:?})", r.pattern()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `Regex` that remembers the text it was built from.
#[derive(Clone)]
pub struct CompiledRegex {
    pattern: String,
    regex: Regex,
}

impl CompiledRegex {
    /// Pair an already compiled regex with its source.
    #[must_use]
    pub const fn new(pattern: String, regex: Regex) -> Self {
        Self { pattern, regex }
    }

    /// Text the regex was compiled from.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Get the compiled regex.
    #[must_use]
    pub const fn regex(&self) -> &Regex {
        &self.regex
    }

    fn first_match(&self, text: &str, index: usize) -> Option<PatternMatch> {
        let caps = self.regex.captures(text)?;
        let whole = caps.get(0)?;

        let captures = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();

        let named = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Some(PatternMatch {
            index,
            start: whole.start(),
            end: whole.end(),
            captures,
            named,
        })
    }
}

/// Where a pattern set matched in a buffer.
///
/// `start` and `end` are byte offsets into the raw buffer, so the caller
/// can consume exactly through the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Index of the winning pattern.
    pub index: usize,
    /// Start offset in the raw buffer.
    pub start: usize,
    /// End offset in the raw buffer (exclusive).
    pub end: usize,
    /// Capture groups 1.. for regex patterns.
    pub captures: Vec<Option<String>>,
    /// Named capture groups that participated.
    pub named: HashMap<String, String>,
}

impl PatternMatch {
    /// Get the matched text from the buffer it was found in.
    #[must_use]
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// Get the length of the match in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Zero-width match, e.g. from `^` or `a*`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Find the earliest match of any pattern in `buffer`.
///
/// The match with the smallest start offset wins; equal offsets go to the
/// pattern listed first. Literals are searched on the ANSI-stripped text
/// and mapped back onto raw offsets.
///
/// # Errors
///
/// Returns `InvalidArgument` if `patterns` is empty.
pub fn find_match(buffer: &str, patterns: &[Pattern]) -> Result<Option<PatternMatch>> {
    if patterns.is_empty() {
        return Err(ExpectError::invalid_argument("empty pattern list"));
    }

    let stripped = if buffer.contains('\x1b') && patterns.iter().any(Pattern::is_literal) {
        Some(strip_ansi_mapped(buffer))
    } else {
        None
    };

    let mut best: Option<PatternMatch> = None;
    for (index, pattern) in patterns.iter().enumerate() {
        let candidate = match pattern {
            Pattern::Literal(needle) => {
                let span = match &stripped {
                    Some(view) => view
                        .text
                        .find(needle.as_str())
                        .map(|pos| view.source_span(pos, pos + needle.len())),
                    None => buffer.find(needle.as_str()).map(|pos| (pos, pos + needle.len())),
                };
                span.map(|(start, end)| PatternMatch {
                    index,
                    start,
                    end,
                    captures: Vec::new(),
                    named: HashMap::new(),
                })
            }
            Pattern::Regex(compiled) => compiled.first_match(buffer, index),
        };

        if let Some(candidate) = candidate {
            match &best {
                Some(current) if candidate.start >= current.start => {}
                _ => best = Some(candidate),
            }
        }
    }

    Ok(best)
}

/// Render patterns for error messages.
#[must_use]
pub fn describe(patterns: &[Pattern]) -> Vec<String> {
    patterns.iter().map(|p| p.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches() {
        let patterns = [Pattern::literal("hello").unwrap()];
        let m = find_match("say hello world", &patterns).unwrap().unwrap();
        assert_eq!((m.start, m.end), (4, 9));
        assert_eq!(m.as_str("say hello world"), "hello");
    }

    #[test]
    fn empty_inputs_rejected() {
        assert!(matches!(
            Pattern::literal(""),
            Err(ExpectError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Pattern::regex("(unclosed"),
            Err(ExpectError::InvalidArgument { .. })
        ));
        assert!(matches!(
            find_match("anything", &[]),
            Err(ExpectError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn earliest_start_wins() {
        let patterns = [
            Pattern::literal("world").unwrap(),
            Pattern::literal("hello").unwrap(),
        ];
        let m = find_match("hello world", &patterns).unwrap().unwrap();
        assert_eq!(m.index, 1);
    }

    #[test]
    fn tie_goes_to_first_listed() {
        let patterns = [
            Pattern::regex(r"Succ\w+").unwrap(),
            Pattern::literal("Successfully installed").unwrap(),
        ];
        let m = find_match("Successfully installed kytos", &patterns)
            .unwrap()
            .unwrap();
        assert_eq!(m.index, 0);
    }

    #[test]
    fn regex_captures_and_names() {
        let patterns = [Pattern::regex(r"time=(?P<rtt>\d+(\.\d+)?) ms(x)?").unwrap()];
        let text = "64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=0.05 ms";
        let m = find_match(text, &patterns).unwrap().unwrap();
        assert_eq!(m.captures, vec![Some("0.05".into()), Some(".05".into()), None]);
        assert_eq!(m.named.get("rtt").map(String::as_str), Some("0.05"));
    }

    #[test]
    fn literal_ignores_color_codes() {
        let raw = "\x1b[1;32mkytos \x1b[0m$> ";
        let patterns = [Pattern::literal("kytos $>").unwrap()];
        let m = find_match(raw, &patterns).unwrap().unwrap();
        assert_eq!(m.as_str(raw), "kytos \x1b[0m$>");
        assert_eq!(&raw[m.end..], " ");
    }

    #[test]
    fn regex_sees_raw_text() {
        let raw = "\x1b[1mkytos\x1b[0m $>";
        let strict = [Pattern::regex(r"kytos \$>").unwrap()];
        assert!(find_match(raw, &strict).unwrap().is_none());

        let tolerant = [Pattern::regex(r"kytos.*\$>").unwrap()];
        assert!(find_match(raw, &tolerant).unwrap().is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let patterns = [Pattern::literal("absent").unwrap()];
        assert!(find_match("present", &patterns).unwrap().is_none());
    }

    #[test]
    fn describe_lists_sources() {
        let patterns = [
            Pattern::literal("a").unwrap(),
            Pattern::regex(r"b\d").unwrap(),
        ];
        assert_eq!(describe(&patterns), vec!["a".to_string(), r"b\d".to_string()]);
    }
}
