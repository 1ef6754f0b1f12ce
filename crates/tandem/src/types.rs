//! Values returned by sessions: match results, lifecycle state and
//! control keys.

use std::collections::HashMap;
use std::fmt;

use tandem_pty::ExitStatus;

/// What a successful `expect` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Position of the winning pattern in the list passed to `expect`.
    pub index: usize,

    /// Matched text as the terminal sent it, escapes and all.
    pub matched: String,

    /// Regex groups from 1 up. `None` where an optional group did not take part.
    pub captures: Vec<Option<String>>,

    /// Named groups that took part.
    pub named: HashMap<String, String>,

    /// Text skipped over to reach the match. It is consumed too.
    pub before: String,
}

impl MatchResult {
    /// Group `n`; 0 is the whole match.
    #[must_use]
    pub fn group(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return Some(&self.matched);
        }
        self.captures.get(n - 1).and_then(Option::as_deref)
    }

    /// Group by name.
    #[must_use]
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Same as `group(0)`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.matched
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.matched)
    }
}

/// Lifecycle state of a session.
///
/// `Terminated` is permanent: a session never returns to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Declared but not yet spawned.
    NotStarted,

    /// The process is attached and accepting input.
    Running,

    /// The process has ended and been reaped.
    Terminated(ExitStatus),
}

impl SessionState {
    /// The only state that accepts `send` and `expect`.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Final status, once terminated.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        if let Self::Terminated(status) = self {
            Some(*status)
        } else {
            None
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Terminated(status) => write!(f, "terminated ({status})"),
        }
    }
}

/// A key pressed together with Ctrl, sent as its single control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChar {
    /// `^C`, interrupt.
    CtrlC,
    /// `^D`, end of input on an empty line.
    CtrlD,
    /// `^L`, redraw.
    CtrlL,
    /// `^U`, erase the line typed so far.
    CtrlU,
    /// `^Z`, suspend.
    CtrlZ,
    /// `^\`, quit with core.
    CtrlBackslash,
    /// `^[`, i.e. Esc.
    Escape,
}

impl ControlChar {
    const ALL: [Self; 7] = [
        Self::CtrlC,
        Self::CtrlD,
        Self::CtrlL,
        Self::CtrlU,
        Self::CtrlZ,
        Self::CtrlBackslash,
        Self::Escape,
    ];

    /// The character after the caret in `^X` notation.
    const fn caret(self) -> u8 {
        match self {
            Self::CtrlC => b'C',
            Self::CtrlD => b'D',
            Self::CtrlL => b'L',
            Self::CtrlU => b'U',
            Self::CtrlZ => b'Z',
            Self::CtrlBackslash => b'\\',
            Self::Escape => b'[',
        }
    }

    /// The byte the terminal receives. Ctrl clears bit 6.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.caret() ^ 0x40
    }

    /// Look up by key, case-insensitive: `'c'` and `'C'` both give `CtrlC`.
    #[must_use]
    pub fn from_char(key: char) -> Option<Self> {
        let key = key.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| char::from(c.caret()) == key)
    }
}

impl From<ControlChar> for u8 {
    fn from(c: ControlChar) -> Self {
        c.as_byte()
    }
}

impl fmt::Display for ControlChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", char::from(self.caret()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_groups() {
        let m = MatchResult {
            index: 1,
            matched: "time=0.05 ms".into(),
            captures: vec![Some("0.05".into()), None],
            named: HashMap::from([("rtt".to_string(), "0.05".to_string())]),
            before: String::new(),
        };
        assert_eq!(m.group(0), Some("time=0.05 ms"));
        assert_eq!(m.group(1), Some("0.05"));
        assert_eq!(m.group(2), None);
        assert_eq!(m.group(3), None);
        assert_eq!(m.name("rtt"), Some("0.05"));
        assert_eq!(m.to_string(), "time=0.05 ms");
    }

    #[test]
    fn state_predicates() {
        assert!(SessionState::Running.is_running());
        assert!(!SessionState::NotStarted.is_running());
        let done = SessionState::Terminated(ExitStatus::Signaled(1));
        assert_eq!(done.exit_status(), Some(ExitStatus::Signaled(1)));
        assert_eq!(done.to_string(), "terminated (killed by SIGHUP)");
    }

    #[test]
    fn control_chars() {
        let bytes: Vec<u8> = ControlChar::ALL.into_iter().map(u8::from).collect();
        assert_eq!(bytes, [0x03, 0x04, 0x0c, 0x15, 0x1a, 0x1c, 0x1b]);

        assert_eq!(ControlChar::from_char('c'), Some(ControlChar::CtrlC));
        assert_eq!(ControlChar::from_char('\\'), Some(ControlChar::CtrlBackslash));
        assert_eq!(ControlChar::from_char('['), Some(ControlChar::Escape));
        assert_eq!(ControlChar::from_char('q'), None);
        assert_eq!(ControlChar::CtrlBackslash.to_string(), "^\\");
    }
}
