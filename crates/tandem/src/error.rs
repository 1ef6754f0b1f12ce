//! Error types for tandem.
//!
//! Errors carry enough context to diagnose a failed scenario on their own:
//! a timeout or early exit includes the unconsumed output that was on
//! screen when it happened.

use std::fmt::Write as _;
use std::time::Duration;

use tandem_pty::{ExitStatus, PtyError};
use thiserror::Error;

use crate::types::SessionState;

/// Output longer than this is shown by its last lines only.
const SNIPPET_BYTES: usize = 500;

/// Lines kept from the end of a long output.
const SNIPPET_TAIL: usize = 6;

/// Render unconsumed output for an error message, keeping the tail.
fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "unconsumed output: (empty buffer)".to_string();
    }

    let lines: Vec<&str> = buffer.lines().collect();
    let shown = if buffer.len() > SNIPPET_BYTES {
        &lines[lines.len().saturating_sub(SNIPPET_TAIL)..]
    } else {
        &lines[..]
    };

    let mut out = format!("unconsumed output ({} bytes):", buffer.len());
    let hidden = lines.len() - shown.len();
    if hidden > 0 {
        let _ = write!(out, "\n  | ... {hidden} earlier lines hidden");
    }
    for line in shown {
        out.push_str("\n  | ");
        out.push_str(line);
    }
    out
}

fn format_patterns(patterns: &[String]) -> String {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  [{i}] '{p}'"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_timeout_error(
    duration: Duration,
    patterns: &[String],
    buffer: &str,
    discarded: usize,
) -> String {
    let mut out = format!(
        "no match within {duration:?} for\n\
         {}\n\
         \n\
         {}",
        format_patterns(patterns),
        format_buffer_snippet(buffer)
    );
    if discarded > 0 {
        let _ = write!(
            out,
            "\n\n{discarded} bytes of older output were dropped when the buffer filled; \
             a match may have been lost"
        );
    }
    out
}

fn format_process_exited_error(status: ExitStatus, buffer: &str) -> String {
    format!(
        "process ended ({status}) before any pattern matched\n\
         \n\
         {}",
        format_buffer_snippet(buffer)
    )
}

/// Failure of a session operation.
#[derive(Debug, Error)]
pub enum ExpectError {
    /// The program never started.
    #[error("spawn: {0}")]
    Spawn(#[from] SpawnError),

    /// Send or expect on a session that is not `Running`.
    #[error("session '{session}' is {state}")]
    SessionNotRunning {
        /// Session name.
        session: String,
        /// Where it actually is.
        state: SessionState,
    },

    /// The deadline passed with no pattern matching.
    #[error("{}", format_timeout_error(*duration, patterns, buffer, *discarded))]
    Timeout {
        /// How long we waited.
        duration: Duration,
        /// Display form of each pattern, in order.
        patterns: Vec<String>,
        /// What was on screen and unconsumed.
        buffer: String,
        /// Unconsumed bytes lost to buffer overflow since the last match.
        discarded: usize,
    },

    /// End of output reached and the child reaped, nothing matched.
    #[error("{}", format_process_exited_error(*status, buffer))]
    ProcessExited {
        /// Reaped status.
        status: ExitStatus,
        /// Output it left behind, unconsumed.
        buffer: String,
    },

    /// Bad input, e.g. an empty pattern list or a regex that will not compile.
    #[error("{message}")]
    InvalidArgument {
        /// Human-readable description.
        message: String,
    },

    /// Reading or writing the terminal failed.
    #[error("{context}: {source}")]
    Io {
        /// e.g. `write to 'mininet'`.
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a program could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Nothing executable by that name on `PATH`.
    #[error("no such program '{command}'")]
    CommandNotFound {
        /// As configured.
        command: String,
    },

    /// Found but not executable by us.
    #[error("'{path}' is not executable")]
    PermissionDenied {
        /// As configured.
        path: String,
    },

    /// `working_dir` is missing or is not a directory.
    #[error("working directory '{path}' does not exist")]
    InvalidWorkingDir {
        /// As configured.
        path: String,
    },

    /// The terminal itself could not be set up.
    #[error("no pty: {reason}")]
    PtyAllocation {
        /// OS error text.
        reason: String,
    },

    /// Program or argument rejected before exec.
    #[error("{kind} '{value}' {reason}")]
    InvalidArgument {
        /// `program`, `argument[0]` and so on.
        kind: String,
        /// The offending text.
        value: String,
        /// e.g. `contains a NUL byte`.
        reason: String,
    },

    /// Any other OS error from fork/exec.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, ExpectError>;

impl ExpectError {
    /// A [`Timeout`](Self::Timeout) with nothing discarded.
    pub fn timeout(duration: Duration, patterns: Vec<String>, buffer: impl Into<String>) -> Self {
        Self::Timeout {
            duration,
            patterns,
            buffer: buffer.into(),
            discarded: 0,
        }
    }

    /// Record how much unconsumed output a timeout lost to overflow.
    #[must_use]
    pub fn with_discarded(self, bytes: usize) -> Self {
        match self {
            Self::Timeout {
                duration,
                patterns,
                buffer,
                ..
            } => Self::Timeout {
                duration,
                patterns,
                buffer,
                discarded: bytes,
            },
            other => other,
        }
    }

    /// A [`ProcessExited`](Self::ProcessExited).
    pub fn process_exited(status: ExitStatus, buffer: impl Into<String>) -> Self {
        Self::ProcessExited {
            status,
            buffer: buffer.into(),
        }
    }

    /// A [`SessionNotRunning`](Self::SessionNotRunning).
    pub fn not_running(session: impl Into<String>, state: SessionState) -> Self {
        Self::SessionNotRunning {
            session: session.into(),
            state,
        }
    }

    /// An [`InvalidArgument`](Self::InvalidArgument) with this message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// An [`Io`](Self::Io) naming what we were doing.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Map the error side of `result` through [`io_context`](Self::io_context).
    pub fn with_io_context<T>(result: std::io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// Whether the deadline passed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the child went away first.
    #[must_use]
    pub const fn is_process_exited(&self) -> bool {
        matches!(self, Self::ProcessExited { .. })
    }

    /// Unconsumed output, for the two errors that capture it.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        match self {
            Self::Timeout { buffer, .. } | Self::ProcessExited { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

impl From<regex::Error> for ExpectError {
    fn from(err: regex::Error) -> Self {
        Self::invalid_argument(format!("invalid regex: {err}"))
    }
}

impl SpawnError {
    /// A [`CommandNotFound`](Self::CommandNotFound).
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    /// A [`PermissionDenied`](Self::PermissionDenied).
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// An [`InvalidWorkingDir`](Self::InvalidWorkingDir).
    pub fn invalid_working_dir(path: impl Into<String>) -> Self {
        Self::InvalidWorkingDir { path: path.into() }
    }

    /// A [`PtyAllocation`](Self::PtyAllocation).
    pub fn pty_allocation(reason: impl Into<String>) -> Self {
        Self::PtyAllocation {
            reason: reason.into(),
        }
    }

    /// Turn a PTY failure during spawn into something a user can act on.
    #[must_use]
    pub fn from_pty(err: PtyError, command: &str, args: &[String]) -> Self {
        match err {
            PtyError::Create(e) | PtyError::SetAttributes(e) | PtyError::Resize(e) => {
                Self::pty_allocation(e.to_string())
            }
            PtyError::Spawn(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Self::command_not_found(command),
                std::io::ErrorKind::PermissionDenied => Self::permission_denied(command),
                _ => Self::Io(e),
            },
            PtyError::NulByte { kind } => {
                let value = kind
                    .strip_prefix("argument[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| args.get(idx))
                    .map_or_else(|| command.to_string(), Clone::clone);
                Self::InvalidArgument {
                    kind,
                    value,
                    reason: "contains a NUL byte".to_string(),
                }
            }
            PtyError::Io(e) | PtyError::Signal(e) | PtyError::Wait(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_lists_patterns_and_buffer() {
        let err = ExpectError::timeout(
            Duration::from_secs(5),
            vec!["Fast-forward".into(), "up-to-date".into()],
            "git pull\nremote: counting objects\n",
        );
        let msg = err.to_string();
        assert!(msg.contains("no match within 5s"));
        assert!(msg.contains("[0] 'Fast-forward'"));
        assert!(msg.contains("[1] 'up-to-date'"));
        assert!(msg.contains("counting objects"));
        assert!(msg.contains("unconsumed output"));
    }

    #[test]
    fn timeout_reports_dropped_output() {
        let err = ExpectError::timeout(Duration::from_secs(1), vec!["done".into()], "tail")
            .with_discarded(4096);
        assert!(matches!(err, ExpectError::Timeout { discarded: 4096, .. }));
        assert!(err.to_string().contains("4096 bytes of older output were dropped"));

        let quiet = ExpectError::timeout(Duration::from_secs(1), vec!["done".into()], "tail");
        assert!(!quiet.to_string().contains("dropped"));
    }

    #[test]
    fn process_exited_display() {
        let err = ExpectError::process_exited(ExitStatus::Exited(2), "");
        let msg = err.to_string();
        assert!(msg.contains("ended (exit code 2)"));
        assert!(msg.contains("empty buffer"));
    }

    #[test]
    fn large_buffer_is_truncated() {
        let large_buffer: String = (0..50).fold(String::new(), |mut acc, i| {
            use std::fmt::Write;
            let _ = writeln!(acc, "Line {i}: Some content here");
            acc
        });

        let err = ExpectError::timeout(Duration::from_secs(1), vec!["x".into()], &large_buffer);
        let msg = err.to_string();

        assert!(msg.contains("earlier lines hidden"));
        assert!(msg.contains("Line 49"));
        assert!(!msg.contains("Line 10:"));
    }

    #[test]
    fn buffer_accessor() {
        let err = ExpectError::timeout(Duration::from_secs(1), vec![], "the buffer");
        assert_eq!(err.buffer(), Some("the buffer"));
        assert!(err.is_timeout());

        let other = ExpectError::invalid_argument("nope");
        assert!(other.buffer().is_none());
        assert!(!other.is_timeout());
    }

    #[test]
    fn regex_error_is_invalid_argument() {
        let err: ExpectError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, ExpectError::InvalidArgument { .. }));
    }

    #[test]
    fn not_running_display() {
        let err = ExpectError::not_running("control", SessionState::NotStarted);
        assert_eq!(
            err.to_string(),
            "session 'control' is not started"
        );
    }

    #[test]
    fn with_io_context_helper() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        let err = ExpectError::with_io_context(result, "writing to session 'a'").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("writing to session 'a'"));
        assert!(msg.contains("pipe closed"));
    }

    #[test]
    fn spawn_error_classification() {
        let not_found = PtyError::Spawn(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(
            SpawnError::from_pty(not_found, "nope", &[]),
            SpawnError::CommandNotFound { ref command } if command == "nope"
        ));

        let denied = PtyError::Spawn(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(
            SpawnError::from_pty(denied, "/etc/passwd", &[]),
            SpawnError::PermissionDenied { .. }
        ));

        let nul = PtyError::NulByte {
            kind: "argument[1]".into(),
        };
        let args = vec!["ok".to_string(), "bad\0".to_string()];
        assert!(matches!(
            SpawnError::from_pty(nul, "echo", &args),
            SpawnError::InvalidArgument { ref value, .. } if value == "bad\0"
        ));
    }
}
