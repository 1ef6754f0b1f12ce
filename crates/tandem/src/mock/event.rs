//! Scripted events and the shared event log.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tandem_pty::ExitStatus;

/// A step a mock program performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Write text to the terminal.
    Output(String),
    /// Pause before the next event.
    Delay(Duration),
    /// Exit with the given code.
    Exit(i32),
}

impl MockEvent {
    /// Create an output event.
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output(text.into())
    }

    /// Create a delay event.
    #[must_use]
    pub const fn delay(duration: Duration) -> Self {
        Self::Delay(duration)
    }

    /// Create a delay event from milliseconds.
    #[must_use]
    pub const fn delay_ms(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }

    /// Create an exit event.
    #[must_use]
    pub const fn exit(code: i32) -> Self {
        Self::Exit(code)
    }
}

/// What happened in a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// The program was started.
    Spawned,
    /// The program received a line of input.
    Input(String),
    /// The program wrote output.
    Output(String),
    /// The program received a signal.
    Signal(i32),
    /// The program exited.
    Exited(ExitStatus),
}

/// One entry in an [`EventLog`].
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Session the event belongs to.
    pub session: String,
    /// What happened.
    pub kind: LogKind,
    /// When it happened.
    pub at: Instant,
}

/// Ordered record of everything mock programs did, across sessions.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn record(&self, session: &str, kind: LogKind) {
        let entry = LogEntry {
            session: session.to_string(),
            kind,
            at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of all entries in the order they happened.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries for one session.
    #[must_use]
    pub fn for_session(&self, session: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.session == session)
            .collect()
    }

    /// Index of the first entry matching `predicate`.
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&LogEntry) -> bool,
    {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(predicate)
    }

    /// Index of the first output from `session` containing `text`.
    #[must_use]
    pub fn output_position(&self, session: &str, text: &str) -> Option<usize> {
        self.position(|e| {
            e.session == session && matches!(&e.kind, LogKind::Output(out) if out.contains(text))
        })
    }

    /// Index of the first input to `session` containing `text`.
    #[must_use]
    pub fn input_position(&self, session: &str, text: &str) -> Option<usize> {
        self.position(|e| {
            e.session == session && matches!(&e.kind, LogKind::Input(line) if line.contains(text))
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
