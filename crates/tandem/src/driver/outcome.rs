//! Scenario results.
//!
//! Everything here is `Serialize`, so a run can be written out as a JSON
//! report with [`ScenarioOutcome::to_json`].

use std::fmt;

use serde::Serialize;
use tandem_pty::ExitStatus;

use crate::error::ExpectError;
use crate::scenario::Variables;
use crate::types::SessionState;

/// Driver state machine.
///
/// `Idle → SettingUp → Running → TearingDown → Done`, or `Failed` in place
/// of `Done` when setup or a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Not started.
    Idle,
    /// Spawning sessions.
    SettingUp,
    /// Running steps.
    Running,
    /// Running teardown and terminating sessions.
    TearingDown,
    /// Finished and passed.
    Done,
    /// Finished and failed.
    Failed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::SettingUp => "setting up",
            Self::Running => "running",
            Self::TearingDown => "tearing down",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// While spawning sessions.
    Setup,
    /// While running steps.
    Steps,
}

/// How a session ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FinalState {
    /// Never spawned.
    NotStarted,
    /// Still running. Only seen if termination failed.
    Running,
    /// Exited with a code.
    Exited {
        /// Exit code.
        code: i32,
    },
    /// Killed by a signal.
    Signaled {
        /// Signal number.
        signal: i32,
    },
}

impl From<ExitStatus> for FinalState {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Exited(code) => Self::Exited { code },
            ExitStatus::Signaled(signal) => Self::Signaled { signal },
        }
    }
}

impl From<SessionState> for FinalState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::NotStarted => Self::NotStarted,
            SessionState::Running => Self::Running,
            SessionState::Terminated(status) => status.into(),
        }
    }
}

/// Classification of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// A process could not be started.
    Spawn,
    /// A step addressed a session that was not running.
    SessionNotRunning,
    /// No pattern matched in time.
    Timeout,
    /// The process exited before a match.
    ProcessExited {
        /// How it exited.
        exit: FinalState,
    },
    /// A malformed step or pattern.
    InvalidArgument,
    /// Terminal I/O failed.
    Io,
    /// An alternative listed in `fail_on` matched.
    UnexpectedMatch {
        /// Index of the matched alternative.
        index: usize,
        /// The matched text.
        matched: String,
    },
    /// The abort signal fired.
    Aborted,
}

impl FailureKind {
    /// Classify an engine error.
    #[must_use]
    pub fn of(err: &ExpectError) -> Self {
        match err {
            ExpectError::Spawn(_) => Self::Spawn,
            ExpectError::SessionNotRunning { .. } => Self::SessionNotRunning,
            ExpectError::Timeout { .. } => Self::Timeout,
            ExpectError::ProcessExited { status, .. } => Self::ProcessExited {
                exit: (*status).into(),
            },
            ExpectError::InvalidArgument { .. } => Self::InvalidArgument,
            ExpectError::Io { .. } => Self::Io,
        }
    }
}

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    /// Setup or steps.
    pub phase: Phase,
    /// Index of the failing step.
    pub step: Option<usize>,
    /// Session involved, if any.
    pub session: Option<String>,
    /// What went wrong.
    #[serde(flatten)]
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// Unconsumed output at the time, for timeouts and early exits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
}

impl FailureCause {
    /// Build a cause from an engine error.
    #[must_use]
    pub fn from_error(
        phase: Phase,
        step: Option<usize>,
        session: Option<&str>,
        err: &ExpectError,
    ) -> Self {
        Self {
            phase,
            step,
            session: session.map(str::to_string),
            kind: FailureKind::of(err),
            message: err.to_string(),
            buffer: err.buffer().map(str::to_string),
        }
    }

    /// A `fail_on` alternative matched.
    #[must_use]
    pub fn unexpected_match(step: usize, session: &str, index: usize, matched: String) -> Self {
        Self {
            phase: Phase::Steps,
            step: Some(step),
            session: Some(session.to_string()),
            message: format!("matched failure alternative [{index}] {matched:?}"),
            kind: FailureKind::UnexpectedMatch { index, matched },
            buffer: None,
        }
    }

    /// The abort signal fired.
    #[must_use]
    pub fn aborted(phase: Phase, step: Option<usize>) -> Self {
        Self {
            phase,
            step,
            session: None,
            kind: FailureKind::Aborted,
            message: "scenario aborted".to_string(),
            buffer: None,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.phase, self.step) {
            (Phase::Setup, _) => write!(f, "setup failed")?,
            (Phase::Steps, Some(step)) => write!(f, "step {step} failed")?,
            (Phase::Steps, None) => write!(f, "steps failed")?,
        }
        if let Some(session) = &self.session {
            write!(f, " on session '{session}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// A match recorded for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// Index of the alternative that matched.
    pub index: usize,
    /// The matched text.
    pub text: String,
}

/// A step that completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Position in the step list.
    pub index: usize,
    /// Session addressed, if any.
    pub session: Option<String>,
    /// What the step did.
    pub description: String,
    /// The match, for expect steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchRecord>,
    /// Wall-clock time spent.
    pub duration_ms: u64,
}

/// Final state of one declared session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Session name.
    pub name: String,
    /// How it ended.
    #[serde(flatten)]
    pub state: FinalState,
}

/// Result of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    /// Scenario name.
    pub scenario: String,
    /// `Done` or `Failed`.
    pub state: DriverState,
    /// The first failure, if any.
    pub cause: Option<FailureCause>,
    /// Steps that completed, in order.
    pub steps: Vec<StepRecord>,
    /// Teardown problems. Never turn a pass into a failure.
    pub warnings: Vec<String>,
    /// Declared sessions after teardown, in declaration order.
    pub sessions: Vec<SessionReport>,
    /// Variables at the end of the run, including captures.
    pub variables: Variables,
    /// Wall-clock time of the whole run.
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    /// Check if every step passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.cause.is_none()
    }

    /// Final state of a session.
    #[must_use]
    pub fn session(&self, name: &str) -> Option<FinalState> {
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.state)
    }

    /// Pretty-printed JSON report.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which does not occur for these types
    /// in practice.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            None => write!(
                f,
                "scenario '{}' passed ({} steps)",
                self.scenario,
                self.steps.len()
            ),
            Some(cause) => write!(f, "scenario '{}' failed: {cause}", self.scenario),
        }
    }
}
