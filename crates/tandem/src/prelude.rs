//! Convenient re-exports for common tandem usage.
//!
//! ```ignore
//! use tandem::prelude::*;
//! ```

// Configuration
pub use crate::config::{
    BufferConfig, EngineConfig, LineEnding, LogFormat, LoggingConfig, SessionConfig,
    TerminateConfig, TimeoutConfig,
};

// Error handling
pub use crate::error::{ExpectError, Result, SpawnError};

// Common types
pub use crate::types::{ControlChar, MatchResult, SessionState};
pub use tandem_pty::{ExitStatus, PtySignal};

// Sessions and patterns
pub use crate::expect::Pattern;
pub use crate::session::Session;

// Scenarios
pub use crate::driver::{FailureKind, ScenarioOutcome, ScenarioRunner};
pub use crate::scenario::{ExpectStep, PatternSpec, Scenario, ScenarioFile, Step};
