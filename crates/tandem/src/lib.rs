//! tandem: scenario-driven Expect engine for several terminal sessions
//!
//! This crate drives interactive command-line programs the way an operator
//! would: it starts them on pseudo-terminals, sends lines, and waits with
//! bounded timeouts for output patterns. A [`Scenario`] coordinates several
//! named sessions whose outputs depend on each other, for example a server
//! whose announced port a client on another terminal must connect to.
//!
//! # Features
//!
//! - **Async-first design** with the Tokio runtime
//! - **PTY sessions** via `tandem-pty`, with process-group termination
//! - **Pattern sets** of literals (ANSI-tolerant) and regexes, earliest
//!   match wins
//! - **Scenario driver** with ordered steps, captured variables and
//!   guaranteed teardown
//! - **Scenario files** in TOML and JSON outcome reports
//! - **Mock backend** with an ordered event log for deterministic tests
//!
//! # Example
//!
//! ```ignore
//! use tandem::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     tandem::logging::init(&LoggingConfig::default());
//!
//!     let scenario = Scenario::new("ping")
//!         .session("control", SessionConfig::shell())
//!         .send("control", "echo 64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=0.05 ms")
//!         .expect("control", ExpectStep::regex(r"64 bytes from .*time=\d+(\.\d+)? ms"))
//!         .teardown(Step::send("control", "exit"));
//!
//!     let outcome = ScenarioRunner::new().run(&scenario).await;
//!     println!("{outcome}");
//! }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod expect;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod prelude;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod types;

pub use backend::{PtySpawner, Spawned, Spawner};
pub use config::{
    BufferConfig, EngineConfig, LineEnding, LogFormat, LoggingConfig, SessionConfig,
    TerminateConfig, TimeoutConfig,
};
pub use driver::{FailureCause, FailureKind, ScenarioOutcome, ScenarioRunner};
pub use encoding::strip_ansi;
pub use error::{ExpectError, Result, SpawnError};
pub use expect::{find_match, Pattern, PatternMatch};
pub use registry::SessionRegistry;
pub use scenario::{ExpectStep, PatternSpec, Scenario, ScenarioFile, Step, Variables};
pub use session::Session;
pub use tandem_pty::{ExitStatus, PtySignal};
pub use types::{ControlChar, MatchResult, SessionState};
