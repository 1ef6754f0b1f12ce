//! Scenario driver.
//!
//! [`ScenarioRunner`] owns a [`SessionRegistry`](crate::registry::SessionRegistry)
//! for each run. It spawns the declared sessions in order, runs the steps one
//! at a time, and always finishes with teardown. The result is a
//! [`ScenarioOutcome`]: passed, or failed with exactly one [`FailureCause`],
//! plus any teardown warnings.

mod outcome;
mod runner;

pub use outcome::{
    DriverState, FailureCause, FailureKind, FinalState, MatchRecord, Phase, ScenarioOutcome,
    SessionReport, StepRecord,
};
pub use runner::ScenarioRunner;
