//! Scenarios: declared sessions, ordered steps and teardown.
//!
//! A [`Scenario`] is plain data. Build it in code with the builder methods
//! or load it from TOML with [`ScenarioFile`], then hand it to a
//! [`ScenarioRunner`](crate::driver::ScenarioRunner).

mod definition;
mod file;
mod variables;

pub use definition::{ExpectStep, PatternSpec, Scenario, SessionSpec, Step};
pub use file::{
    LineEndingEntry, PatternEntry, PatternList, ScenarioFile, SessionEntry, StepEntry,
};
pub use variables::Variables;
