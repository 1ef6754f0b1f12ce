//! Expect pattern matching module.
//!
//! Pattern types, the pure pattern-set matcher, and the per-session buffer
//! that matches are consumed from.

mod buffer;
mod pattern;

pub use buffer::{OutputBuffer, DEFAULT_MAX_SIZE};
pub use pattern::{describe, find_match, CompiledRegex, Pattern, PatternMatch};
