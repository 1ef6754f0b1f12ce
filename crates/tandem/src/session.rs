//! Session module for driving one spawned process.
//!
//! A [`Session`] owns a process on a terminal, a background task draining
//! its output, and the buffer of output not yet consumed by a match.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tandem::{Pattern, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tandem::ExpectError> {
//!     let mut session = Session::spawn("shell", SessionConfig::shell()).await?;
//!
//!     session.send("echo $((6 * 7))").await?;
//!     let m = session
//!         .expect(&[Pattern::regex(r"\n(\d+)\r?\n")?], Duration::from_secs(5))
//!         .await?;
//!     assert_eq!(m.group(1), Some("42"));
//!
//!     session.terminate().await?;
//!     Ok(())
//! }
//! ```

mod handle;
mod lifecycle;
mod reader;

pub use handle::Session;
