//! Backends that start session processes.
//!
//! A [`Spawner`] turns a [`SessionConfig`] into a running process with a
//! terminal stream. [`PtySpawner`] starts real processes on pseudo-terminals;
//! `MockSpawner`, behind the `mock` feature, plays scripted ones for tests.

mod pty;

use std::future::Future;

pub use pty::PtySpawner;
use tandem_pty::PtyChild;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::SessionConfig;
use crate::error::SpawnError;

/// Boxed reading half of a session's terminal.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed writing half of a session's terminal.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A freshly started process and its terminal stream.
pub struct Spawned {
    /// Output from the process.
    pub reader: BoxReader,
    /// Input to the process.
    pub writer: BoxWriter,
    /// Lifetime and signal handle.
    pub process: Box<dyn PtyChild>,
}

impl Spawned {
    /// Bundle the parts of a spawned process.
    pub fn new<R, W, C>(reader: R, writer: W, process: C) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        C: PtyChild + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: Box::new(process),
        }
    }
}

impl std::fmt::Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawned")
            .field("pid", &self.process.pid())
            .finish_non_exhaustive()
    }
}

/// Starts session processes.
pub trait Spawner: Send + Sync {
    /// Start the process described by `config` for the session `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnError`] if the process could not be started. No
    /// process is left behind in that case.
    fn spawn(
        &self,
        name: &str,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Spawned, SpawnError>> + Send;
}
