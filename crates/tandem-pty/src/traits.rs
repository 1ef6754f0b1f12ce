//! The two seams of the crate: starting a child on a PTY ([`PtySystem`])
//! and controlling it afterwards ([`PtyChild`]).

use std::ffi::OsStr;
use std::future::Future;

use futures::future::BoxFuture;

use crate::config::{PtyConfig, PtySignal};
use crate::error::Result;

/// A running (or reaped) child on a PTY.
///
/// The terminal stream lives in the reader and writer halves; this handle
/// only concerns the process. Once a status has been observed it is cached
/// and every later query returns it.
pub trait PtyChild: Send {
    /// Process id. Also the id of the child's process group.
    fn pid(&self) -> u32;

    /// Cached status, `None` until the child has been reaped.
    fn exit_status(&self) -> Option<ExitStatus>;

    /// Not yet reaped.
    fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Resolve once the child exits.
    ///
    /// Dropping the future before it resolves has no effect on the child.
    fn wait(&mut self) -> BoxFuture<'_, Result<ExitStatus>>;

    /// Non-blocking version of [`wait`](Self::wait).
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Deliver `signal` to the whole process group.
    ///
    /// Does nothing once the child has been reaped, so a recycled pid is
    /// never hit.
    fn signal(&self, signal: PtySignal) -> Result<()>;

    /// Shorthand for `signal(PtySignal::Kill)`.
    fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Called `exit` with this code.
    Exited(i32),
    /// Killed by this signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Exit code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The code passed to `exit`, if it exited.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        if let Self::Exited(code) = *self { Some(code) } else { None }
    }

    /// The fatal signal, if it was killed.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        if let Self::Signaled(sig) = *self { Some(sig) } else { None }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(sig) => match signal_name(sig) {
                Some(name) => write!(f, "killed by {name}"),
                None => write!(f, "killed by signal {sig}"),
            },
        }
    }
}

#[cfg(unix)]
fn signal_name(sig: i32) -> Option<&'static str> {
    [
        PtySignal::Interrupt,
        PtySignal::Terminate,
        PtySignal::Kill,
        PtySignal::Hangup,
        PtySignal::Continue,
    ]
    .into_iter()
    .find(|s| s.as_unix_signal() == sig)
    .map(PtySignal::name)
}

#[cfg(not(unix))]
const fn signal_name(_sig: i32) -> Option<&'static str> {
    None
}

impl From<std::process::ExitStatus> for ExitStatus {
    #[cfg(unix)]
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(sig)) => Self::Signaled(sig),
            (None, None) => Self::Exited(-1),
        }
    }

    #[cfg(not(unix))]
    fn from(status: std::process::ExitStatus) -> Self {
        Self::Exited(status.code().unwrap_or(-1))
    }
}

/// Allocates a PTY and starts a child on it.
pub trait PtySystem: Send + Sync {
    /// Output side of the master.
    type Reader: tokio::io::AsyncRead + Send + Unpin + 'static;
    /// Input side of the master.
    type Writer: tokio::io::AsyncWrite + Send + Unpin + 'static;
    /// Process handle.
    type Child: PtyChild + 'static;

    /// Start `program` with `args` on a new PTY.
    ///
    /// The slave becomes the child's stdin, stdout and stderr. What comes
    /// back is the split master plus the process handle.
    fn spawn<S, I>(
        program: S,
        args: I,
        config: &PtyConfig,
    ) -> impl Future<Output = Result<(Self::Reader, Self::Writer, Self::Child)>> + Send
    where
        S: AsRef<OsStr> + Send,
        I: IntoIterator + Send,
        I::Item: AsRef<OsStr>;
}
