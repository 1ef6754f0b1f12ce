//! Errors raised while allocating a PTY, starting a child on it or
//! controlling that child.

use std::io;

/// Everything that can go wrong below the session layer.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// `openpt`, `grantpt`, `unlockpt` or opening the slave failed.
    #[error("cannot allocate pseudo-terminal: {0}")]
    Create(#[source] io::Error),

    /// The child could not be started.
    #[error("cannot start child: {0}")]
    Spawn(#[source] io::Error),

    /// Reading or writing the master.
    #[error("pty read/write: {0}")]
    Io(#[from] io::Error),

    /// `tcgetattr`/`tcsetattr` on the slave.
    #[error("cannot configure terminal line discipline: {0}")]
    SetAttributes(#[source] io::Error),

    /// `TIOCSWINSZ` on the master.
    #[error("cannot set window size: {0}")]
    Resize(#[source] io::Error),

    /// `kill(2)` on the child's process group.
    #[error("cannot signal child: {0}")]
    Signal(#[source] io::Error),

    /// Reaping the child.
    #[error("cannot reap child: {0}")]
    Wait(#[source] io::Error),

    /// A NUL byte in the program or an argument.
    #[error("{kind} contains a NUL byte")]
    NulByte {
        /// `program`, `argument[1]` and so on.
        kind: String,
    },
}

impl PtyError {
    /// The wrapped OS error. `None` for [`PtyError::NulByte`].
    #[must_use]
    pub const fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Create(e)
            | Self::Spawn(e)
            | Self::Io(e)
            | Self::SetAttributes(e)
            | Self::Resize(e)
            | Self::Signal(e)
            | Self::Wait(e) => Some(e),
            Self::NulByte { .. } => None,
        }
    }
}

impl From<PtyError> for io::Error {
    fn from(err: PtyError) -> Self {
        match err {
            PtyError::Create(e)
            | PtyError::Spawn(e)
            | PtyError::Io(e)
            | PtyError::SetAttributes(e)
            | PtyError::Resize(e)
            | PtyError::Signal(e)
            | PtyError::Wait(e) => e,
            nul @ PtyError::NulByte { .. } => {
                Self::new(io::ErrorKind::InvalidInput, nul.to_string())
            }
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(unix)]
impl From<rustix::io::Errno> for PtyError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io(errno_to_io(errno))
    }
}

/// `Errno` to `io::Error`, for wrapping in a specific variant.
#[cfg(unix)]
pub(crate) fn errno_to_io(errno: rustix::io::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno.raw_os_error())
}
