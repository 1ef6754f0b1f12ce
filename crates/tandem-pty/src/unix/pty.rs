//! Allocating a PTY pair and driving its master from tokio.
//!
//! One nonblocking master descriptor backs both a [`PtyReader`] and a
//! [`PtyWriter`]. A background task drains the reader while sends go
//! through the writer.

use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::io::Errno;
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{LocalModes, OptionalActions, Winsize, tcgetattr, tcsetattr, tcsetwinsize};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::WindowSize;
use crate::error::{PtyError, Result, errno_to_io};

type SharedFd = Arc<AsyncFd<OwnedFd>>;

/// Master descriptor of a new pseudo-terminal, registered with the reactor.
#[derive(Debug)]
pub struct UnixPtyMaster {
    fd: SharedFd,
}

impl UnixPtyMaster {
    /// Allocate a pair. Returns the master and the path of its slave.
    ///
    /// # Errors
    ///
    /// [`PtyError::Create`] when any of `posix_openpt`, `grantpt`,
    /// `unlockpt` or `ptsname` fails.
    pub fn open() -> Result<(Self, PathBuf)> {
        let create = |e| PtyError::Create(errno_to_io(e));

        let master = openpt(OpenptFlags::RDWR | OpenptFlags::NOCTTY).map_err(create)?;
        grantpt(&master).map_err(create)?;
        unlockpt(&master).map_err(create)?;
        let name = ptsname(&master, Vec::new()).map_err(create)?;
        let slave = PathBuf::from(OsStr::from_bytes(name.as_bytes()));

        fcntl_setfl(&master, OFlags::NONBLOCK).map_err(create)?;
        let fd = AsyncFd::new(master).map_err(PtyError::Create)?;

        Ok((Self { fd: Arc::new(fd) }, slave))
    }

    /// `TIOCSWINSZ`. The child gets `SIGWINCH` if it is already running.
    pub fn set_window_size(&self, size: WindowSize) -> Result<()> {
        let winsize = Winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        tcsetwinsize(self.fd.get_ref(), winsize).map_err(|e| PtyError::Resize(errno_to_io(e)))
    }

    /// Hand out a reader and a writer over the same descriptor. It is closed
    /// when both are dropped.
    #[must_use]
    pub fn into_split(self) -> (PtyReader, PtyWriter) {
        let reader = PtyReader {
            fd: Arc::clone(&self.fd),
        };
        (reader, PtyWriter { fd: self.fd })
    }
}

impl AsRawFd for UnixPtyMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Output side of the master.
///
/// Linux answers `EIO` rather than 0 once the last slave descriptor is
/// closed; both read as end of file here.
#[derive(Debug)]
pub struct PtyReader {
    fd: SharedFd,
}

fn read_master(fd: impl AsFd, into: &mut [u8]) -> io::Result<usize> {
    match rustix::io::read(fd, into) {
        Err(Errno::IO) => Ok(0),
        other => other.map_err(errno_to_io),
    }
}

fn write_master(fd: impl AsFd, from: &[u8]) -> io::Result<usize> {
    match rustix::io::write(fd, from) {
        Err(Errno::IO) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal closed")),
        other => other.map_err(errno_to_io),
    }
}

impl AsyncRead for PtyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            if let Ok(result) = guard.try_io(|fd| read_master(fd.get_ref(), unfilled)) {
                let n = result?;
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }
        }
    }
}

/// Input side of the master. Writes after the child side has gone away fail
/// with `BrokenPipe`.
#[derive(Debug)]
pub struct PtyWriter {
    fd: SharedFd,
}

impl AsyncWrite for PtyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            if let Ok(result) = guard.try_io(|fd| write_master(fd.get_ref(), buf)) {
                return Poll::Ready(result);
            }
        }
    }

    // Writes go straight to the descriptor; nothing is buffered here.
    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Open the slave end, close-on-exec. The child gets duplicates of it as
/// stdin, stdout and stderr.
pub fn open_slave(path: &Path) -> Result<OwnedFd> {
    let flags = OFlags::RDWR | OFlags::NOCTTY | OFlags::CLOEXEC;
    open(path, flags, Mode::empty()).map_err(|e| PtyError::Create(errno_to_io(e)))
}

/// Flip `ECHO` in the slave's local modes.
pub fn set_echo(slave: &OwnedFd, enabled: bool) -> Result<()> {
    let mut termios = tcgetattr(slave).map_err(|e| PtyError::SetAttributes(errno_to_io(e)))?;

    if enabled {
        termios.local_modes.insert(LocalModes::ECHO);
    } else {
        termios.local_modes.remove(LocalModes::ECHO);
    }

    tcsetattr(slave, OptionalActions::Now, &termios)
        .map_err(|e| PtyError::SetAttributes(errno_to_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn open_pty() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        assert!(master.as_raw_fd() >= 0);
        assert!(slave_path.starts_with("/dev/pts/") || slave_path.starts_with("/dev/tty"));
    }

    #[tokio::test]
    async fn window_size_applies() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        let slave = open_slave(&slave_path).unwrap();

        master.set_window_size(WindowSize::new(120, 40)).unwrap();

        let winsize = rustix::termios::tcgetwinsize(&slave).unwrap();
        assert_eq!(winsize.ws_col, 120);
        assert_eq!(winsize.ws_row, 40);
    }

    #[tokio::test]
    async fn slave_write_reaches_reader() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        let slave = open_slave(&slave_path).unwrap();
        let (mut reader, _writer) = master.into_split();

        rustix::io::write(&slave, b"ping").unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn echo_toggle() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        let slave = open_slave(&slave_path).unwrap();

        set_echo(&slave, false).unwrap();
        let termios = tcgetattr(&slave).unwrap();
        assert!(!termios.local_modes.contains(LocalModes::ECHO));

        let (_reader, mut writer) = master.into_split();
        writer.write_all(b"quiet\n").await.unwrap();

        let mut buf = [0u8; 16];
        let n = rustix::io::read(&slave, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"quiet\n");
    }
}
