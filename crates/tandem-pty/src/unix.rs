//! The Unix [`PtySystem`]: `posix_openpt` for the pair, `AsyncFd` for the
//! master, and a `setsid` + `TIOCSCTTY` pre-exec hook for the child.
//!
//! ```ignore
//! use tandem_pty::{PtyConfig, PtySystem, UnixPtySystem};
//!
//! let (reader, writer, child) =
//!     UnixPtySystem::spawn("mn", ["--topo", "single,2"], &PtyConfig::default()).await?;
//! ```

mod child;
mod pty;

use std::ffi::OsStr;

pub use child::{UnixPtyChild, spawn_child};
pub use pty::{PtyReader, PtyWriter, UnixPtyMaster, open_slave, set_echo};

use crate::config::PtyConfig;
use crate::error::Result;
use crate::traits::PtySystem;

/// Spawns children on freshly allocated Unix PTYs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPtySystem;

impl PtySystem for UnixPtySystem {
    type Reader = PtyReader;
    type Writer = PtyWriter;
    type Child = UnixPtyChild;

    async fn spawn<S, I>(
        program: S,
        args: I,
        config: &PtyConfig,
    ) -> Result<(Self::Reader, Self::Writer, Self::Child)>
    where
        S: AsRef<OsStr> + Send,
        I: IntoIterator + Send,
        I::Item: AsRef<OsStr>,
    {
        let (master, slave_path) = UnixPtyMaster::open()?;
        master.set_window_size(config.size)?;

        let slave = open_slave(&slave_path)?;
        if !config.echo {
            set_echo(&slave, false)?;
        }

        let child = spawn_child(slave, program, args, config)?;
        let (reader, writer) = master.into_split();

        Ok((reader, writer, child))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::traits::{ExitStatus, PtyChild};

    async fn run_to_eof(program: &str, args: &[&str], config: &PtyConfig) -> (String, ExitStatus) {
        let (mut reader, _writer, mut child) =
            UnixPtySystem::spawn(program, args, config).await.unwrap();
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).await.unwrap();
        let status = child.wait().await.unwrap();
        (String::from_utf8_lossy(&raw).into_owned(), status)
    }

    #[tokio::test]
    async fn output_then_eof() {
        let (text, status) = run_to_eof("echo", &["s1-eth0 up"], &PtyConfig::default()).await;
        assert!(text.contains("s1-eth0 up"));
        assert_eq!(status, ExitStatus::Exited(0));
    }

    #[tokio::test]
    async fn stdin_is_the_terminal() {
        let (text, status) =
            run_to_eof("sh", &["-c", "tty && test -t 0"], &PtyConfig::default()).await;
        assert!(text.contains("/dev/"));
        assert!(status.success());
    }

    #[tokio::test]
    async fn size_and_env_reach_the_child() {
        let config = PtyConfig::builder()
            .size(91, 17)
            .set_env("TANDEM_MARKER", "ok")
            .build();
        let (text, _) =
            run_to_eof("sh", &["-c", "stty size; echo marker=$TANDEM_MARKER"], &config).await;
        assert!(text.contains("17 91"));
        assert!(text.contains("marker=ok"));
    }
}
