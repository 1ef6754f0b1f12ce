//! tandem-pty: async pseudo-terminal primitive
//!
//! This crate allocates pseudo-terminals, spawns children on them and hands
//! back async read/write halves of the master side together with a child
//! handle that can signal and reap the process.
//!
//! # Platform Support
//!
//! Unix only (Linux, macOS, the BSDs). PTY allocation, terminal attributes
//! and process-group signalling go through `rustix`.
//!
//! # Quick Start
//!
//! ```ignore
//! use tandem_pty::{PtyChild, PtyConfig, PtySystem, UnixPtySystem};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PtyConfig::default();
//!     let (mut reader, mut writer, mut child) =
//!         UnixPtySystem::spawn("/bin/sh", std::iter::empty::<&str>(), &config).await?;
//!
//!     writer.write_all(b"echo hello; exit\n").await?;
//!
//!     let mut output = Vec::new();
//!     reader.read_to_end(&mut output).await?;
//!     println!("{}", String::from_utf8_lossy(&output));
//!
//!     child.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod unix;

pub use config::{ChildEnv, PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};
pub use traits::{ExitStatus, PtyChild, PtySystem};

#[cfg(unix)]
pub use unix::{PtyReader, PtyWriter, UnixPtyChild, UnixPtyMaster, UnixPtySystem};

/// Convenience type alias for the platform's PTY system.
#[cfg(unix)]
pub type NativePtySystem = UnixPtySystem;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PtyConfig::default();
        assert_eq!(config.size, WindowSize::new(80, 24));
        assert!(config.new_session);
        assert!(config.env.inherit);
        assert!(config.echo);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_and_wait() {
        let config = PtyConfig::default();
        let (_reader, _writer, mut child) =
            NativePtySystem::spawn("true", std::iter::empty::<&str>(), &config)
                .await
                .unwrap();
        assert!(child.wait().await.unwrap().success());
    }
}
