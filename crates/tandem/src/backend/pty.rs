//! PTY backend for local process spawning.

use tandem_pty::{NativePtySystem, PtyChild, PtyConfig, PtySystem};

use super::{Spawned, Spawner};
use crate::config::SessionConfig;
use crate::error::SpawnError;

/// Spawner for local processes on pseudo-terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct PtySpawner;

impl PtySpawner {
    /// Create a new PTY spawner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Translate a session configuration into PTY settings.
    #[must_use]
    pub fn pty_config(config: &SessionConfig) -> PtyConfig {
        let mut builder = PtyConfig::builder()
            .size(config.dimensions.0, config.dimensions.1)
            .echo(config.echo);

        if !config.inherit_env {
            builder = builder.isolated_env();
        }
        for (key, value) in &config.env {
            builder = builder.set_env(key, value);
        }
        for key in &config.env_remove {
            builder = builder.unset_env(key);
        }
        if let Some(dir) = &config.working_dir {
            builder = builder.cwd(dir);
        }

        builder.build()
    }
}

impl Spawner for PtySpawner {
    async fn spawn(&self, name: &str, config: &SessionConfig) -> Result<Spawned, SpawnError> {
        if let Some(dir) = &config.working_dir {
            if !dir.is_dir() {
                return Err(SpawnError::invalid_working_dir(dir.display().to_string()));
            }
        }

        let pty_config = Self::pty_config(config);
        let (reader, writer, child) =
            NativePtySystem::spawn(&config.command, &config.args, &pty_config)
                .await
                .map_err(|e| SpawnError::from_pty(e, &config.command, &config.args))?;

        tracing::debug!(
            session = name,
            pid = child.pid(),
            command = %config.display_command(),
            "spawned on pty"
        );

        Ok(Spawned::new(reader, writer, child))
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use tandem_pty::WindowSize;

    use super::*;

    #[test]
    fn pty_config_translation() {
        let config = SessionConfig::new("/bin/sh")
            .env("FOO", "bar")
            .env_remove("ENV")
            .dimensions(100, 30)
            .echo(false)
            .working_dir("/tmp");
        let pty = PtySpawner::pty_config(&config);

        assert_eq!(pty.size, WindowSize::new(100, 30));
        assert!(!pty.echo);
        assert_eq!(pty.env.set.get(&OsString::from("FOO")), Some(&OsString::from("bar")));
        assert!(pty.env.unset.contains(&OsString::from("ENV")));
        assert!(pty.env.inherit);
    }

    #[test]
    fn isolated_env() {
        let config = SessionConfig::new("/bin/sh").inherit_env(false);
        let env = PtySpawner::pty_config(&config).env.resolve();
        assert_eq!(env.len(), 1);
        assert!(env.contains_key(&OsString::from("TERM")));
    }

    #[tokio::test]
    async fn missing_working_dir() {
        let config = SessionConfig::new("/bin/sh").working_dir("/definitely/not/here");
        let err = PtySpawner.spawn("s", &config).await.unwrap_err();
        assert!(matches!(err, SpawnError::InvalidWorkingDir { .. }));
    }

    #[tokio::test]
    async fn missing_command() {
        let config = SessionConfig::new("/nonexistent/tandem-test-binary");
        let err = PtySpawner.spawn("s", &config).await.unwrap_err();
        assert!(matches!(err, SpawnError::CommandNotFound { .. }));
    }
}
