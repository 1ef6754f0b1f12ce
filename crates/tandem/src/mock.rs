//! Scripted programs for testing without real processes.
//!
//! A [`MockSpawner`] maps session names to [`MockScript`]s. Each spawned
//! session talks to a small in-process program over an in-memory stream;
//! the program writes its scripted output, reacts to input lines and
//! signals, and records everything it does in a shared [`EventLog`]. The
//! log is ordered across sessions, which makes it possible to check that a
//! scenario sent to one session only after reading from another.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tandem::mock::{MockScript, MockSpawner};
//! use tandem::{Pattern, Session, SessionConfig};
//!
//! # async fn demo() -> tandem::Result<()> {
//! let spawner = MockSpawner::new().script(
//!     "server",
//!     MockScript::new().output("listening on 4000\n"),
//! );
//! let mut session = Session::spawn_with(&spawner, "server", SessionConfig::new("server")).await?;
//! let m = session
//!     .expect(&[Pattern::regex(r"listening on (\d+)")?], Duration::from_secs(1))
//!     .await?;
//! assert_eq!(m.group(1), Some("4000"));
//! # Ok(())
//! # }
//! ```

mod event;
mod process;
mod script;

use std::collections::HashMap;

use tandem_pty::PtyChild;

pub use event::{EventLog, LogEntry, LogKind, MockEvent};
pub use process::MockProcess;
pub use script::{MockScript, Responder};

use crate::backend::{Spawned, Spawner};
use crate::config::SessionConfig;
use crate::error::SpawnError;

/// Capacity of the in-memory terminal between a session and its program.
const STREAM_CAPACITY: usize = 64 * 1024;

/// Spawner that plays scripted programs instead of starting processes.
#[derive(Debug, Clone, Default)]
pub struct MockSpawner {
    scripts: HashMap<String, MockScript>,
    log: EventLog,
}

impl MockSpawner {
    /// Create a spawner with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the script played for the session `name`.
    #[must_use]
    pub fn script(mut self, name: impl Into<String>, script: MockScript) -> Self {
        self.scripts.insert(name.into(), script);
        self
    }

    /// The log shared by every program this spawner starts.
    #[must_use]
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Spawner for MockSpawner {
    async fn spawn(&self, name: &str, config: &SessionConfig) -> Result<Spawned, SpawnError> {
        let script = self
            .scripts
            .get(name)
            .cloned()
            .ok_or_else(|| SpawnError::command_not_found(&config.command))?;

        let (session_end, program_end) = tokio::io::duplex(STREAM_CAPACITY);
        self.log.record(name, LogKind::Spawned);
        let process = process::launch(name, script, program_end, self.log.clone());
        tracing::debug!(session = name, pid = process.pid(), "mock program started");

        let (reader, writer) = tokio::io::split(session_end);
        Ok(Spawned::new(reader, writer, process))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_pty::{ExitStatus, PtySignal};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn read_some(reader: &mut crate::backend::BoxReader) -> String {
        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(1), reader.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let spawner = MockSpawner::new();
        let err = spawner
            .spawn("ghost", &SessionConfig::new("ghost-cmd"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::CommandNotFound { ref command } if command == "ghost-cmd"));
    }

    #[tokio::test]
    async fn plays_output_and_responds() {
        let spawner = MockSpawner::new().script(
            "s",
            MockScript::new().output("hello> ").respond("ping", "pong\n"),
        );
        let mut spawned = spawner.spawn("s", &SessionConfig::new("mock")).await.unwrap();

        assert_eq!(read_some(&mut spawned.reader).await, "hello> ");
        spawned.writer.write_all(b"ping\n").await.unwrap();
        assert_eq!(read_some(&mut spawned.reader).await, "pong\n");

        let kinds: Vec<_> = spawner.log().entries().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LogKind::Spawned,
                LogKind::Output("hello> ".into()),
                LogKind::Input("ping".into()),
                LogKind::Output("pong\n".into()),
            ]
        );
    }

    #[tokio::test]
    async fn exit_closes_stream_then_reports() {
        let spawner = MockSpawner::new().script("s", MockScript::new().output("bye").exit(3));
        let mut spawned = spawner.spawn("s", &SessionConfig::new("mock")).await.unwrap();

        let mut all = String::new();
        spawned.reader.read_to_string(&mut all).await.unwrap();
        assert_eq!(all, "bye");
        assert_eq!(spawned.process.wait().await.unwrap(), ExitStatus::Exited(3));
        assert_eq!(spawned.process.try_wait().unwrap(), Some(ExitStatus::Exited(3)));
    }

    #[tokio::test]
    async fn signals_end_the_program() {
        let spawner = MockSpawner::new().script("s", MockScript::new());
        let mut spawned = spawner.spawn("s", &SessionConfig::new("mock")).await.unwrap();

        assert_eq!(spawned.process.try_wait().unwrap(), None);
        spawned.process.signal(PtySignal::Continue).unwrap();
        spawned.process.signal(PtySignal::Terminate).unwrap();
        let status = spawned.process.wait().await.unwrap();
        assert_eq!(status, ExitStatus::Signaled(PtySignal::Terminate.as_unix_signal()));

        // Signalling an exited program is a no-op.
        spawned.process.signal(PtySignal::Kill).unwrap();
    }

    #[tokio::test]
    async fn ctrl_c_interrupts() {
        let spawner = MockSpawner::new().script("s", MockScript::new());
        let mut spawned = spawner.spawn("s", &SessionConfig::new("mock")).await.unwrap();

        spawned.writer.write_all(&[0x03]).await.unwrap();
        let status = spawned.process.wait().await.unwrap();
        assert_eq!(status, ExitStatus::Signaled(PtySignal::Interrupt.as_unix_signal()));
    }

    #[tokio::test]
    async fn echo_and_delayed_reply() {
        let spawner = MockSpawner::new().script(
            "s",
            MockScript::new()
                .echo(true)
                .respond_after("slow", Duration::from_millis(30), "done\n"),
        );
        let mut spawned = spawner.spawn("s", &SessionConfig::new("mock")).await.unwrap();

        spawned.writer.write_all(b"slow\r\n").await.unwrap();
        assert_eq!(read_some(&mut spawned.reader).await, "slow\r\n");
        assert_eq!(read_some(&mut spawned.reader).await, "done\n");

        let inputs = spawner
            .log()
            .entries()
            .into_iter()
            .filter(|e| matches!(e.kind, LogKind::Input(_)))
            .count();
        assert_eq!(inputs, 1);
    }
}
