//! Session shutdown.
//!
//! Termination escalates through the stages of
//! [`TerminateConfig`](crate::config::TerminateConfig) until the process
//! has been reaped. The resulting status is cached on the session.

use std::time::Duration;

use tandem_pty::{ExitStatus, PtySignal};

use super::handle::Session;
use crate::error::{ExpectError, Result};
use crate::types::SessionState;

impl Session {
    /// Stop the process and reap it.
    ///
    /// Sends the exit command (if configured) and waits `grace`; then sends
    /// the termination signal followed by `SIGCONT` to the process group and
    /// waits `grace` again; then sends `SIGKILL` and waits `kill_grace`.
    ///
    /// Calling this on a session that already terminated returns the same
    /// status without touching any process.
    ///
    /// # Errors
    ///
    /// Returns `Io` only if the process could not be reaped even after
    /// `SIGKILL`.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        if let SessionState::Terminated(status) = self.state {
            return Ok(status);
        }

        let config = self.config.terminate.clone();
        tracing::debug!(session = %self.name, pid = self.pid(), "terminating session");

        if let Ok(Some(status)) = self.process.try_wait() {
            return Ok(self.finish(status));
        }

        if let Some(line) = &config.exit_command {
            match self.send(line).await {
                Ok(()) => {
                    if let Some(status) = self.wait_for_exit(config.grace).await {
                        return Ok(self.finish(status));
                    }
                }
                Err(e) => {
                    tracing::debug!(session = %self.name, error = %e, "exit command not delivered");
                }
            }
        }

        self.deliver(config.signal);
        self.deliver(PtySignal::Continue);
        if let Some(status) = self.wait_for_exit(config.grace).await {
            return Ok(self.finish(status));
        }

        tracing::warn!(
            session = %self.name,
            signal = %config.signal,
            "process ignored termination signal, killing"
        );
        if let Err(e) = self.process.kill() {
            tracing::warn!(session = %self.name, error = %e, "SIGKILL failed");
        }

        match tokio::time::timeout(config.kill_grace, self.process.wait()).await {
            Ok(Ok(status)) => Ok(self.finish(status)),
            Ok(Err(e)) => Err(ExpectError::io_context(
                format!("reaping session '{}'", self.name),
                e.into(),
            )),
            Err(_) => Err(ExpectError::io_context(
                format!("reaping session '{}'", self.name),
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("process still running {:?} after SIGKILL", config.kill_grace),
                ),
            )),
        }
    }

    fn deliver(&self, signal: PtySignal) {
        if let Err(e) = self.process.signal(signal) {
            tracing::warn!(session = %self.name, %signal, error = %e, "signal failed");
        }
    }

    async fn wait_for_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, self.process.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!(session = %self.name, error = %e, "wait failed");
                None
            }
            Err(_) => None,
        }
    }

    /// Record the final status and release the terminal.
    pub(super) fn finish(&mut self, status: ExitStatus) -> ExitStatus {
        self.reader_task.abort();
        while let Ok(event) = self.events.try_recv() {
            let _ = self.absorb(event);
        }
        self.writer = None;
        self.state = SessionState::Terminated(status);
        tracing::info!(session = %self.name, %status, "session terminated");
        status
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.is_running() {
            tracing::debug!(session = %self.name, pid = self.pid(), "dropping running session");
            let _ = self.process.kill();
        }
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{SessionConfig, TerminateConfig};
    use crate::mock::{LogKind, MockScript, MockSpawner};

    fn quick() -> TerminateConfig {
        TerminateConfig::new()
            .grace(Duration::from_millis(100))
            .kill_grace(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let spawner = MockSpawner::new().script("s", MockScript::new());
        let config = SessionConfig::new("mock").terminate(quick());
        let mut session = Session::spawn_with(&spawner, "s", config).await.unwrap();

        let first = session.terminate().await.unwrap();
        let second = session.terminate().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, ExitStatus::Signaled(PtySignal::Hangup.as_unix_signal()));
        assert_eq!(session.state(), SessionState::Terminated(first));
    }

    #[tokio::test]
    async fn exit_command_runs_first() {
        let spawner = MockSpawner::new().script("s", MockScript::new().exit_on("quit", 0));
        let config = SessionConfig::new("mock").terminate(quick().exit_command("quit"));
        let mut session = Session::spawn_with(&spawner, "s", config).await.unwrap();

        assert_eq!(session.terminate().await.unwrap(), ExitStatus::Exited(0));

        let log = spawner.log();
        assert!(!log.entries().iter().any(|e| matches!(e.kind, LogKind::Signal(_))));
    }

    #[tokio::test]
    async fn stubborn_process_is_killed() {
        let spawner = MockSpawner::new().script("s", MockScript::new().ignore_signals());
        let config = SessionConfig::new("mock").terminate(quick());
        let mut session = Session::spawn_with(&spawner, "s", config).await.unwrap();

        let status = session.terminate().await.unwrap();
        assert_eq!(status, ExitStatus::Signaled(PtySignal::Kill.as_unix_signal()));
    }

    #[tokio::test]
    async fn terminate_after_natural_exit() {
        let spawner = MockSpawner::new().script("s", MockScript::new().exit(7));
        let mut session = Session::spawn_with(&spawner, "s", SessionConfig::new("mock"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.terminate().await.unwrap(), ExitStatus::Exited(7));
    }
}
