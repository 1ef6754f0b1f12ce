//! Session handle for interacting with a spawned process.

use std::io;
use std::time::Duration;

use tandem_pty::{ExitStatus, PtyChild};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::reader::{spawn_pump, ReadEvent};
use crate::backend::{BoxWriter, PtySpawner, Spawner};
use crate::config::SessionConfig;
use crate::encoding::Utf8Decoder;
use crate::error::{ExpectError, Result};
use crate::expect::{describe, find_match, OutputBuffer, Pattern};
use crate::types::{ControlChar, MatchResult, SessionState};

/// Reader events folded in before the buffer is matched again.
const DRAIN_BATCH: usize = 64;

/// How long output may trail an exit observed before end of file.
const EXIT_SETTLE: Duration = Duration::from_millis(100);

/// Stand-in for "never" when a timeout is too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// The instant `timeout` from now, saturating far in the future.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// One spawned process on a terminal, plus the output not yet consumed.
///
/// A session is `Running` from the moment it is spawned until it is
/// terminated or an `expect` observes that the process exited. After that
/// `send` and `expect` fail with [`ExpectError::SessionNotRunning`].
pub struct Session {
    pub(super) name: String,
    pub(super) config: SessionConfig,
    pub(super) state: SessionState,
    pub(super) writer: Option<BoxWriter>,
    pub(super) process: Box<dyn PtyChild>,
    pub(super) events: mpsc::UnboundedReceiver<ReadEvent>,
    pub(super) reader_task: JoinHandle<()>,
    pub(super) buffer: OutputBuffer,
    pub(super) decoder: Utf8Decoder,
    pub(super) eof: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("pid", &self.process.pid())
            .field("state", &self.state)
            .field("buffer", &self.buffer)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Spawn a local process on a PTY and wait for its ready pattern.
    ///
    /// If the ready pattern does not appear the process is terminated
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the process cannot be started, or the error from
    /// waiting for the ready pattern.
    pub async fn spawn(name: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let mut session = Self::spawn_with(&PtySpawner, name, config).await?;
        if let Err(e) = session.wait_ready().await {
            if let Err(term) = session.terminate().await {
                tracing::warn!(session = %session.name, error = %term, "terminate after failed start");
            }
            return Err(e);
        }
        Ok(session)
    }

    /// Spawn through `spawner` without waiting for the ready pattern.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the process cannot be started.
    pub async fn spawn_with<S: Spawner>(
        spawner: &S,
        name: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        let name = name.into();
        let spawned = spawner.spawn(&name, &config).await?;

        let (events, reader_task) =
            spawn_pump(name.clone(), spawned.reader, config.buffer.read_chunk);

        tracing::info!(
            session = %name,
            pid = spawned.process.pid(),
            command = %config.display_command(),
            "session started"
        );

        Ok(Self {
            buffer: OutputBuffer::new(config.buffer.max_size),
            name,
            config,
            state: SessionState::Running,
            writer: Some(spawned.writer),
            process: spawned.process,
            events,
            reader_task,
            decoder: Utf8Decoder::new(),
            eof: false,
        })
    }

    /// Wait for the configured ready pattern, if any.
    ///
    /// # Errors
    ///
    /// Returns the `expect` error if the pattern does not appear within the
    /// ready timeout.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let Some(ready) = self.config.ready.clone() else {
            return Ok(());
        };
        let timeout = self.config.timeout.ready;
        self.expect(&[ready], timeout).await?;
        tracing::debug!(session = %self.name, "session ready");
        Ok(())
    }

    /// Get the session name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the process ID.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Get the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Get the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Output received but not yet consumed by a match.
    ///
    /// Only output already pulled in by `expect` appears here.
    #[must_use]
    pub fn buffer(&self) -> &str {
        self.buffer.as_str()
    }

    /// Bytes of output dropped because the buffer overflowed.
    #[must_use]
    pub const fn bytes_discarded(&self) -> usize {
        self.buffer.bytes_discarded()
    }

    /// Check if the terminal has reached end of file.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.eof
    }

    pub(super) fn ensure_running(&self) -> Result<()> {
        if self.state.is_running() {
            Ok(())
        } else {
            Err(ExpectError::not_running(&self.name, self.state))
        }
    }

    /// Write raw bytes to the process.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotRunning` unless the session is running, or `Io`
    /// if the write fails or does not finish within the write timeout.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_running()?;

        let limit = self.config.timeout.write;
        let context = || format!("writing to session '{}'", self.name);
        let Some(writer) = self.writer.as_mut() else {
            return Err(ExpectError::not_running(&self.name, self.state));
        };

        let write = async {
            writer.write_all(data).await?;
            writer.flush().await
        };
        match tokio::time::timeout(limit, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ExpectError::io_context(context(), e)),
            Err(_) => Err(ExpectError::io_context(
                context(),
                io::Error::new(io::ErrorKind::TimedOut, format!("write blocked for {limit:?}")),
            )),
        }
    }

    /// Send a line followed by the configured line ending.
    ///
    /// Does not wait for any response.
    ///
    /// # Errors
    ///
    /// Same as [`send_raw`](Self::send_raw).
    pub async fn send(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(self.config.line_ending.as_bytes());

        self.send_raw(&data).await?;
        tracing::debug!(session = %self.name, bytes = data.len(), "sent line");
        tracing::trace!(session = %self.name, text = line, "sent line text");
        Ok(())
    }

    /// Alias for [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send_raw`](Self::send_raw).
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.send(line).await
    }

    /// Send a control character such as Ctrl-C.
    ///
    /// # Errors
    ///
    /// Same as [`send_raw`](Self::send_raw).
    pub async fn send_control(&mut self, ctrl: ControlChar) -> Result<()> {
        self.send_raw(&[ctrl.as_byte()]).await?;
        tracing::debug!(session = %self.name, control = %ctrl, "sent control character");
        Ok(())
    }

    /// Wait until one of `patterns` appears in the output.
    ///
    /// On a match the buffer advances past it and everything before it is
    /// returned in [`MatchResult::before`]. Output that arrived before the
    /// process exited is matched first; only when nothing matches does an
    /// exit turn into [`ExpectError::ProcessExited`] and move the session to
    /// `Terminated`. A timeout leaves the buffer untouched and the process
    /// running.
    ///
    /// The deadline holds however fast output arrives. A timeout too large
    /// for the clock waits indefinitely. If the buffer had to drop unmatched
    /// output, the `Timeout` error says how many bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty pattern list or a zero timeout
    /// - `SessionNotRunning` unless the session is running
    /// - `Timeout` if nothing matched in time
    /// - `ProcessExited` if the process ended first
    pub async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> Result<MatchResult> {
        if patterns.is_empty() {
            return Err(ExpectError::invalid_argument("empty pattern list"));
        }
        if timeout.is_zero() {
            return Err(ExpectError::invalid_argument("timeout must be positive"));
        }
        self.ensure_running()?;

        let deadline = deadline_after(timeout);
        let mut watch_exit = true;
        loop {
            for _ in 0..DRAIN_BATCH {
                let Ok(event) = self.events.try_recv() else {
                    break;
                };
                self.absorb(event)?;
            }

            if let Some(m) = find_match(self.buffer.as_str(), patterns)? {
                let result = self.buffer.consume_match(m);
                tracing::debug!(session = %self.name, index = result.index, "pattern matched");
                tracing::trace!(session = %self.name, matched = %result.matched, "matched text");
                return Ok(result);
            }

            if self.eof {
                return self.exit_after_eof(deadline, timeout, patterns).await;
            }
            if Instant::now() >= deadline {
                return Err(self.timeout_error(timeout, patterns));
            }

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.absorb(event)?,
                    None => self.mark_eof(),
                },
                status = self.process.wait(), if watch_exit => match status {
                    Ok(status) => return self.exit_before_eof(status, deadline, patterns).await,
                    Err(e) => {
                        tracing::debug!(session = %self.name, error = %e, "wait failed during expect");
                        watch_exit = false;
                    }
                },
                () = tokio::time::sleep_until(deadline) => {
                    return Err(self.timeout_error(timeout, patterns));
                }
            }
        }
    }

    fn timeout_error(&self, timeout: Duration, patterns: &[Pattern]) -> ExpectError {
        let discarded = self.buffer.discarded_since_match();
        tracing::warn!(
            session = %self.name,
            timeout = ?timeout,
            buffered = self.buffer.len(),
            discarded,
            "expect timed out"
        );
        ExpectError::timeout(timeout, describe(patterns), self.buffer.as_str())
            .with_discarded(discarded)
    }

    /// The process exited while something still holds the terminal open.
    ///
    /// Output it wrote before exiting is given a short window to arrive and
    /// is matched first. A match leaves the session running; the next
    /// `expect` sees the cached status and reports the exit.
    async fn exit_before_eof(
        &mut self,
        status: ExitStatus,
        deadline: Instant,
        patterns: &[Pattern],
    ) -> Result<MatchResult> {
        let settle = deadline.min(Instant::now() + EXIT_SETTLE);
        while !self.eof && Instant::now() < settle {
            match tokio::time::timeout_at(settle, self.events.recv()).await {
                Ok(Some(event)) => self.absorb(event)?,
                Ok(None) => self.mark_eof(),
                Err(_) => break,
            }
        }

        if let Some(m) = find_match(self.buffer.as_str(), patterns)? {
            let result = self.buffer.consume_match(m);
            tracing::debug!(session = %self.name, index = result.index, "pattern matched after exit");
            return Ok(result);
        }

        self.finish(status);
        tracing::warn!(session = %self.name, %status, "process exited during expect");
        Err(ExpectError::process_exited(status, self.buffer.as_str()))
    }

    /// Nothing matched and no more output will come: wait for the exit.
    async fn exit_after_eof(
        &mut self,
        deadline: Instant,
        timeout: Duration,
        patterns: &[Pattern],
    ) -> Result<MatchResult> {
        match tokio::time::timeout_at(deadline, self.process.wait()).await {
            Ok(Ok(status)) => {
                self.finish(status);
                tracing::warn!(session = %self.name, %status, "process exited during expect");
                Err(ExpectError::process_exited(status, self.buffer.as_str()))
            }
            Ok(Err(e)) => Err(ExpectError::io_context(
                format!("waiting for session '{}'", self.name),
                e.into(),
            )),
            Err(_) => Err(self.timeout_error(timeout, patterns)),
        }
    }

    /// Fold one reader event into the buffer.
    pub(super) fn absorb(&mut self, event: ReadEvent) -> Result<()> {
        match event {
            ReadEvent::Data(bytes) => {
                let text = self.decoder.push(&bytes);
                self.append(&text);
                Ok(())
            }
            ReadEvent::Eof => {
                self.mark_eof();
                Ok(())
            }
            ReadEvent::Error(e) => {
                self.mark_eof();
                Err(ExpectError::io_context(
                    format!("reading from session '{}'", self.name),
                    e,
                ))
            }
        }
    }

    fn append(&mut self, text: &str) {
        let discarded = self.buffer.append(text);
        if discarded > 0 {
            tracing::warn!(
                session = %self.name,
                discarded,
                max_size = self.buffer.max_size(),
                "output buffer full, oldest output dropped"
            );
        }
    }

    fn mark_eof(&mut self) {
        if !self.eof {
            self.eof = true;
            let tail = self.decoder.finish();
            self.append(&tail);
        }
    }
}
