//! The scripted program and its process handle.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::BoxFuture;
use tandem_pty::{ExitStatus, PtyChild, PtyError, PtySignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::event::{EventLog, LogKind, MockEvent};
use super::script::MockScript;

const SIGINT: i32 = PtySignal::Interrupt.as_unix_signal();
const SIGKILL: i32 = PtySignal::Kill.as_unix_signal();
const SIGCONT: i32 = PtySignal::Continue.as_unix_signal();
const ETX: u8 = 0x03;

static NEXT_PID: AtomicU32 = AtomicU32::new(40_000);

/// Handle for a scripted program, standing in for a real child process.
#[derive(Debug)]
pub struct MockProcess {
    pid: u32,
    signals: mpsc::UnboundedSender<i32>,
    exit: watch::Receiver<Option<ExitStatus>>,
    status: Option<ExitStatus>,
}

impl MockProcess {
    fn observed(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            self.status = *self.exit.borrow();
        }
        self.status
    }
}

impl PtyChild for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn wait(&mut self) -> BoxFuture<'_, tandem_pty::Result<ExitStatus>> {
        Box::pin(async move {
            if let Some(status) = self.status {
                return Ok(status);
            }
            let status = *self.exit.wait_for(Option::is_some).await.map_err(|_| {
                PtyError::Wait(io::Error::other("mock program ended without a status"))
            })?;
            self.status = status;
            status.ok_or_else(|| PtyError::Wait(io::Error::other("mock program has no status")))
        })
    }

    fn try_wait(&mut self) -> tandem_pty::Result<Option<ExitStatus>> {
        Ok(self.observed())
    }

    fn signal(&self, signal: PtySignal) -> tandem_pty::Result<()> {
        if self.status.is_some() || self.exit.borrow().is_some() {
            return Ok(());
        }
        // The program may have just finished; a closed channel is the same no-op.
        let _ = self.signals.send(signal.as_unix_signal());
        Ok(())
    }
}

/// Start the program for `script` on `stream` and return its handle.
pub(super) fn launch(
    session: &str,
    script: MockScript,
    stream: DuplexStream,
    log: EventLog,
) -> MockProcess {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = watch::channel(None);
    let program = Program {
        session: session.to_string(),
        script,
        log,
    };

    tokio::spawn(program.run(stream, signal_rx, exit_tx));

    MockProcess {
        pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
        signals: signal_tx,
        exit: exit_rx,
        status: None,
    }
}

struct Program {
    session: String,
    script: MockScript,
    log: EventLog,
}

impl Program {
    async fn run(
        self,
        stream: DuplexStream,
        mut signals: mpsc::UnboundedReceiver<i32>,
        exit: watch::Sender<Option<ExitStatus>>,
    ) {
        let status = self.play(stream, &mut signals).await;
        // The terminal is closed by now, so the session sees EOF first.
        if let Some(status) = status {
            self.log.record(&self.session, LogKind::Exited(status));
            let _ = exit.send(Some(status));
        }
    }

    /// Play the script until it exits. `None` means the handle was dropped.
    async fn play(
        &self,
        stream: DuplexStream,
        signals: &mut mpsc::UnboundedReceiver<i32>,
    ) -> Option<ExitStatus> {
        let (mut input, mut output) = tokio::io::split(stream);
        let mut queue: VecDeque<MockEvent> = self.script.initial().iter().cloned().collect();
        let mut due = Instant::now();
        let mut line = Vec::new();
        let mut buf = [0u8; 1024];
        let mut input_open = true;

        loop {
            while Instant::now() >= due {
                match queue.pop_front() {
                    None => break,
                    Some(MockEvent::Output(text)) => self.write(&mut output, &text).await,
                    Some(MockEvent::Delay(d)) => due = Instant::now() + d,
                    Some(MockEvent::Exit(code)) => return Some(ExitStatus::Exited(code)),
                }
            }
            let pending = !queue.is_empty();

            // Input already written is handled before a later signal.
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(due), if pending => {}
                read = input.read(&mut buf), if input_open => match read {
                    Ok(0) | Err(_) => input_open = false,
                    Ok(n) => {
                        for &byte in &buf[..n] {
                            match byte {
                                b'\n' | b'\r' => {
                                    let text = String::from_utf8_lossy(&line).into_owned();
                                    line.clear();
                                    self.on_line(text, &mut queue, &mut output).await;
                                }
                                ETX => {
                                    if let Some(status) = self.on_signal(SIGINT) {
                                        return Some(status);
                                    }
                                }
                                _ => line.push(byte),
                            }
                        }
                    }
                },
                signal = signals.recv() => match signal {
                    None => return None,
                    Some(signal) => {
                        if let Some(status) = self.on_signal(signal) {
                            return Some(status);
                        }
                    }
                },
            }
        }
    }

    async fn on_line(
        &self,
        text: String,
        queue: &mut VecDeque<MockEvent>,
        output: &mut WriteHalf<DuplexStream>,
    ) {
        // CR LF line endings produce an empty line between the two bytes.
        if text.is_empty() {
            return;
        }
        self.log.record(&self.session, LogKind::Input(text.clone()));
        if self.script.echoes() {
            self.write(output, &format!("{text}\r\n")).await;
        }
        if let Some(responder) = self.script.responder_for(&text) {
            queue.extend(responder.events.iter().cloned());
        }
    }

    fn on_signal(&self, signal: i32) -> Option<ExitStatus> {
        self.log.record(&self.session, LogKind::Signal(signal));
        if signal == SIGCONT {
            None
        } else if signal == SIGKILL || !self.script.ignores_signals() {
            Some(ExitStatus::Signaled(signal))
        } else {
            None
        }
    }

    async fn write(&self, output: &mut WriteHalf<DuplexStream>, text: &str) {
        self.log
            .record(&self.session, LogKind::Output(text.to_string()));
        if let Err(e) = output.write_all(text.as_bytes()).await {
            tracing::trace!(session = %self.session, error = %e, "mock output dropped");
        }
    }
}
