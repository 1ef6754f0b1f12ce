//! Background output pump.
//!
//! Each session drains its terminal continuously into an unbounded channel,
//! so a child never stalls on a full PTY while the scenario is busy with
//! another session.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::BoxReader;

/// One observation from the reader task.
#[derive(Debug)]
pub(super) enum ReadEvent {
    /// A chunk of raw output.
    Data(Bytes),
    /// The terminal reached end of file.
    Eof,
    /// Reading failed; no further events follow.
    Error(io::Error),
}

/// Start draining `reader` on the current runtime.
pub(super) fn spawn_pump(
    session: String,
    mut reader: BoxReader,
    chunk: usize,
) -> (mpsc::UnboundedReceiver<ReadEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let chunk = chunk.max(1);

    let task = tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(chunk);
        loop {
            buf.reserve(chunk);
            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    tracing::trace!(session = %session, "output closed");
                    let _ = tx.send(ReadEvent::Eof);
                    break;
                }
                Ok(n) => {
                    tracing::trace!(session = %session, bytes = n, "output chunk");
                    if tx.send(ReadEvent::Data(buf.split().freeze())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(session = %session, error = %e, "output read failed");
                    let _ = tx.send(ReadEvent::Error(e));
                    break;
                }
            }
        }
    });

    (rx, task)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn pump_forwards_chunks_then_eof() {
        let (ours, mut theirs) = tokio::io::duplex(64);
        let (mut rx, task) = spawn_pump("t".into(), Box::new(ours), 8);

        theirs.write_all(b"hello").await.unwrap();
        drop(theirs);

        let mut collected = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                ReadEvent::Data(bytes) => collected.extend_from_slice(&bytes),
                ReadEvent::Eof => break,
                ReadEvent::Error(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(collected, b"hello");
        task.await.unwrap();
    }
}
