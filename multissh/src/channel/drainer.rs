//! Background readers that turn a byte stream into discrete chunks.
//!
//! One [`StreamDrainer`] runs per remote stream. Every successful read
//! becomes exactly one [`Chunk`] on the stream's queue. Any read failure,
//! end-of-stream included, stops the session's [`RunFlag`], which tears down
//! the whole session rather than just the failing stream.

use std::borrow::Cow;
use std::fmt;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::BoxedReader;

/// Size of each drainer's read buffer.
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Which remote stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Primary output.
    Stdout,

    /// Error output.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// The bytes of one successful read, tagged with their stream.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Source stream.
    pub stream: StreamKind,

    /// Bytes exactly as read.
    pub data: Bytes,
}

impl Chunk {
    /// Create a chunk.
    pub fn new(stream: StreamKind, data: impl Into<Bytes>) -> Self {
        Self {
            stream,
            data: data.into(),
        }
    }

    /// Get the chunk as a string (lossy UTF-8).
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// The session's running flag.
///
/// Starts running and can only ever be stopped. Every clone observes the same
/// state, and [`stopped`](Self::stopped) wakes all waiters at once.
#[derive(Debug, Clone, Default)]
pub struct RunFlag {
    token: CancellationToken,
}

impl RunFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session is still running.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop the session. Further calls have no effect.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Wait until the session is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// Continuously reads one stream and forwards what it reads.
pub struct StreamDrainer {
    kind: StreamKind,
    reader: BoxedReader,
    queue: mpsc::Sender<Chunk>,
    run_flag: RunFlag,
}

impl StreamDrainer {
    /// Create a drainer for `reader` pushing onto `queue`.
    pub fn new(
        kind: StreamKind,
        reader: BoxedReader,
        queue: mpsc::Sender<Chunk>,
        run_flag: RunFlag,
    ) -> Self {
        Self {
            kind,
            reader,
            queue,
            run_flag,
        }
    }

    /// Run the drainer on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Read until the stream fails or the session stops.
    pub async fn run(mut self) {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            if !self.run_flag.is_running() {
                trace!("{} drainer: session stopped", self.kind);
                return;
            }

            buf.clear();
            buf.reserve(READ_BUFFER_SIZE);

            let read = tokio::select! {
                _ = self.run_flag.stopped() => {
                    trace!("{} drainer: stopped while reading", self.kind);
                    return;
                }
                read = self.reader.read_buf(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("{} reached end of stream, stopping session", self.kind);
                    self.run_flag.stop();
                    return;
                }
                Ok(n) => {
                    trace!("{} drainer: read {} bytes", self.kind, n);
                    let chunk = Chunk::new(self.kind, buf.split().freeze());

                    tokio::select! {
                        _ = self.run_flag.stopped() => return,
                        sent = self.queue.send(chunk) => {
                            if sent.is_err() {
                                debug!("{} queue dropped, drainer exiting", self.kind);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("{} read failed, stopping session: {}", self.kind, e);
                    self.run_flag.stop();
                    return;
                }
            }
        }
    }
}
