//! Channel layer: the remote shell seam, stream draining and terminator matching.
//!
//! A [`RemoteShellChannel`] is whatever can carry an interactive shell: it
//! accepts environment variables and a PTY request, hands out an input stream
//! plus output and error streams, starts a program and can be closed. The SSH
//! implementation lives in [`crate::transport`]; anything else (a test double,
//! a serial console bridge) only needs to implement the trait.

mod buffer;
mod drainer;
mod terminator;
#[cfg(test)]
pub(crate) mod testing;

pub use buffer::ResponseBuffer;
pub use drainer::{Chunk, READ_BUFFER_SIZE, RunFlag, StreamDrainer, StreamKind};
pub use terminator::{PromptMatcher, Terminator, any_match, matches};

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Boxed readable half of a remote stream.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed writable half of a remote stream.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// The three streams of an interactive remote program.
pub struct ShellStreams {
    /// Program input.
    pub stdin: BoxedWriter,

    /// Primary output.
    pub stdout: BoxedReader,

    /// Error output.
    pub stderr: BoxedReader,
}

/// Terminal modes sent with the PTY request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalModes {
    /// Whether the terminal echoes input back.
    pub echo: bool,

    /// Input speed in baud.
    pub input_speed: u32,

    /// Output speed in baud.
    pub output_speed: u32,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            echo: false,
            input_speed: 14400,
            output_speed: 14400,
        }
    }
}

/// Pseudo-terminal request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Terminal type, e.g. `xterm`.
    pub term: String,

    /// Terminal width in characters.
    pub columns: u32,

    /// Terminal height in rows.
    pub rows: u32,

    /// Terminal modes.
    pub modes: TerminalModes,
}

/// A channel able to host one interactive remote program.
///
/// Calls arrive in this order: [`set_env`](Self::set_env) (zero or more
/// times), [`request_pty`](Self::request_pty),
/// [`open_streams`](Self::open_streams), [`start`](Self::start) and finally
/// [`close`](Self::close). Closing must make pending reads on the output and
/// error streams fail or reach end-of-stream.
pub trait RemoteShellChannel: Send + 'static {
    /// Set an environment variable for the program about to be started.
    fn set_env(&mut self, name: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Allocate a pseudo-terminal.
    fn request_pty(&mut self, pty: &PtyRequest) -> impl Future<Output = Result<()>> + Send;

    /// Hand out the input, output and error streams. Can only succeed once.
    fn open_streams(&mut self) -> Result<ShellStreams>;

    /// Start `program` on the channel.
    fn start(&mut self, program: &str) -> impl Future<Output = Result<()>> + Send;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
