//! Timeout-bounded aggregation of drained chunks into a response.

use std::time::{Duration, Instant};

use log::{debug, trace};
use tokio::sync::mpsc;

use super::response::Response;
use crate::channel::{Chunk, ResponseBuffer, Terminator};

/// Timeout used when a caller passes zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Timeout of each pass while flushing stale output.
pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(1);

/// Terminator used before the shell prompt has been learned.
pub const FALLBACK_PROMPT_TERMINATOR: &str = "$ $";

/// Capacity of each chunk queue.
pub(crate) const QUEUE_CAPACITY: usize = 1;

/// Raw outcome of one collection pass.
#[derive(Debug, Default)]
pub struct Collected {
    /// Accumulated primary output.
    pub output: ResponseBuffer,

    /// Accumulated error output.
    pub errors: ResponseBuffer,

    /// Whether the timeout ended the pass.
    pub timed_out: bool,
}

/// Reads both chunk queues and decides when a response is complete.
pub struct ResponseCollector {
    stdout: mpsc::Receiver<Chunk>,
    stderr: mpsc::Receiver<Chunk>,
}

impl ResponseCollector {
    /// Create a collector over the two chunk queues.
    pub fn new(stdout: mpsc::Receiver<Chunk>, stderr: mpsc::Receiver<Chunk>) -> Self {
        Self { stdout, stderr }
    }

    /// Accumulate chunks until a terminator matches or `timeout` expires.
    ///
    /// A terminator only ends the pass when the queue it matched on holds no
    /// further chunk, so a burst is not cut in the middle. An empty
    /// `terminators` list means only the timeout ends the pass.
    pub async fn collect(&mut self, timeout: Duration, terminators: &[Terminator]) -> Collected {
        let mut collected = Collected::default();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                Some(chunk) = self.stdout.recv() => {
                    collected.output.extend(&chunk.data);
                    if collected.output.matches(terminators) && self.stdout.is_empty() {
                        break;
                    }
                }
                Some(chunk) = self.stderr.recv() => {
                    collected.errors.extend(&chunk.data);
                    if collected.errors.matches(terminators) && self.stderr.is_empty() {
                        break;
                    }
                }
                _ = &mut deadline => {
                    collected.timed_out = true;
                    break;
                }
            }
        }

        collected
    }

    /// Collect one response.
    ///
    /// A zero `timeout` means [`DEFAULT_TIMEOUT`]. With no `terminators` the
    /// learned `shell_prompt` at the end of the output completes the
    /// response, or [`FALLBACK_PROMPT_TERMINATOR`] while no prompt is known.
    /// The last `"\r\n" + shell_prompt` and everything after it is cut from
    /// the result.
    pub async fn read_response(
        &mut self,
        timeout: Duration,
        terminators: Vec<Terminator>,
        shell_prompt: &str,
    ) -> Response {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        let terminators = if terminators.is_empty() {
            default_terminators(shell_prompt)
        } else {
            terminators
        };

        let start = Instant::now();
        let Collected {
            mut output,
            errors,
            timed_out,
        } = self.collect(timeout, &terminators).await;
        let elapsed = start.elapsed();

        let raw_result = output.as_str_lossy().into_owned();
        output.trim_prompt_echo(shell_prompt);

        debug!(
            "response: {} bytes out, {} bytes err in {:?}{}",
            raw_result.len(),
            errors.len(),
            elapsed,
            if timed_out { " (timed out)" } else { "" }
        );

        Response {
            command: String::new(),
            result: output.into_string(),
            raw_result,
            stderr: (!errors.is_empty()).then(|| errors.into_string()),
            elapsed,
            timed_out,
        }
    }

    /// Discard output left over from earlier activity.
    ///
    /// Runs near-immediate passes with no terminators until one comes back
    /// with no primary output. Returns the number of bytes discarded.
    pub async fn flush_stale(&mut self) -> usize {
        let mut discarded = 0;
        loop {
            let collected = self.collect(FLUSH_TIMEOUT, &[]).await;
            if collected.output.is_empty() {
                break;
            }
            trace!("flushed stale output: {:?}", collected.output.as_str_lossy());
            discarded += collected.output.len() + collected.errors.len();
        }
        if discarded > 0 {
            debug!("flushed {} bytes of stale output", discarded);
        }
        discarded
    }
}

/// Terminators used when a caller supplies none.
pub fn default_terminators(shell_prompt: &str) -> Vec<Terminator> {
    if shell_prompt.is_empty() {
        Terminator::parse(FALLBACK_PROMPT_TERMINATOR)
    } else {
        vec![Terminator::Suffix(shell_prompt.to_string())]
    }
}
