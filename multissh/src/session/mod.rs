//! Session layer: the sequential command runner and its startup handshake.

mod builder;
mod collector;
mod config;
mod response;
mod shell;

pub use builder::SessionBuilder;
pub use collector::{
    Collected, DEFAULT_TIMEOUT, FALLBACK_PROMPT_TERMINATOR, FLUSH_TIMEOUT, ResponseCollector,
    default_terminators,
};
pub use config::{DEFAULT_SHELL, SessionConfig};
pub use response::Response;
pub use shell::{
    KERNEL_PROBE_COMMAND, KERNEL_PROBE_TERMINATORS, KERNEL_PROBE_TIMEOUT, PROMPT_PROBE_TIMEOUT,
    ShellSession,
};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Runs commands one at a time over a single interactive shell.
///
/// Calls take `&mut self`, so commands on one session are always serialized.
pub trait MultiCommandSession: Send {
    /// Send a command and collect its response.
    ///
    /// Stale output is flushed first, then `command` and a newline are
    /// written to the shell. Collection stops when a terminator matches or
    /// `timeout` expires; a zero `timeout` means [`DEFAULT_TIMEOUT`].
    /// Terminators use the string grammar of [`Terminator::parse`](crate::channel::Terminator::parse);
    /// with none, the learned shell prompt ends the response.
    ///
    /// Expiry of the timeout is not an error, and error-stream text is
    /// returned in [`Response::stderr`] rather than as an `Err`. Only a failed
    /// write or a stopped session produce an `Err`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use multissh::MultiCommandSession;
    ///
    /// # async fn example(session: &mut impl MultiCommandSession) -> Result<(), multissh::Error> {
    /// // Wait for a custom marker instead of the prompt
    /// let response = session
    ///     .run("make build; echo BUILD-DONE", Duration::from_secs(300), &["BUILD-DONE"])
    ///     .await?;
    /// if let Some(stderr) = &response.stderr {
    ///     eprintln!("build diagnostics: {}", stderr);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn run(
        &mut self,
        command: &str,
        timeout: Duration,
        terminators: &[&str],
    ) -> impl Future<Output = Result<Response>> + Send;

    /// Send multiple commands sequentially, waiting for the prompt after each.
    fn run_all(
        &mut self,
        commands: &[&str],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Response>>> + Send {
        async move {
            let mut responses = Vec::with_capacity(commands.len());
            for cmd in commands {
                responses.push(self.run(cmd, timeout, &[]).await?);
            }
            Ok(responses)
        }
    }

    /// The idle prompt learned during the handshake.
    fn shell_prompt(&self) -> &str;

    /// The lower-cased remote kernel name learned during the handshake.
    fn kernel_name(&self) -> &str;

    /// Whether the session is still running.
    fn is_running(&self) -> bool;

    /// Stop the session, close the shell's input and close the channel.
    ///
    /// Calling it again has no further effect.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
