//! Interactive shell session over a [`RemoteShellChannel`].

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::MultiCommandSession;
use super::collector::{QUEUE_CAPACITY, ResponseCollector};
use super::config::SessionConfig;
use super::response::Response;
use crate::channel::{
    BoxedWriter, RemoteShellChannel, RunFlag, StreamDrainer, StreamKind, Terminator,
};
use crate::error::{Error, Result, SessionError};

/// Timeout for learning the shell prompt.
pub const PROMPT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Command used to identify the remote kernel.
pub const KERNEL_PROBE_COMMAND: &str = "uname -s";

/// Timeout for the kernel probe.
pub const KERNEL_PROBE_TIMEOUT: Duration = Duration::from_millis(20000);

/// Terminators for the kernel probe.
pub const KERNEL_PROBE_TERMINATORS: &[&str] = &["Linux", "Darwin", "$", "#"];

/// Input stream slot shared with the teardown task.
type InputSlot = Arc<Mutex<Option<BoxedWriter>>>;

/// A long-lived interactive shell that runs one command at a time.
///
/// Opening the session performs the startup handshake: the shell banner is
/// absorbed, the idle prompt is learned by sending an empty line and the
/// remote kernel is identified with `uname -s`.
///
/// Output and error streams are drained by two background tasks. If either
/// stream fails or ends, the whole session is torn down.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use multissh::{MultiCommandSession, SessionConfig, ShellSession, SshConfig, SshTransport};
///
/// # async fn example(ssh: SshConfig) -> Result<(), multissh::Error> {
/// let channel = SshTransport::connect(ssh).await?.into_shell_channel().await?;
/// let mut session = ShellSession::open(channel, &SessionConfig::default()).await?;
///
/// println!("kernel: {}", session.kernel_name());
/// let response = session.run("ls -la", Duration::from_secs(10), &[]).await?;
/// println!("{}", response.result);
///
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ShellSession {
    collector: ResponseCollector,
    stdin: InputSlot,
    run_flag: RunFlag,
    drainers: Vec<JoinHandle<()>>,
    reaper: Option<JoinHandle<Result<()>>>,
    shell_prompt: String,
    kernel_name: String,
}

impl ShellSession {
    /// Start a shell on `channel` and perform the startup handshake.
    ///
    /// On failure the channel is closed and only the error is returned.
    pub async fn open<C: RemoteShellChannel>(mut channel: C, config: &SessionConfig) -> Result<Self> {
        if let Err(e) = Self::prepare(&mut channel, config).await {
            if let Err(close_err) = channel.close().await {
                debug!("closing channel after setup failure: {}", close_err);
            }
            return Err(e);
        }

        let streams = match channel.open_streams() {
            Ok(streams) => streams,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    debug!("closing channel after setup failure: {}", close_err);
                }
                return Err(SessionError::handshake("opening streams", e).into());
            }
        };

        // Drainers run before the program starts so no banner bytes are lost
        let run_flag = RunFlag::new();
        let (stdout_tx, stdout_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel(QUEUE_CAPACITY);
        let drainers = vec![
            StreamDrainer::new(StreamKind::Stdout, streams.stdout, stdout_tx, run_flag.clone())
                .spawn(),
            StreamDrainer::new(StreamKind::Stderr, streams.stderr, stderr_tx, run_flag.clone())
                .spawn(),
        ];
        let stdin: InputSlot = Arc::new(Mutex::new(Some(streams.stdin)));

        let program = config.shell();
        debug!("starting '{}' on channel", program);
        let started = channel.start(program).await;

        // From here on the reaper owns the channel and tears everything down
        // once the run flag stops, whoever stops it.
        let reaper = tokio::spawn(reap(run_flag.clone(), stdin.clone(), channel));

        let mut session = Self {
            collector: ResponseCollector::new(stdout_rx, stderr_rx),
            stdin,
            run_flag,
            drainers,
            reaper: Some(reaper),
            shell_prompt: String::new(),
            kernel_name: String::new(),
        };

        let handshake = match started {
            Ok(()) => session.handshake().await,
            Err(e) => Err(SessionError::handshake("starting the shell", e).into()),
        };

        match handshake {
            Ok(()) => Ok(session),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!("closing session after handshake failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Apply environment and PTY settings before any stream is opened.
    async fn prepare<C: RemoteShellChannel>(channel: &mut C, config: &SessionConfig) -> Result<()> {
        for (name, value) in &config.env {
            channel
                .set_env(name, value)
                .await
                .map_err(|e| SessionError::handshake("setting environment", e))?;
        }

        channel
            .request_pty(&config.pty_request())
            .await
            .map_err(|e| SessionError::handshake("requesting a PTY", e))?;

        Ok(())
    }

    /// Absorb the banner, learn the prompt and identify the kernel.
    async fn handshake(&mut self) -> Result<()> {
        let banner = self.read_response(Duration::ZERO, Vec::new()).await;
        debug!("absorbed {} bytes of startup banner", banner.raw_result.len());
        if let Some(stderr) = banner.stderr {
            debug!("startup banner wrote to stderr: {:?}", stderr);
        }

        let prompt = self
            .run("", PROMPT_PROBE_TIMEOUT, &[])
            .await
            .and_then(Response::into_result)
            .map_err(|e| SessionError::handshake("learning the shell prompt", e))?;
        debug!("learned shell prompt {:?}", prompt);
        self.shell_prompt = prompt;
        self.collector.flush_stale().await;

        let kernel = self
            .run(
                KERNEL_PROBE_COMMAND,
                KERNEL_PROBE_TIMEOUT,
                KERNEL_PROBE_TERMINATORS,
            )
            .await
            .and_then(Response::into_result)
            .map_err(|e| SessionError::handshake("probing the kernel name", e))?;
        self.collector.flush_stale().await;
        self.kernel_name = normalize_kernel_name(&kernel);
        debug!("remote kernel is {:?}", self.kernel_name);

        Ok(())
    }

    async fn read_response(&mut self, timeout: Duration, terminators: Vec<Terminator>) -> Response {
        self.collector
            .read_response(timeout, terminators, &self.shell_prompt)
            .await
    }

    /// Write `command` and a newline to the shell's input.
    async fn write_command(&mut self, command: &str) -> Result<()> {
        let mut slot = self.stdin.lock().await;
        let stdin = slot.as_mut().ok_or(SessionError::Closed)?;

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');

        let written = match stdin.write_all(&line).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|source| {
            SessionError::Write {
                command: command.to_string(),
                source,
            }
            .into()
        })
    }
}

impl MultiCommandSession for ShellSession {
    async fn run(
        &mut self,
        command: &str,
        timeout: Duration,
        terminators: &[&str],
    ) -> Result<Response> {
        if !self.run_flag.is_running() {
            return Err(SessionError::Closed.into());
        }

        self.collector.flush_stale().await;
        self.write_command(command).await?;

        let mut response = self
            .read_response(timeout, Terminator::parse_all(terminators))
            .await;
        response.command = command.to_string();
        Ok(response)
    }

    fn shell_prompt(&self) -> &str {
        &self.shell_prompt
    }

    fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    fn is_running(&self) -> bool {
        self.run_flag.is_running()
    }

    async fn close(&mut self) -> Result<()> {
        self.run_flag.stop();

        let Some(reaper) = self.reaper.take() else {
            return Ok(());
        };

        for drainer in self.drainers.drain(..) {
            if let Err(e) = drainer.await {
                warn!("drainer task failed: {}", e);
            }
        }

        match reaper.await {
            Ok(result) => result,
            Err(e) => {
                warn!("teardown task failed: {}", e);
                Ok(())
            }
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if self.reaper.is_some() && self.run_flag.is_running() {
            warn!("ShellSession dropped without close(), tearing down in background");
        }
        self.run_flag.stop();
    }
}

/// Wait for the session to stop, then close the input and the channel.
async fn reap<C: RemoteShellChannel>(run_flag: RunFlag, stdin: InputSlot, mut channel: C) -> Result<()> {
    run_flag.stopped().await;
    debug!("tearing down shell session");

    if let Some(mut stdin) = stdin.lock().await.take() {
        if let Err(e) = stdin.shutdown().await {
            debug!("closing shell input: {}", e);
        }
    }

    channel.close().await.map_err(|e: Error| {
        warn!("closing channel: {}", e);
        e
    })
}

/// Lower-case the first non-blank line of a kernel probe reply.
fn normalize_kernel_name(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_lowercase()
}
