//! In-memory remote shell for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::task::JoinHandle;

use super::{PtyRequest, RemoteShellChannel, ShellStreams};
use crate::error::{ChannelError, Result};

pub(crate) const FAKE_PROMPT: &str = "$ ";
pub(crate) const FAKE_BANNER: &str = "Welcome to the fake shell\r\n";

/// What the fake shell writes back for one input line.
#[derive(Debug, Default, Clone)]
pub(crate) struct Reply {
    pub stdout: String,
    pub stderr: String,
    /// Written `delay` after the prompt.
    pub late: String,
    /// Pause after stderr and before `late`.
    pub delay: Duration,
    /// Skip the prompt after the reply.
    pub silent: bool,
    /// Exit the shell, closing all streams.
    pub exit: bool,
}

impl Reply {
    pub fn out(text: &str) -> Self {
        Self {
            stdout: text.to_string(),
            ..Default::default()
        }
    }

    pub fn err(text: &str) -> Self {
        Self {
            stderr: text.to_string(),
            delay: Duration::from_millis(30),
            ..Default::default()
        }
    }
}

type Script = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

/// Default behaviour of a POSIX-ish shell with echo disabled.
pub(crate) fn default_script(line: &str) -> Reply {
    match line {
        "" => Reply::default(),
        "uname -s" => Reply::out("Linux\r\n"),
        "fail" => Reply::err("boom\r\n"),
        "silent" => Reply {
            silent: true,
            ..Default::default()
        },
        "exit" => Reply {
            exit: true,
            ..Default::default()
        },
        _ => match line.strip_prefix("echo ") {
            Some(text) => Reply::out(&format!("{}\r\n", text)),
            None => Reply::out(&format!("sh: {}: command not found\r\n", line)),
        },
    }
}

/// What happened to a [`FakeChannel`], observable after it moved into a session.
#[derive(Debug, Default)]
pub(crate) struct Observed {
    pub env: Vec<(String, String)>,
    pub pty: Option<PtyRequest>,
    pub program: Option<String>,
    pub lines: Vec<String>,
    pub closed: bool,
}

struct RemoteEnds {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

pub(crate) struct FakeChannel {
    script: Script,
    observed: Arc<Mutex<Observed>>,
    remote: Option<RemoteEnds>,
    shell: Option<JoinHandle<()>>,
    fail_start: bool,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::with_script(default_script)
    }

    pub fn with_script(script: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            observed: Arc::new(Mutex::new(Observed::default())),
            remote: None,
            shell: None,
            fail_start: false,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn observed(&self) -> Arc<Mutex<Observed>> {
        self.observed.clone()
    }
}

impl RemoteShellChannel for FakeChannel {
    async fn set_env(&mut self, name: &str, value: &str) -> Result<()> {
        let mut observed = self.observed.lock().unwrap();
        observed.env.push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<()> {
        self.observed.lock().unwrap().pty = Some(pty.clone());
        Ok(())
    }

    fn open_streams(&mut self) -> Result<ShellStreams> {
        if self.remote.is_some() {
            return Err(ChannelError::StreamsTaken.into());
        }
        let (stdin_local, stdin_remote) = duplex(64 * 1024);
        let (stdout_local, stdout_remote) = duplex(64 * 1024);
        let (stderr_local, stderr_remote) = duplex(64 * 1024);
        self.remote = Some(RemoteEnds {
            stdin: stdin_remote,
            stdout: stdout_remote,
            stderr: stderr_remote,
        });
        Ok(ShellStreams {
            stdin: Box::pin(stdin_local),
            stdout: Box::pin(stdout_local),
            stderr: Box::pin(stderr_local),
        })
    }

    async fn start(&mut self, program: &str) -> Result<()> {
        if self.fail_start {
            return Err(ChannelError::StartFailed {
                program: program.to_string(),
                message: "exec request refused".to_string(),
            }
            .into());
        }
        let remote = self.remote.take().ok_or(ChannelError::Closed)?;
        self.observed.lock().unwrap().program = Some(program.to_string());
        self.shell = Some(tokio::spawn(run_shell(
            remote,
            self.script.clone(),
            self.observed.clone(),
        )));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.observed.lock().unwrap().closed = true;
        self.remote = None;
        if let Some(shell) = self.shell.take() {
            shell.abort();
        }
        Ok(())
    }
}

async fn run_shell(remote: RemoteEnds, script: Script, observed: Arc<Mutex<Observed>>) {
    let RemoteEnds {
        stdin,
        mut stdout,
        mut stderr,
    } = remote;

    let banner = format!("{}{}", FAKE_BANNER, FAKE_PROMPT);
    if stdout.write_all(banner.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(stdin).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        observed.lock().unwrap().lines.push(line.clone());
        let reply = script(&line);
        if reply.exit {
            return;
        }
        if !reply.stderr.is_empty() && stderr.write_all(reply.stderr.as_bytes()).await.is_err() {
            return;
        }
        if !reply.stderr.is_empty() {
            tokio::time::sleep(reply.delay).await;
        }
        let mut out = reply.stdout;
        if !reply.silent {
            out.push_str(FAKE_PROMPT);
        }
        if !out.is_empty() && stdout.write_all(out.as_bytes()).await.is_err() {
            return;
        }
        if !reply.late.is_empty() {
            tokio::time::sleep(reply.delay).await;
            if stdout.write_all(reply.late.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}
