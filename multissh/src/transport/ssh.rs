//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Pty};
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::channel::{PtyRequest, RemoteShellChannel, ShellStreams};
use crate::error::{ChannelError, Result, TransportError};

/// Buffer size of the in-memory pipes between the channel and its streams.
const PIPE_CAPACITY: usize = 256 * 1024;

/// SSH extended data type carrying the remote program's stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Keepalive period for the long-lived connection.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// How long the server gets to accept or refuse a channel request.
const REQUEST_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated SSH connection that shell channels are opened on.
pub struct SshTransport {
    handle: Handle<SshHandler>,

    /// `host:port`, for logging.
    peer: String,
}

impl SshTransport {
    /// Connect to the SSH server, verify its host key and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let peer = config.socket_addr();
        let rejection = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            mode: config.host_key_verification.clone(),
            known_hosts: KnownHosts {
                host: config.host.clone(),
                port: config.port,
                path: config.known_hosts_path.clone(),
            },
            rejection: rejection.clone(),
        };

        // The shell may sit idle between commands, so keep the link alive
        // instead of timing out on inactivity
        let russh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });

        debug!("connecting to {}", peer);
        let connecting = client::connect(russh_config, (config.host.as_str(), config.port), handler);
        let mut handle = match tokio::time::timeout(config.timeout, connecting).await {
            Err(_) => return Err(TransportError::Timeout(config.timeout).into()),
            Ok(Ok(handle)) => handle,
            // russh only reports UnknownKey; prefer the reason recorded by the handler
            Ok(Err(e)) => {
                let recorded = rejection.lock().ok().and_then(|mut slot| slot.take());
                return Err(recorded.unwrap_or(TransportError::Ssh(e)).into());
            }
        };

        authenticate(&mut handle, &config.username, &config.auth).await?;
        debug!("authenticated to {} as '{}'", peer, config.username);

        Ok(Self { handle, peer })
    }

    /// Open a shell channel, keeping this connection usable for more.
    pub async fn open_channel(&self) -> Result<SshShellChannel> {
        let channel = self.open_session().await?;
        Ok(SshShellChannel::new(channel, None))
    }

    /// Open a shell channel that owns this connection.
    ///
    /// Closing the channel also disconnects.
    pub async fn into_shell_channel(self) -> Result<SshShellChannel> {
        let channel = self.open_session().await?;
        Ok(SshShellChannel::new(channel, Some(self)))
    }

    async fn open_session(&self) -> Result<Channel<Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        trace!("opened session channel on {}", self.peer);
        Ok(channel)
    }

    /// Disconnect from the server.
    pub async fn close(self) -> Result<()> {
        debug!("disconnecting from {}", self.peer);
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

async fn authenticate(
    handle: &mut Handle<SshHandler>,
    username: &str,
    auth: &AuthMethod,
) -> Result<()> {
    let outcome = match auth {
        AuthMethod::None => handle.authenticate_none(username).await,
        AuthMethod::Password(password) => {
            handle
                .authenticate_password(username, password.expose_secret())
                .await
        }
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
            // RSA keys sign with the strongest hash the server accepts
            let hash = handle
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();
            handle
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                .await
        }
    }
    .map_err(TransportError::Ssh)?;

    if outcome.success() {
        Ok(())
    } else {
        Err(TransportError::AuthenticationFailed {
            user: username.to_string(),
        }
        .into())
    }
}

/// The known_hosts entry for one `host:port`.
struct KnownHosts {
    host: String,
    port: u16,
    /// `None` means the user's default file.
    path: Option<PathBuf>,
}

impl KnownHosts {
    /// Whether `key` is recorded for this host. A different recorded key is an error.
    fn lookup(&self, key: &PublicKey) -> std::result::Result<bool, TransportError> {
        let found = match &self.path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        found.map_err(|e| match e {
            russh::keys::Error::KeyChanged { line } => TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            },
            other => TransportError::KnownHosts(other.to_string()),
        })
    }

    fn remember(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        let saved = match &self.path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, key),
        };
        saved.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }
}

struct SshHandler {
    mode: HostKeyVerification,
    known_hosts: KnownHosts,
    /// Why the host key was refused, read back by `connect`.
    rejection: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn verify(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        if self.mode == HostKeyVerification::Disabled || self.known_hosts.lookup(key)? {
            return Ok(());
        }

        match self.mode {
            HostKeyVerification::Strict => Err(TransportError::HostKeyUnknown {
                host: self.known_hosts.host.clone(),
                port: self.known_hosts.port,
            }),
            _ => {
                if let Err(e) = self.known_hosts.remember(key) {
                    warn!("Failed to save host key: {}", e);
                }
                Ok(())
            }
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("rejecting host key: {}", e);
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}

/// The server's answer to a channel request sent with `want_reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestReply {
    Accepted,
    Refused,
    /// No answer within [`REQUEST_REPLY_TIMEOUT`].
    Silent,
    Closed,
}

impl RequestReply {
    /// The reply carried by `msg`, or `None` if `msg` is unrelated.
    fn from_msg(msg: Option<&ChannelMsg>) -> Option<Self> {
        match msg {
            Some(ChannelMsg::Success) => Some(Self::Accepted),
            Some(ChannelMsg::Failure) => Some(Self::Refused),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => Some(Self::Closed),
            Some(_) => None,
        }
    }

    fn check(
        self,
        failed: impl FnOnce(String) -> ChannelError,
    ) -> std::result::Result<(), ChannelError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Refused => Err(failed("refused by server".to_string())),
            Self::Silent => Err(failed("no reply from server".to_string())),
            Self::Closed => Err(ChannelError::Closed),
        }
    }
}

/// Wait for the reply to a request made on a channel that is not split yet.
async fn await_reply(channel: &mut Channel<Msg>) -> RequestReply {
    let waiting = async {
        loop {
            let msg = channel.wait().await;
            match RequestReply::from_msg(msg.as_ref()) {
                Some(reply) => return reply,
                None => trace!("ignoring {:?} while awaiting a reply", msg),
            }
        }
    };
    tokio::time::timeout(REQUEST_REPLY_TIMEOUT, waiting)
        .await
        .unwrap_or(RequestReply::Silent)
}

/// Wait for a reply forwarded by the pump.
async fn await_forwarded(replies: &mut mpsc::UnboundedReceiver<RequestReply>) -> RequestReply {
    match tokio::time::timeout(REQUEST_REPLY_TIMEOUT, replies.recv()).await {
        Ok(Some(reply)) => reply,
        Ok(None) => RequestReply::Closed,
        Err(_) => RequestReply::Silent,
    }
}

/// A russh session channel used as a [`RemoteShellChannel`].
///
/// Environment and PTY requests go out on the whole channel and wait for the
/// server's answer. Opening the streams splits the channel: a pump task then
/// demultiplexes output and stderr into two in-memory pipes, forwards an
/// input pipe to the channel and hands request replies back to [`start`].
/// Closing aborts the pump, so both output pipes reach end-of-stream.
///
/// [`start`]: RemoteShellChannel::start
pub struct SshShellChannel {
    /// The channel until its streams are opened.
    channel: Option<Channel<Msg>>,

    /// Write half once the channel is split.
    writer: Option<Arc<ChannelWriteHalf<Msg>>>,

    /// Request replies seen by the pump.
    replies: Option<mpsc::UnboundedReceiver<RequestReply>>,

    pump: Option<JoinHandle<()>>,

    /// Connection owned by this channel, if any.
    transport: Option<SshTransport>,
}

impl SshShellChannel {
    fn new(channel: Channel<Msg>, transport: Option<SshTransport>) -> Self {
        Self {
            channel: Some(channel),
            writer: None,
            replies: None,
            pump: None,
            transport,
        }
    }

    fn unsplit(&mut self) -> std::result::Result<&mut Channel<Msg>, ChannelError> {
        self.channel.as_mut().ok_or(ChannelError::StreamsTaken)
    }
}

impl RemoteShellChannel for SshShellChannel {
    async fn set_env(&mut self, name: &str, value: &str) -> Result<()> {
        let rejected = |message: String| ChannelError::EnvRejected {
            name: name.to_string(),
            message,
        };

        let channel = self.unsplit()?;
        channel
            .set_env(true, name, value)
            .await
            .map_err(|e| rejected(e.to_string()))?;
        await_reply(channel).await.check(rejected)?;
        Ok(())
    }

    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<()> {
        let modes = [
            (Pty::ECHO, u32::from(pty.modes.echo)),
            (Pty::TTY_OP_ISPEED, pty.modes.input_speed),
            (Pty::TTY_OP_OSPEED, pty.modes.output_speed),
        ];

        let channel = self.unsplit()?;
        channel
            .request_pty(true, &pty.term, pty.columns, pty.rows, 0, 0, &modes)
            .await
            .map_err(|e| ChannelError::PtyRequestFailed(e.to_string()))?;
        await_reply(channel)
            .await
            .check(ChannelError::PtyRequestFailed)?;
        Ok(())
    }

    fn open_streams(&mut self) -> Result<ShellStreams> {
        let channel = self.channel.take().ok_or(ChannelError::StreamsTaken)?;
        let (reader, writer) = channel.split();
        let writer = Arc::new(writer);
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let (stdin_local, stdin_remote) = duplex(PIPE_CAPACITY);
        let (stdout_local, stdout_remote) = duplex(PIPE_CAPACITY);
        let (stderr_local, stderr_remote) = duplex(PIPE_CAPACITY);

        self.pump = Some(tokio::spawn(pump(
            reader,
            writer.clone(),
            replies_tx,
            stdin_remote,
            stdout_remote,
            stderr_remote,
        )));
        self.writer = Some(writer);
        self.replies = Some(replies_rx);

        Ok(ShellStreams {
            stdin: Box::pin(stdin_local),
            stdout: Box::pin(stdout_local),
            stderr: Box::pin(stderr_local),
        })
    }

    async fn start(&mut self, program: &str) -> Result<()> {
        let (Some(writer), Some(replies)) = (self.writer.as_ref(), self.replies.as_mut()) else {
            return Err(ChannelError::Closed.into());
        };
        let failed = |message: String| ChannelError::StartFailed {
            program: program.to_string(),
            message,
        };

        writer
            .exec(true, program)
            .await
            .map_err(|e| failed(e.to_string()))?;
        await_forwarded(replies).await.check(failed)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.replies = None;

        let closed = match (self.writer.take(), self.channel.take()) {
            (Some(writer), _) => writer.close().await,
            (None, Some(channel)) => channel.close().await,
            (None, None) => Ok(()),
        };
        if let Err(e) = closed {
            // The peer may already have closed its side
            debug!("channel close: {}", e);
        }

        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}

/// Move bytes between the russh channel and the local pipes until either side ends.
async fn pump(
    mut reader: ChannelReadHalf,
    writer: Arc<ChannelWriteHalf<Msg>>,
    replies: mpsc::UnboundedSender<RequestReply>,
    mut stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
) {
    let mut buf = vec![0u8; 32 * 1024];
    let mut stdin_open = true;

    loop {
        tokio::select! {
            msg = reader.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    if stdout.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                    if stderr.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("remote channel ended");
                    break;
                }
                Some(other) => match RequestReply::from_msg(Some(&other)) {
                    // Nobody waits once the shell has started
                    Some(reply) => {
                        let _ = replies.send(reply);
                    }
                    None => trace!("ignoring channel message {:?}", other),
                },
            },
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => stdin_open = false,
                Ok(n) => {
                    if let Err(e) = writer.data(&buf[..n]).await {
                        warn!("failed to send shell input: {}", e);
                        break;
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_from_msg() {
        assert_eq!(
            RequestReply::from_msg(Some(&ChannelMsg::Success)),
            Some(RequestReply::Accepted)
        );
        assert_eq!(
            RequestReply::from_msg(Some(&ChannelMsg::Failure)),
            Some(RequestReply::Refused)
        );
        assert_eq!(
            RequestReply::from_msg(Some(&ChannelMsg::Eof)),
            Some(RequestReply::Closed)
        );
        assert_eq!(RequestReply::from_msg(None), Some(RequestReply::Closed));
        assert_eq!(
            RequestReply::from_msg(Some(&ChannelMsg::WindowAdjusted { new_size: 1024 })),
            None
        );
    }

    #[test]
    fn test_refused_request_is_an_error() {
        assert!(RequestReply::Accepted.check(ChannelError::PtyRequestFailed).is_ok());

        let err = RequestReply::Refused
            .check(ChannelError::PtyRequestFailed)
            .unwrap_err();
        assert!(matches!(err, ChannelError::PtyRequestFailed(ref m) if m == "refused by server"));

        let err = RequestReply::Silent
            .check(|message| ChannelError::EnvRejected {
                name: "LANG".to_string(),
                message,
            })
            .unwrap_err();
        assert!(err.to_string().contains("no reply from server"));

        assert!(matches!(
            RequestReply::Closed.check(ChannelError::PtyRequestFailed),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_refused_exec_reaches_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(RequestReply::Refused).unwrap();

        let err = await_forwarded(&mut rx)
            .await
            .check(|message| ChannelError::StartFailed {
                program: "/bin/bash".to_string(),
                message,
            })
            .unwrap_err();
        assert!(matches!(err, ChannelError::StartFailed { ref message, .. } if message == "refused by server"));

        drop(tx);
        assert_eq!(await_forwarded(&mut rx).await, RequestReply::Closed);
    }
}
