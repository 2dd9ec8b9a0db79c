//! Builder for opening shell sessions over SSH.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::config::SessionConfig;
use super::shell::ShellSession;
use crate::error::{Result, SessionError};
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig, SshTransport};

/// Builder for connecting to a host and starting a [`ShellSession`] on it.
///
/// # Example
///
/// ```rust,no_run
/// use multissh::{MultiCommandSession, SessionBuilder};
///
/// # async fn example() -> Result<(), multissh::Error> {
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .env("LC_ALL", "C")
///     .open()
///     .await?;
/// println!("{} host, prompt {:?}", session.kernel_name(), session.shell_prompt());
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    timeout: Duration,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    session: SessionConfig,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            session: SessionConfig::default(),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the host key verification mode (default: accept new keys).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Set the program started on the remote side (default: `/bin/bash`).
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.session = self.session.with_shell(shell);
        self
    }

    /// Set the terminal type requested for the PTY.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.session = self.session.with_term(term);
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, columns: u32, rows: u32) -> Self {
        self.session = self.session.with_terminal_size(columns, rows);
        self
    }

    /// Add an environment variable to set before the shell starts.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.session = self.session.with_env(name, value);
        self
    }

    /// Replace the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Connect, authenticate and start the shell.
    ///
    /// The returned session has completed its handshake. The session owns
    /// the connection; closing the session disconnects.
    pub async fn open(self) -> Result<ShellSession> {
        let (ssh_config, session_config) = self.into_configs()?;
        let transport = SshTransport::connect(ssh_config).await?;
        let channel = transport.into_shell_channel().await?;
        ShellSession::open(channel, &session_config).await
    }

    fn into_configs(self) -> Result<(SshConfig, SessionConfig)> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig {
                message: "Host is required".to_string(),
            }
            .into());
        }

        let username = self.username.ok_or_else(|| SessionError::InvalidConfig {
            message: "Username is required".to_string(),
        })?;

        let ssh_config = SshConfig {
            host: self.host,
            port: self.port,
            username,
            auth: self.auth,
            timeout: self.timeout,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        };

        Ok((ssh_config, self.session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_username_required() {
        let err = SessionBuilder::new("10.0.0.1").into_configs().unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_host_required() {
        let err = SessionBuilder::new("  ")
            .username("admin")
            .into_configs()
            .unwrap_err();
        assert!(err.to_string().contains("Host is required"));
    }

    #[test]
    fn test_configs() {
        let (ssh, session) = SessionBuilder::new("10.0.0.1")
            .port(2222)
            .username("admin")
            .private_key("/tmp/id_ed25519")
            .host_key_verification(HostKeyVerification::Strict)
            .shell("/bin/sh")
            .terminal_size(200, 50)
            .env("LANG", "C")
            .into_configs()
            .unwrap();

        assert_eq!(ssh.socket_addr(), "10.0.0.1:2222");
        assert_eq!(ssh.username, "admin");
        assert_eq!(ssh.host_key_verification, HostKeyVerification::Strict);
        assert!(matches!(ssh.auth, AuthMethod::PrivateKey { passphrase: None, .. }));

        assert_eq!(session.shell(), "/bin/sh");
        assert_eq!(session.columns, 200);
        assert_eq!(session.rows, 50);
        assert_eq!(session.env.get("LANG").map(String::as_str), Some("C"));
    }
}
