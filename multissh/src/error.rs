//! Error types for multissh.

use std::io;
use thiserror::Error;

/// Main error type for multissh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Remote shell channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session-level errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and verification is strict
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Channel layer errors (environment, PTY, program start).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The remote side refused an environment variable
    #[error("Failed to set environment variable '{name}': {message}")]
    EnvRejected { name: String, message: String },

    /// Failed to request a pseudo-terminal
    #[error("Failed to request PTY: {0}")]
    PtyRequestFailed(String),

    /// The input/output/error streams were already handed out
    #[error("Channel streams already taken")]
    StreamsTaken,

    /// Failed to start the remote program
    #[error("Failed to start '{program}': {message}")]
    StartFailed { program: String, message: String },

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// I/O error on one of the channel streams
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session errors (command submission, handshake, remote diagnostics).
#[derive(Error, Debug)]
pub enum SessionError {
    /// Writing the command to the shell's input failed
    #[error("Failed to execute command '{command}': {source}")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The session is no longer running
    #[error("Session closed")]
    Closed,

    /// Text the remote side wrote to its error stream while a response was collected
    #[error("{message}")]
    Remote { message: String },

    /// The builder was given an unusable configuration
    #[error("Invalid session configuration: {message}")]
    InvalidConfig { message: String },

    /// A construction step failed
    #[error("Session setup failed while {step}: {source}")]
    Handshake {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl SessionError {
    /// Wrap `source` with the handshake step it happened in.
    pub(crate) fn handshake(step: &'static str, source: impl Into<Error>) -> Self {
        Self::Handshake {
            step,
            source: Box::new(source.into()),
        }
    }
}

/// Result type alias using multissh's Error.
pub type Result<T> = std::result::Result<T, Error>;
