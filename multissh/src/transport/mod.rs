//! SSH transport layer wrapping russh.
//!
//! This module provides the SSH connection management (connection setup,
//! host key verification, authentication) and [`SshShellChannel`], the
//! russh-backed [`RemoteShellChannel`](crate::channel::RemoteShellChannel).

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::{SshShellChannel, SshTransport};
