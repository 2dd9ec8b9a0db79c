//! # multissh
//!
//! Run many commands, one after another, over a single interactive remote
//! shell.
//!
//! A [`ShellSession`] starts a shell on a [`RemoteShellChannel`], learns the
//! shell's idle prompt and the remote kernel name, and then runs commands
//! sequentially. Each command's response is collected until a terminator
//! pattern (by default the prompt) shows up in the output or a timeout
//! expires, with the echoed prompt stripped from the result.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Prompt discovery and kernel detection on startup
//! - Terminator patterns anchored at the start or end of the output (`^x`, `x$`)
//! - Error-stream output reported separately from the command result
//! - Stale output flushed before every command
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use multissh::{MultiCommandSession, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), multissh::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .open()
//!         .await?;
//!
//!     let response = session.run("uname -a", Duration::from_secs(5), &[]).await?;
//!     println!("{}", response.result);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use channel::{PtyRequest, RemoteShellChannel, ShellStreams, TerminalModes, Terminator, matches};
pub use error::{Error, Result};
pub use session::{MultiCommandSession, Response, SessionBuilder, SessionConfig, ShellSession};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig, SshShellChannel, SshTransport};
