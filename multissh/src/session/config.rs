//! Session configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::channel::{PtyRequest, TerminalModes};

/// Program started on the channel when none is configured.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Settings for opening a [`ShellSession`](super::ShellSession).
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use multissh::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_shell("/bin/sh")
///     .with_env("LANG", "C");
/// assert_eq!(config.rows, 24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program to start on the channel.
    pub shell: String,

    /// Terminal type for the PTY.
    pub term: String,

    /// Terminal height.
    pub rows: u32,

    /// Terminal width.
    pub columns: u32,

    /// Environment variables, applied in insertion order.
    pub env: IndexMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            term: "xterm".to_string(),
            rows: 24,
            columns: 511,
            env: IndexMap::new(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the program to start.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the terminal type.
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, columns: u32, rows: u32) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// The program to start, falling back to [`DEFAULT_SHELL`] when blank.
    pub fn shell(&self) -> &str {
        if self.shell.trim().is_empty() {
            DEFAULT_SHELL
        } else {
            &self.shell
        }
    }

    /// Build the PTY request for this configuration. Echo is always disabled.
    pub fn pty_request(&self) -> PtyRequest {
        PtyRequest {
            term: self.term.clone(),
            columns: self.columns,
            rows: self.rows,
            modes: TerminalModes::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.shell(), "/bin/bash");
        assert_eq!(config.term, "xterm");
        assert_eq!((config.columns, config.rows), (511, 24));
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_blank_shell_falls_back() {
        let config = SessionConfig::new().with_shell("  ");
        assert_eq!(config.shell(), DEFAULT_SHELL);
    }

    #[test]
    fn test_env_keeps_insertion_order() {
        let config = SessionConfig::new()
            .with_env("ZED", "1")
            .with_env("ALPHA", "2");
        let names: Vec<_> = config.env.keys().map(String::as_str).collect();
        assert_eq!(names, ["ZED", "ALPHA"]);
    }

    #[test]
    fn test_pty_request_disables_echo() {
        let pty = SessionConfig::new()
            .with_term("vt100")
            .with_terminal_size(132, 50)
            .pty_request();
        assert_eq!(pty.term, "vt100");
        assert_eq!((pty.columns, pty.rows), (132, 50));
        assert!(!pty.modes.echo);
        assert_eq!(pty.modes.input_speed, 14400);
        assert_eq!(pty.modes.output_speed, 14400);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"shell": "/bin/zsh", "env": {"LC_ALL": "C"}}"#).unwrap();
        assert_eq!(config.shell(), "/bin/zsh");
        assert_eq!(config.rows, 24);
        assert_eq!(config.env.get("LC_ALL").map(String::as_str), Some("C"));
    }
}
