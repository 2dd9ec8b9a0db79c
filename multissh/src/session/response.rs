//! Response type for command execution results.

use std::time::Duration;

use crate::error::{Result, SessionError};

/// Response collected for one command.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// The command output with the trailing prompt echo removed.
    pub result: String,

    /// The output exactly as collected.
    pub raw_result: String,

    /// Text the remote side wrote to its error stream, if any.
    pub stderr: Option<String>,

    /// Time taken to collect the response.
    pub elapsed: Duration,

    /// Whether collection ended because the timeout expired rather than a terminator matching.
    pub timed_out: bool,
}

impl Response {
    /// Check if the response carries no error-stream text.
    pub fn is_success(&self) -> bool {
        self.stderr.is_none()
    }

    /// The soft error built from the error stream, if any.
    pub fn error(&self) -> Option<SessionError> {
        self.stderr.as_ref().map(|message| SessionError::Remote {
            message: message.clone(),
        })
    }

    /// Turn error-stream text into an error, otherwise return the result.
    pub fn into_result(self) -> Result<String> {
        match self.stderr {
            Some(message) => Err(SessionError::Remote { message }.into()),
            None => Ok(self.result),
        }
    }

    /// Get the result lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_success_without_stderr() {
        let response = Response {
            result: "a\r\nb".to_string(),
            ..Default::default()
        };
        assert!(response.is_success());
        assert!(response.error().is_none());
        assert_eq!(response.lines().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(response.into_result().unwrap(), "a\r\nb");
    }

    #[test]
    fn test_stderr_becomes_soft_error() {
        let response = Response {
            result: "partial".to_string(),
            stderr: Some("permission denied".to_string()),
            ..Default::default()
        };
        assert!(!response.is_success());
        assert_eq!(response.error().unwrap().to_string(), "permission denied");
        assert!(matches!(
            response.into_result(),
            Err(Error::Session(SessionError::Remote { .. }))
        ));
    }
}
