//! Error types for remote shell sessions and script loading.
//!
//! Every variant maps onto one of four failure categories (see [`ErrorKind`]):
//! configuration problems are detected before any transport is opened,
//! connection problems while opening it, execution problems while commands are
//! being matched, and I/O problems while reading script files.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::MatchOutcome;

/// Broad failure category of a [`ShellError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or configuration. Raised before any resource is acquired.
    Configuration,
    /// The transport could not be opened or authenticated.
    Connection,
    /// A command did not reach a prompt, or the device reported an error.
    Execution,
    /// A script file could not be read.
    Io,
}

/// Errors that can occur while driving a remote shell.
#[derive(Error, Debug)]
pub enum ShellError {
    /// `execute_command` was called with no commands.
    #[error("command list is empty")]
    EmptyCommandsError,

    /// A command in the batch is empty or whitespace only.
    #[error("command at index {0} is blank")]
    BlankCommandError(usize),

    /// A session parameter is missing or invalid.
    #[error("session parameter '{0}' is invalid")]
    InvalidParameterError(&'static str),

    /// The prompt/error rule configuration could not be compiled.
    #[error("invalid match rule config: {0}")]
    InvalidRuleConfig(String),

    /// The client configuration is inconsistent or could not be decoded.
    #[error("invalid client config: {0}")]
    InvalidConfig(String),

    /// The transport did not finish connecting in time.
    #[error("connect timeout after {0} ms")]
    ConnectTimeout(u64),

    /// The transport was opened but the remote side refused the session.
    #[error("connection failed: {0}")]
    ConnectionError(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// An operation needed an open transport but there was none.
    #[error("transport not connected")]
    NotConnectedError,

    /// Reading from or writing to an open transport failed.
    #[error("transport io error: {0}")]
    TransportIoError(String),

    /// No prompt was seen before sending a command, after every permitted attempt.
    #[error("command[{index}] '{command}' could not be synchronised: {outcome}")]
    SyncError {
        index: usize,
        command: String,
        outcome: MatchOutcome,
    },

    /// The pass after the last command did not end at a prompt.
    #[error("final pass did not reach a prompt: {0}")]
    FinalPassError(MatchOutcome),

    /// Output of a command matched a configured error pattern.
    #[error("device reported an error for '{command}': {line}")]
    DeviceError { command: String, line: String },

    /// A script path was empty.
    #[error("script path is empty")]
    EmptyScriptPathError,

    /// A script file could not be opened or read.
    #[error("failed to read script {path:?}: {source}")]
    ScriptReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A script file failed part way through; `parsed` holds what was read before.
    #[error("script {path:?} truncated after {} commands: {source}", .parsed.len())]
    ScriptTruncatedError {
        path: PathBuf,
        parsed: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    /// Recorded session data could not be decoded or encoded.
    #[error("recording error: {0}")]
    RecordingError(String),
}

impl ShellError {
    /// Returns the failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::EmptyCommandsError
            | ShellError::BlankCommandError(_)
            | ShellError::InvalidParameterError(_)
            | ShellError::InvalidRuleConfig(_)
            | ShellError::InvalidConfig(_)
            | ShellError::EmptyScriptPathError => ErrorKind::Configuration,
            ShellError::ConnectTimeout(_)
            | ShellError::ConnectionError(_)
            | ShellError::Ssh2Error(_)
            | ShellError::RusshError(_) => ErrorKind::Connection,
            ShellError::NotConnectedError
            | ShellError::TransportIoError(_)
            | ShellError::SyncError { .. }
            | ShellError::FinalPassError(_)
            | ShellError::DeviceError { .. }
            | ShellError::RecordingError(_) => ErrorKind::Execution,
            ShellError::ScriptReadError { .. } | ShellError::ScriptTruncatedError { .. } => {
                ErrorKind::Io
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_configuration_kind() {
        assert_eq!(ShellError::EmptyCommandsError.kind(), ErrorKind::Configuration);
        assert_eq!(
            ShellError::InvalidParameterError("host").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(ShellError::EmptyScriptPathError.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn match_failures_are_execution_kind() {
        let err = ShellError::SyncError {
            index: 1,
            command: "show run".to_string(),
            outcome: MatchOutcome::TimedOut,
        };
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("show run"));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(
            ShellError::FinalPassError(MatchOutcome::StreamEnded).kind(),
            ErrorKind::Execution
        );
    }

    #[test]
    fn script_errors_are_io_kind() {
        let err = ShellError::ScriptReadError {
            path: PathBuf::from("/nope.shell"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(ShellError::ConnectTimeout(10).kind(), ErrorKind::Connection);
    }
}
