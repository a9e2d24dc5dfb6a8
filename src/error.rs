//! Error types for engine sessions.
//!
//! Protocol errors come from the external connection and are distinct from
//! transport-connect failures (`std::io::Error`). Evaluation errors carry the
//! best diagnostic that could be recovered from the engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Protocol-level failure reported by a connection while evaluating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProtocolError {
    /// Server status code, when the transport reports one.
    pub code: Option<u32>,
    /// Error text as reported by the connection.
    pub message: String,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Remote evaluation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The engine's own error message was recovered after the fault.
    #[error("{}", render_remote(.message, .traceback.as_deref()))]
    Remote {
        message: String,
        traceback: Option<Vec<String>>,
    },

    /// Diagnostics were unavailable; the original protocol error is kept as is.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl EvalError {
    /// The recovered engine message, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            EvalError::Remote { message, .. } => Some(message),
            EvalError::Protocol(_) => None,
        }
    }
}

fn render_remote(message: &str, traceback: Option<&[String]>) -> String {
    match traceback {
        Some(lines) if !lines.is_empty() => {
            format!("{}\n{}", message.trim_end(), lines.join("\n"))
        }
        _ => message.to_string(),
    }
}

/// Errors starting an engine process and connecting to it.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Engine binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Failed to write engine config file: {0}")]
    ConfigArtifact(#[source] std::io::Error),

    #[error("Failed to spawn engine process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Engine process exited before accepting connections ({0})")]
    ExitedEarly(String),

    #[error("Failed to connect to engine on {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine on port {port} not accepting connections after {waited:?}")]
    ReadinessTimeout { port: u16, waited: Duration },
}

/// Errors running a setup script on a fresh session.
#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Failed to read script {}: {source}", .path.display())]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script {} failed: {source}", .path.display())]
    ScriptFailed {
        path: PathBuf,
        #[source]
        source: EvalError,
    },
}

/// Errors loading an engine configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Error type for session registry operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found for user: {0}")]
    SessionNotFound(String),

    #[error("No ports available")]
    NoPortsAvailable,

    #[error(transparent)]
    Launch(#[from] LaunchError),
}
