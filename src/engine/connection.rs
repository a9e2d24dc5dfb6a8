//! The contract required from an engine client library.

use super::value::Sexp;
use crate::error::ProtocolError;
use async_trait::async_trait;
use std::io;

/// An open connection to one engine server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Evaluate an expression and decode its value.
    async fn eval(&self, expr: &str) -> Result<Sexp, ProtocolError>;

    /// Evaluate an expression for its side effects only.
    async fn void_eval(&self, expr: &str) -> Result<(), ProtocolError>;

    /// Ask the server to stop. Connections without a shutdown command do nothing.
    async fn shutdown(&self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Opens connections to engine servers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn Connection>>;
}

/// Whether a connect failure means the server is not listening yet.
pub fn is_not_ready(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
    )
}
