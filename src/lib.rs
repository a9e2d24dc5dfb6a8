//! Per-user Rserve sessions
//!
//! This library maps each user to one long-lived R engine running the Rserve
//! extension, and evaluates expressions against it with readable errors.
//!
//! # Architecture
//!
//! - **SessionRegistry**: Owns the user → session map and the port
//!   allocator. The first request for a user launches an engine, runs the
//!   configured setup script, and publishes the session; later requests reuse it.
//!
//! - **RserveLauncher**: Starts `R` with Rserve listening on a given port and
//!   connects once the server accepts connections.
//!
//! - **SessionConnection**: A session's connection, one request at a time.
//!   `try_eval` and `try_void_eval` recover the engine's own error message
//!   (and optionally the traceback) when evaluation fails.
//!
//! The wire protocol is not implemented here. Callers plug in a client
//! library through the [`Connection`] and [`Connector`] traits.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rserve_sessions::{EngineConfig, RserveLauncher, SessionRegistry, Connector};
//! # async fn run(connector: Arc<dyn Connector>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let launcher = Arc::new(RserveLauncher::new(config.clone(), connector));
//! let registry = SessionRegistry::new(config, launcher);
//!
//! let conn = registry.get_connection("test1@example.com").await?;
//! let version = conn.try_eval("R.version.string").await?;
//! println!("{:?}", version.as_string());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{EngineConfig, LaunchOptions, ReadinessConfig};
pub use engine::{
    try_eval, try_void_eval, Connection, Connector, DiagnosticOptions, EngineLauncher,
    LaunchCommand, LaunchedEngine, RserveLauncher, Sexp,
};
pub use error::{
    ConfigError, EvalError, InitializationError, LaunchError, ProtocolError, SessionError,
};
pub use session::{
    PortAllocator, Session, SessionConnection, SessionInfo, SessionRegistry, SessionStats,
    SessionStatus,
};
