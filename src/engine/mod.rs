//! Engine integration.
//!
//! The wire protocol is supplied by an external client library through the
//! [`Connection`] and [`Connector`] traits. This module launches engine
//! processes, waits for them to listen, and wraps evaluation with
//! diagnostic recovery.

pub mod connection;
pub mod eval;
pub mod launcher;
pub mod script;
pub mod value;

pub use connection::{Connection, Connector};
pub use eval::{try_eval, try_void_eval, DiagnosticOptions};
pub use launcher::{EngineLauncher, LaunchCommand, LaunchedEngine, RserveLauncher};
pub use value::Sexp;
