//! Evaluation with diagnostic recovery.
//!
//! The engine's generic fault carries no payload. On a protocol error these
//! helpers ask the same connection for `geterrmessage()` and `traceback()`
//! and raise that text instead. If the message cannot be fetched, or is
//! blank, the original error is returned unchanged.

use super::connection::Connection;
use super::value::Sexp;
use crate::error::{EvalError, ProtocolError};
use tracing::debug;

/// Expression returning the engine's last error message.
pub const LAST_ERROR_EXPR: &str = "geterrmessage()";
/// Expression returning the call stack of the last error.
pub const TRACEBACK_EXPR: &str = "traceback()";

/// Verbosity of recovered diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticOptions {
    /// Keep the traceback in the raised error.
    pub include_traceback: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self {
            include_traceback: cfg!(debug_assertions),
        }
    }
}

/// Evaluate `expr`, recovering the engine's error message on failure.
pub async fn try_eval<C>(conn: &C, expr: &str, opts: DiagnosticOptions) -> Result<Sexp, EvalError>
where
    C: Connection + ?Sized,
{
    match conn.eval(expr).await {
        Ok(value) => Ok(value),
        Err(err) => Err(recover(conn, err, opts).await),
    }
}

/// Like [`try_eval`] for side-effect-only evaluation.
pub async fn try_void_eval<C>(conn: &C, expr: &str, opts: DiagnosticOptions) -> Result<(), EvalError>
where
    C: Connection + ?Sized,
{
    match conn.void_eval(expr).await {
        Ok(()) => Ok(()),
        Err(err) => Err(recover(conn, err, opts).await),
    }
}

async fn recover<C>(conn: &C, original: ProtocolError, opts: DiagnosticOptions) -> EvalError
where
    C: Connection + ?Sized,
{
    let message = match conn.eval(LAST_ERROR_EXPR).await {
        Ok(value) => value.as_string().map(str::to_string),
        Err(err) => {
            debug!(error = %err, "Last error message unavailable");
            None
        }
    };
    let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
        return EvalError::Protocol(original);
    };

    // The message still stands when only the traceback fails.
    let traceback = match conn.eval(TRACEBACK_EXPR).await {
        Ok(value) => value.as_strings().filter(|lines| !lines.is_empty()),
        Err(err) => {
            debug!(error = %err, "Traceback unavailable");
            None
        }
    };

    EvalError::Remote {
        message,
        traceback: traceback.filter(|_| opts.include_traceback),
    }
}
