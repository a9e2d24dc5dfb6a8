//! Session and session info types.

use crate::engine::eval::{self, DiagnosticOptions};
use crate::engine::script::load_script;
use crate::engine::{Connection, Sexp};
use crate::error::{EvalError, InitializationError, ProtocolError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Child;
use uuid::Uuid;

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Engine launched, setup not finished.
    Starting,
    /// Setup script ran (or none was configured).
    Ready,
    /// Usable, but the setup script failed.
    Degraded,
    /// Session has been closed.
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Starting => write!(f, "starting"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Degraded => write!(f, "degraded"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Information about a session (serializable for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique per launch; a user gets a new one if their session is recreated.
    pub session_id: Uuid,
    /// Registry key.
    pub user_id: String,
    /// Port the engine listens on.
    pub port: u16,
    /// Current status of the session.
    pub status: SessionStatus,
    /// Process ID of the engine, when known.
    pub pid: Option<u32>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Why the setup script failed, if status is Degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_error: Option<String>,
}

/// A session's connection, used by one request at a time.
///
/// Diagnostic recovery runs while the failing call still holds the lock, so
/// another caller cannot replace the engine's last error in between.
pub struct SessionConnection {
    inner: tokio::sync::Mutex<Box<dyn Connection>>,
    diagnostics: DiagnosticOptions,
}

impl SessionConnection {
    pub fn new(connection: Box<dyn Connection>, diagnostics: DiagnosticOptions) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(connection),
            diagnostics,
        }
    }

    /// Evaluate without diagnostic recovery.
    pub async fn eval(&self, expr: &str) -> Result<Sexp, ProtocolError> {
        self.inner.lock().await.eval(expr).await
    }

    /// Side-effect evaluation without diagnostic recovery.
    pub async fn void_eval(&self, expr: &str) -> Result<(), ProtocolError> {
        self.inner.lock().await.void_eval(expr).await
    }

    pub async fn try_eval(&self, expr: &str) -> Result<Sexp, EvalError> {
        let conn = self.inner.lock().await;
        eval::try_eval(&**conn, expr, self.diagnostics).await
    }

    pub async fn try_void_eval(&self, expr: &str) -> Result<(), EvalError> {
        let conn = self.inner.lock().await;
        eval::try_void_eval(&**conn, expr, self.diagnostics).await
    }

    /// Read a script file and evaluate it for its side effects.
    pub async fn run_script(&self, path: &Path) -> Result<(), InitializationError> {
        let script = load_script(path).await?;
        self.try_void_eval(&script)
            .await
            .map_err(|source| InitializationError::ScriptFailed {
                path: path.to_path_buf(),
                source,
            })
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ProtocolError> {
        self.inner.lock().await.shutdown().await
    }
}

/// A running session: one engine process and the connection to it.
pub struct Session {
    info: Mutex<SessionInfo>,
    process: Mutex<Option<Child>>,
    connection: Arc<SessionConnection>,
}

impl Session {
    /// Create a new session with the given info and engine process.
    pub fn new(info: SessionInfo, process: Option<Child>, connection: Arc<SessionConnection>) -> Self {
        Self {
            info: Mutex::new(info),
            process: Mutex::new(process),
            connection,
        }
    }

    fn lock_info(&self) -> MutexGuard<'_, SessionInfo> {
        self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_process(&self) -> MutexGuard<'_, Option<Child>> {
        self.process.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the session metadata.
    pub fn info(&self) -> SessionInfo {
        self.lock_info().clone()
    }

    pub fn user_id(&self) -> String {
        self.lock_info().user_id.clone()
    }

    pub fn port(&self) -> u16 {
        self.lock_info().port
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_info().status
    }

    /// Whether setup left the session usable but incomplete.
    pub fn is_degraded(&self) -> bool {
        self.status() == SessionStatus::Degraded
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.lock_info().status = status;
    }

    /// The connection shared by every caller for this user.
    pub fn connection(&self) -> Arc<SessionConnection> {
        self.connection.clone()
    }

    /// Check if the engine process is still running.
    ///
    /// Sessions without an owned process are assumed to be running.
    pub fn is_running(&self) -> bool {
        match self.lock_process().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Take ownership of the engine process, leaving none behind.
    pub(crate) fn take_process(&self) -> Option<Child> {
        self.lock_process().take()
    }
}
