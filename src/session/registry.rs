//! Registry mapping each user to one long-lived engine session.

use super::port_allocator::PortAllocator;
use super::types::{Session, SessionConnection, SessionInfo, SessionStatus};
use crate::config::EngineConfig;
use crate::engine::eval::DiagnosticOptions;
use crate::engine::EngineLauncher;
use crate::error::SessionError;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timeout for asking an engine to shut down before killing it.
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Owns every user's session and the ports handed to their engines.
///
/// Construct one per process and share it behind an `Arc`.
pub struct SessionRegistry {
    /// Map of user ID to session.
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Serializes session creation. Held across launch, so two callers can
    /// never start engines for the same unseen user.
    creation_lock: Mutex<()>,
    /// Port allocator for engine servers.
    port_allocator: PortAllocator,
    launcher: Arc<dyn EngineLauncher>,
    config: EngineConfig,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            creation_lock: Mutex::new(()),
            port_allocator: PortAllocator::new(config.base_port, config.max_port),
            launcher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Allocate the next engine port.
    pub fn next_port(&self) -> Result<u16, SessionError> {
        self.port_allocator
            .allocate()
            .ok_or(SessionError::NoPortsAvailable)
    }

    /// Connection for `user_id`, launching their engine on first use.
    pub async fn get_connection(
        &self,
        user_id: &str,
    ) -> Result<Arc<SessionConnection>, SessionError> {
        Ok(self.get_or_create_session(user_id).await?.connection())
    }

    /// Session for `user_id`, launching their engine on first use.
    ///
    /// A failed setup script does not fail this call; the session is
    /// published as [`SessionStatus::Degraded`].
    ///
    /// Callers must drive the returned future to completion. Dropping it
    /// while the engine is launching (e.g. under `tokio::time::timeout` or
    /// `select!`) can leave a running engine that no registry entry owns.
    pub async fn get_or_create_session(&self, user_id: &str) -> Result<Arc<Session>, SessionError> {
        if let Some(session) = self.lookup(user_id).await {
            debug!(user_id = %user_id, "Reusing session");
            return Ok(session);
        }

        let _creating = self.creation_lock.lock().await;
        // Another caller may have created it while we waited.
        if let Some(session) = self.lookup(user_id).await {
            return Ok(session);
        }

        let port = self.next_port()?;
        let session_id = Uuid::new_v4();
        info!(
            user_id = %user_id,
            session_id = %session_id,
            port = port,
            "Launching engine for new session"
        );

        let launched = self
            .launcher
            .launch(self.config.launch_options(port))
            .await
            .map_err(|e| {
                error!(user_id = %user_id, port = port, error = %e, "Engine launch failed");
                SessionError::Launch(e)
            })?;

        let pid = launched.process.as_ref().and_then(|child| child.id());
        let connection = Arc::new(SessionConnection::new(
            launched.connection,
            DiagnosticOptions {
                include_traceback: self.config.include_traceback,
            },
        ));

        let info = SessionInfo {
            session_id,
            user_id: user_id.to_string(),
            port,
            status: SessionStatus::Starting,
            pid,
            created_at: Utc::now(),
            init_error: None,
        };
        let info = self.initialize(info, &connection).await;

        let session = Arc::new(Session::new(info, launched.process, connection));
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session.clone());
        info!(
            user_id = %user_id,
            port = port,
            status = %session.status(),
            "Session published"
        );
        Ok(session)
    }

    /// Run the configured setup script, recording the outcome in `info`.
    async fn initialize(&self, mut info: SessionInfo, connection: &SessionConnection) -> SessionInfo {
        info.status = SessionStatus::Ready;
        let Some(script) = &self.config.init_script else {
            return info;
        };
        if let Err(e) = connection.run_script(script).await {
            warn!(
                user_id = %info.user_id,
                port = info.port,
                error = %e,
                "Session setup failed; publishing degraded session"
            );
            info.status = SessionStatus::Degraded;
            info.init_error = Some(e.to_string());
        }
        info
    }

    async fn lookup(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Close a user's session: stop the engine and forget the entry.
    ///
    /// Its port is not reused. A later request for the user launches a new engine.
    pub async fn close_session(&self, user_id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(user_id)
            .ok_or_else(|| SessionError::SessionNotFound(user_id.to_string()))?;

        info!(user_id = %user_id, port = session.port(), "Closing session");
        session.set_status(SessionStatus::Closed);

        // Try to stop the server gracefully first
        let connection = session.connection();
        match timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            connection.shutdown(),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(user_id = %user_id, error = %e, "Engine shutdown command failed"),
            Err(_) => debug!(user_id = %user_id, "Engine shutdown command timed out"),
        }

        // Kill the process if still running
        if let Some(mut child) = session.take_process() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        Ok(())
    }

    /// Get info about a specific user's session.
    pub async fn session_info(&self, user_id: &str) -> Result<SessionInfo, SessionError> {
        self.lookup(user_id)
            .await
            .map(|s| s.info())
            .ok_or_else(|| SessionError::SessionNotFound(user_id.to_string()))
    }

    /// Remove sessions whose engine process has exited.
    pub async fn reap_dead_sessions(&self) -> Vec<String> {
        let dead: Vec<(String, Arc<Session>)> = {
            let mut sessions = self.sessions.write().await;
            let dead_ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| !s.is_running())
                .map(|(id, _)| id.clone())
                .collect();
            dead_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        for (user_id, session) in &dead {
            warn!(user_id = %user_id, port = session.port(), "Reaping dead session");
            session.set_status(SessionStatus::Closed);
            // Collect the exit status so the process does not linger as a zombie
            if let Some(mut child) = session.take_process() {
                let _ = child.wait().await;
            }
        }
        dead.into_iter().map(|(id, _)| id).collect()
    }

    /// List all sessions (reaps dead sessions first).
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.reap_dead_sessions().await;
        let sessions = self.sessions.read().await;
        sessions.values().map(|s| s.info()).collect()
    }

    /// Get session statistics.
    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read().await;
        let count = |status: SessionStatus| sessions.values().filter(|s| s.status() == status).count();

        SessionStats {
            total_sessions: sessions.len(),
            ready_sessions: count(SessionStatus::Ready),
            degraded_sessions: count(SessionStatus::Degraded),
            next_port: self.port_allocator.peek(),
            available_ports: self.port_allocator.available_count(),
        }
    }

    /// Close every session.
    pub async fn shutdown_all(&self) {
        let user_ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        for user_id in user_ids {
            if let Err(e) = self.close_session(&user_id).await {
                warn!(user_id = %user_id, error = %e, "Failed to close session during shutdown");
            }
        }
    }
}

/// Statistics about sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub ready_sessions: usize,
    pub degraded_sessions: usize,
    pub next_port: Option<u16>,
    pub available_ports: usize,
}
