//! Starting engine processes and waiting for them to accept connections.

use super::connection::{is_not_ready, Connection, Connector};
use crate::config::{EngineConfig, LaunchOptions, ReadinessConfig};
use crate::error::LaunchError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Flags suppressing site/init files and the workspace autosave.
const INTERPRETER_FLAGS: [&str; 3] = ["--no-site-file", "--no-init-file", "--no-save"];

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A started engine and the connection opened to it.
pub struct LaunchedEngine {
    /// The engine process, when the launcher owns one.
    pub process: Option<Child>,
    pub connection: Box<dyn Connection>,
}

/// Starts one engine bound to the requested port.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> Result<LaunchedEngine, LaunchError>;
}

/// Program and arguments for one engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Generated server config file, if a buffer limit was requested.
    pub config_path: Option<PathBuf>,
}

/// Launches Rserve inside an R terminal process.
pub struct RserveLauncher {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
}

impl RserveLauncher {
    pub fn new(config: EngineConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Build the command line, writing the config artifact when needed.
    pub fn prepare(&self, options: &LaunchOptions) -> Result<LaunchCommand, LaunchError> {
        let config_path = match options.max_input_buffer_kb {
            Some(kb) if kb > 0 => Some(write_config_artifact(kb)?),
            _ => None,
        };
        let conf_arg = config_path.as_deref().map(shell_path);
        Ok(LaunchCommand {
            program: engine_binary(&self.config),
            args: command_args(options.port, conf_arg.as_deref()),
            config_path,
        })
    }

    fn spawn(&self, command: &LaunchCommand, show_window: bool) -> Result<Child, LaunchError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(false);

        if show_window {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        // Keep the server out of the caller's process group so it outlives it.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(if show_window {
            CREATE_NEW_CONSOLE
        } else {
            CREATE_NO_WINDOW
        });

        cmd.spawn().map_err(LaunchError::SpawnFailed)
    }
}

#[async_trait]
impl EngineLauncher for RserveLauncher {
    async fn launch(&self, options: LaunchOptions) -> Result<LaunchedEngine, LaunchError> {
        let program = engine_binary(&self.config);
        if !program.is_file() {
            return Err(LaunchError::BinaryNotFound(program));
        }

        let command = self.prepare(&options)?;
        let mut child = self.spawn(&command, options.show_window)?;
        info!(
            port = options.port,
            pid = child.id(),
            program = %command.program.display(),
            config = ?command.config_path,
            "Spawned engine process"
        );

        let connection = match wait_until_ready(
            self.connector.as_ref(),
            &self.config.host,
            options.port,
            &self.config.readiness,
            Some(&mut child),
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(e);
            }
        };

        Ok(LaunchedEngine {
            process: Some(child),
            connection,
        })
    }
}

/// Path of the interpreter that hosts the server.
pub fn engine_binary(config: &EngineConfig) -> PathBuf {
    if let Some(binary) = &config.r_binary {
        return binary.clone();
    }
    let bin = config.r_home.join("bin");
    if cfg!(windows) {
        let arch = if cfg!(target_pointer_width = "64") {
            "x64"
        } else {
            "i386"
        };
        bin.join(arch).join("Rterm.exe")
    } else {
        bin.join("R")
    }
}

/// Write a server config file limiting the input buffer to `max_inbuf_kb`.
///
/// The file is kept on disk; the server reads it after we return.
pub fn write_config_artifact(max_inbuf_kb: u32) -> Result<PathBuf, LaunchError> {
    let mut file = tempfile::Builder::new()
        .prefix("rserve-")
        .suffix(".conf")
        .tempfile()
        .map_err(LaunchError::ConfigArtifact)?;
    // Using a config file triggers a plaintext warning unless it is enabled explicitly.
    write!(file, "maxinbuf {max_inbuf_kb}\nplaintext enable\n").map_err(LaunchError::ConfigArtifact)?;
    let (_, path) = file
        .keep()
        .map_err(|e| LaunchError::ConfigArtifact(e.into()))?;
    Ok(path)
}

/// Render a path with forward slashes, as the server's argument parser expects.
pub fn shell_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// R expression that loads Rserve and serves on `port` until shut down.
///
/// On Windows `Rserve(wait = TRUE)` serves inside the interpreter. Elsewhere
/// `Rserve()` daemonizes and the interpreter exits, so `run.Rserve` is used to
/// keep the server in the spawned process.
pub fn server_expression(port: u16, config_path: Option<&str>) -> String {
    if cfg!(windows) {
        match config_path {
            Some(path) => format!(
                "library(Rserve); Rserve(port = {port}, wait = TRUE, args = '--RS-conf {path}')"
            ),
            None => format!("library(Rserve); Rserve(port = {port}, wait = TRUE)"),
        }
    } else {
        match config_path {
            Some(path) => format!(
                "library(Rserve); run.Rserve(port = {port}, config.file = '{path}')"
            ),
            None => format!("library(Rserve); run.Rserve(port = {port})"),
        }
    }
}

/// Interpreter arguments for a server on `port`.
pub fn command_args(port: u16, config_path: Option<&str>) -> Vec<String> {
    INTERPRETER_FLAGS
        .iter()
        .map(|flag| flag.to_string())
        .chain(["-e".to_string(), server_expression(port, config_path)])
        .collect()
}

/// Connect to a starting server, retrying with backoff until the deadline.
///
/// Only "not listening yet" failures are retried. If `child` exits while we
/// wait, the launch fails immediately.
pub async fn wait_until_ready(
    connector: &dyn Connector,
    host: &str,
    port: u16,
    policy: &ReadinessConfig,
    mut child: Option<&mut Child>,
) -> Result<Box<dyn Connection>, LaunchError> {
    let start = Instant::now();
    let deadline = start + policy.timeout();
    sleep(policy.initial_delay()).await;

    let mut interval = policy.retry_interval();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match connector.connect(host, port).await {
            Ok(connection) => {
                debug!(port, attempt, elapsed = ?start.elapsed(), "Engine accepting connections");
                return Ok(connection);
            }
            Err(e) if is_not_ready(&e) => {
                debug!(port, attempt, error = %e, "Engine not ready yet");
            }
            Err(source) => {
                return Err(LaunchError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
        }

        if let Some(child) = child.as_deref_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(LaunchError::ExitedEarly(status.to_string()));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(LaunchError::ReadinessTimeout {
                port,
                waited: now - start,
            });
        }
        sleep(interval.min(deadline - now)).await;
        interval = (interval * 2).min(policy.max_retry_interval());
    }
}
