//! In-memory stand-ins for the engine client library and launcher.

use crate::config::LaunchOptions;
use crate::engine::{Connection, Connector, EngineLauncher, LaunchedEngine, Sexp};
use crate::error::{LaunchError, ProtocolError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a test log subscriber once per process.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rserve_sessions=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct FakeState {
    evals: HashMap<String, Result<Sexp, ProtocolError>>,
    void_evals: HashMap<String, Result<(), ProtocolError>>,
    calls: Vec<String>,
    shutdowns: usize,
}

/// Connection answering from scripted responses.
///
/// Clones share state. Unscripted `eval` fails; unscripted `void_eval` succeeds.
#[derive(Clone, Default)]
pub(crate) struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn on_eval(&self, expr: &str, response: Result<Sexp, ProtocolError>) {
        self.lock().evals.insert(expr.to_string(), response);
    }

    pub(crate) fn on_void_eval(&self, expr: &str, response: Result<(), ProtocolError>) {
        self.lock().void_evals.insert(expr.to_string(), response);
    }

    /// Every expression sent, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn eval(&self, expr: &str) -> Result<Sexp, ProtocolError> {
        let mut state = self.lock();
        state.calls.push(expr.to_string());
        state
            .evals
            .get(expr)
            .cloned()
            .unwrap_or_else(|| Err(ProtocolError::new(format!("unscripted eval: {expr}"))))
    }

    async fn void_eval(&self, expr: &str) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        state.calls.push(expr.to_string());
        state.void_evals.get(expr).cloned().unwrap_or(Ok(()))
    }

    async fn shutdown(&self) -> Result<(), ProtocolError> {
        self.lock().shutdowns += 1;
        Ok(())
    }
}

/// Connector that fails a number of attempts before accepting.
pub(crate) struct FakeConnector {
    refusals: u32,
    failure: io::ErrorKind,
    attempts: AtomicU32,
}

impl FakeConnector {
    /// Refuse the first `refusals` attempts, then connect.
    pub(crate) fn refusing(refusals: u32) -> Self {
        Self {
            refusals,
            failure: io::ErrorKind::ConnectionRefused,
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail every attempt with `kind`.
    pub(crate) fn failing(kind: io::ErrorKind) -> Self {
        Self {
            refusals: u32::MAX,
            failure: kind,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<Box<dyn Connection>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refusals {
            return Err(io::Error::from(self.failure));
        }
        Ok(Box::new(FakeConnection::new()))
    }
}

type Setup = Box<dyn Fn(&FakeConnection) + Send + Sync>;

/// Launcher that hands out fake connections, optionally owning a real process.
pub(crate) struct FakeLauncher {
    delay: Duration,
    failures: AtomicUsize,
    setup: Option<Setup>,
    process: Option<(&'static str, &'static [&'static str])>,
    launches: AtomicUsize,
    ports: Mutex<Vec<u16>>,
    connections: Mutex<Vec<FakeConnection>>,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            failures: AtomicUsize::new(0),
            setup: None,
            process: None,
            launches: AtomicUsize::new(0),
            ports: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long in every launch, widening race windows.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Prime each new connection before it is handed out.
    pub(crate) fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&FakeConnection) + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Spawn `program` for every launch and hand it over as the engine process.
    pub(crate) fn with_process(mut self, program: &'static str, args: &'static [&'static str]) -> Self {
        self.process = Some((program, args));
        self
    }

    /// Fail the first `count` launches with a readiness timeout.
    pub(crate) fn failing_first(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn launched_ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The `index`th connection handed out.
    pub(crate) fn connection(&self, index: usize) -> FakeConnection {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())[index].clone()
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self, options: LaunchOptions) -> Result<LaunchedEngine, LaunchError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LaunchError::ReadinessTimeout {
                port: options.port,
                waited: self.delay,
            });
        }

        let process = match self.process {
            Some((program, args)) => Some(
                tokio::process::Command::new(program)
                    .args(args)
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(LaunchError::SpawnFailed)?,
            ),
            None => None,
        };

        let conn = FakeConnection::new();
        if let Some(setup) = &self.setup {
            setup(&conn);
        }
        self.ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(options.port);
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(conn.clone());
        Ok(LaunchedEngine {
            process,
            connection: Box::new(conn),
        })
    }
}
