//! Background credential acquisition.
//!
//! The [`AuthMonitor`] runs a [`CredentialFlow`] on a tokio task and exposes
//! its progress as an [`AuthState`] snapshot. The conversion pipeline only
//! reads that snapshot; it never starts or drives a sign-in itself.
//!
//! ```text
//! NotStarted ──start()──► InProgress ◄──► NeedsManualStep
//!                             │
//!              ┌──────────────┼──────────────┐
//!              ▼              ▼              ▼
//!          Succeeded       Failed        TimedOut
//! ```

mod bridge;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub use bridge::BridgeSignIn;

/// Observable state of the credential flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    NotStarted,
    InProgress { message: String },
    /// The user has to act outside this process (e.g. finish a browser login)
    NeedsManualStep { message: String },
    Succeeded,
    Failed { reason: String },
    TimedOut,
}

impl AuthState {
    /// True while a flow is running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress { .. } | Self::NeedsManualStep { .. })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::InProgress { message } => write!(f, "in progress: {}", message),
            Self::NeedsManualStep { message } => write!(f, "action required: {}", message),
            Self::Succeeded => f.write_str("connected"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Credential status reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// What the user must do to connect, when not connected
    pub action: Option<String>,
}

/// Errors from a credential flow
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Credential service unavailable: {0}")]
    Unavailable(String),

    #[error("Sign-in rejected: {0}")]
    Rejected(String),
}

/// One way of acquiring credentials.
#[async_trait]
pub trait CredentialFlow: Send + Sync {
    /// Run until credentials are usable. Intermediate states go to `reporter`.
    async fn acquire(&self, reporter: &AuthReporter) -> Result<(), AuthError>;
}

struct Shared {
    state: RwLock<AuthState>,
    changed: Notify,
}

impl Shared {
    fn set(&self, state: AuthState) {
        *self.state.write() = state;
        self.changed.notify_waiters();
    }
}

/// Handle a running flow uses to publish intermediate states.
#[derive(Clone)]
pub struct AuthReporter {
    shared: Arc<Shared>,
}

impl AuthReporter {
    pub fn progress(&self, message: impl Into<String>) {
        self.update(AuthState::InProgress {
            message: message.into(),
        });
    }

    pub fn needs_manual_step(&self, message: impl Into<String>) {
        self.update(AuthState::NeedsManualStep {
            message: message.into(),
        });
    }

    fn update(&self, next: AuthState) {
        if *self.shared.state.read() != next {
            tracing::info!(state = %next, "Sign-in state changed");
            self.shared.set(next);
        }
    }
}

/// Result of [`AuthMonitor::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyConnected,
    AlreadyRunning,
    Started,
}

/// Owns the background sign-in task and its state.
pub struct AuthMonitor {
    flow: Arc<dyn CredentialFlow>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl AuthMonitor {
    pub fn new(flow: Arc<dyn CredentialFlow>, timeout: Duration) -> Self {
        Self {
            flow,
            shared: Arc::new(Shared {
                state: RwLock::new(AuthState::NotStarted),
                changed: Notify::new(),
            }),
            task: Mutex::new(None),
            timeout,
        }
    }

    /// Current state snapshot.
    pub fn status(&self) -> AuthState {
        self.shared.state.read().clone()
    }

    /// Start the flow unless it is connected or already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> StartOutcome {
        if self.status().is_connected() {
            return StartOutcome::AlreadyConnected;
        }

        let mut task = self.task.lock();
        if let Some(handle) = task.as_ref()
            && !handle.is_finished()
        {
            return StartOutcome::AlreadyRunning;
        }

        self.shared.set(AuthState::InProgress {
            message: "Starting sign-in".to_string(),
        });

        let flow = self.flow.clone();
        let shared = self.shared.clone();
        let timeout = self.timeout;
        *task = Some(tokio::spawn(async move {
            let reporter = AuthReporter {
                shared: shared.clone(),
            };
            let next = match tokio::time::timeout(timeout, flow.acquire(&reporter)).await {
                Ok(Ok(())) => AuthState::Succeeded,
                Ok(Err(e)) => AuthState::Failed {
                    reason: e.to_string(),
                },
                Err(_) => AuthState::TimedOut,
            };
            tracing::info!(state = %next, "Sign-in finished");
            shared.set(next);
        }));

        StartOutcome::Started
    }

    /// Abort a running flow. A connected monitor stays connected.
    pub fn cancel(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        if !self.status().is_connected() {
            self.shared.set(AuthState::NotStarted);
        }
    }

    /// Wait until no flow is running and return the state it settled in.
    pub async fn settled(&self) -> AuthState {
        loop {
            let changed = self.shared.changed.notified();
            let state = self.status();
            if !state.is_active() {
                return state;
            }
            changed.await;
        }
    }
}

impl Drop for AuthMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;

    /// Flow that reports a manual step, waits, then returns a fixed result.
    pub struct ScriptedFlow {
        pub wait: Duration,
        pub result: Result<(), AuthError>,
    }

    impl ScriptedFlow {
        pub fn succeeding() -> Self {
            Self {
                wait: Duration::from_millis(10),
                result: Ok(()),
            }
        }

        pub fn failing(error: AuthError) -> Self {
            Self {
                wait: Duration::from_millis(10),
                result: Err(error),
            }
        }

        pub fn slow(wait: Duration) -> Self {
            Self { wait, result: Ok(()) }
        }
    }

    #[async_trait]
    impl CredentialFlow for ScriptedFlow {
        async fn acquire(&self, reporter: &AuthReporter) -> Result<(), AuthError> {
            reporter.needs_manual_step("Finish signing in");
            tokio::time::sleep(self.wait).await;
            self.result.clone()
        }
    }

    /// A monitor that has already completed a successful sign-in.
    pub async fn connected_monitor() -> Arc<AuthMonitor> {
        let monitor = Arc::new(AuthMonitor::new(
            Arc::new(ScriptedFlow::succeeding()),
            Duration::from_secs(5),
        ));
        monitor.start();
        monitor.settled().await;
        monitor
    }
}
