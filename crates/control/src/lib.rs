//! ABORT-SWITCH: Operation Run-State Machine
//!
//! RUNNING/PAUSED/CANCELLED control for live operations. The execution
//! loop consults `check_status` at a single checkpoint before every
//! link dispatch; pause blocks there with a bounded backoff, cancel is
//! terminal.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use opforge_store::{criteria, Row, Store};

const OPSTATE_TABLE: &str = "opstate";

/// Operation run states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Running,
    Paused,
    Cancelled,
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for OpState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// What the checkpoint tells the execution loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Dispatch the next link
    Proceed,
    /// Stop issuing links, move to cleanup
    Cancelled,
}

/// Run-state control over any number of operations; every state read and
/// every cancellation token is keyed by operation id
pub struct OpControl {
    store: Arc<dyn Store>,
    /// Wakes paused loops early on run/cancel transitions
    wake: Notify,
    /// One token per operation, observed between checkpoints
    tokens: Mutex<HashMap<String, CancellationToken>>,
    /// Bounded backoff while paused
    pause_backoff: Duration,
}

impl OpControl {
    /// Create a control handle over the backing store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            wake: Notify::new(),
            tokens: Mutex::new(HashMap::new()),
            pause_backoff: Duration::from_secs(5),
        }
    }

    /// Set the pause backoff bound
    pub fn with_pause_backoff(mut self, backoff: Duration) -> Self {
        self.pause_backoff = backoff;
        self
    }

    /// The operation's cancellation token, for cooperative observation
    /// between checkpoints. Cancelling one operation's token never touches
    /// another's.
    pub async fn cancellation_token(&self, operation: &str) -> CancellationToken {
        self.tokens
            .lock()
            .await
            .entry(operation.to_string())
            .or_default()
            .clone()
    }

    /// Current state; a missing row means the operation is assumed
    /// RUNNING
    pub async fn state(&self, operation: &str) -> OpState {
        let rows = self
            .store
            .get(OPSTATE_TABLE, &criteria(&[("operation", json!(operation))]))
            .await;
        rows.first()
            .and_then(|row| row.get("state"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(OpState::Running)
    }

    /// The single pause/cancel checkpoint. Blocks while PAUSED, waking
    /// on transition or after the bounded backoff, and re-checks.
    pub async fn check_status(&self, operation: &str) -> Status {
        loop {
            if self.cancellation_token(operation).await.is_cancelled() {
                return Status::Cancelled;
            }
            match self.state(operation).await {
                OpState::Running => return Status::Proceed,
                OpState::Cancelled => return Status::Cancelled,
                OpState::Paused => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.pause_backoff) => {}
                    }
                }
            }
        }
    }

    /// Whether cancellation has been requested for the operation
    pub async fn is_cancelled(&self, operation: &str) -> bool {
        self.cancellation_token(operation).await.is_cancelled()
            || self.state(operation).await == OpState::Cancelled
    }

    /// Pause a running operation; ignored once cancelled
    pub async fn pause_operation(&self, operation: &str) {
        if self.is_cancelled(operation).await {
            return;
        }
        self.replace_state(operation, OpState::Paused).await;
        debug!("operation {} paused", operation);
    }

    /// Resume a paused operation; ignored once cancelled
    pub async fn run_operation(&self, operation: &str) {
        if self.is_cancelled(operation).await {
            return;
        }
        self.replace_state(operation, OpState::Running).await;
        self.wake.notify_waiters();
        debug!("operation {} running", operation);
    }

    /// Cancel an operation; terminal
    pub async fn cancel_operation(&self, operation: &str) {
        self.replace_state(operation, OpState::Cancelled).await;
        self.cancellation_token(operation).await.cancel();
        self.wake.notify_waiters();
        debug!("operation {} cancelled", operation);
    }

    /// Drop the state row and token once the operation has closed
    pub async fn cleanup_operation(&self, operation: &str) {
        self.store
            .delete(OPSTATE_TABLE, &criteria(&[("operation", json!(operation))]))
            .await;
        self.tokens.lock().await.remove(operation);
    }

    /// Last-writer-wins: delete then insert the state row
    async fn replace_state(&self, operation: &str, state: OpState) {
        let key = criteria(&[("operation", json!(operation))]);
        self.store.delete(OPSTATE_TABLE, &key).await;

        let mut row = Row::new();
        row.insert("operation".into(), json!(operation));
        row.insert("state".into(), json!(state.to_string()));
        self.store.create(OPSTATE_TABLE, row).await;
    }
}
