//! Engine state types.
//!
//! Defines the state machine for the replication engine lifecycle and the
//! per-collection bookkeeping exposed for diagnostics.
//!
//! # State Transitions
//!
//! ```text
//!                  start()
//! Created ───────────────────→ Starting
//!    │                              │
//!    │ (shutdown before start)      ├── (ping/list failed) ──→ Failed
//!    ↓                              ↓
//! Stopped                       Running
//!    ↑                              │
//!    │                    shutdown()│
//!    │                              ↓
//!    └────────────────── ShuttingDown
//! ```
//!
//! # State Descriptions
//!
//! - **Created**: Initial state after `ReplicationEngine::new()`. No store contacted.
//! - **Starting**: `start()` called, checking stores and discovering collections.
//! - **Running**: One poll loop per collection is running.
//! - **ShuttingDown**: `shutdown()` called. Loops are being cancelled.
//! - **Stopped**: All loops ended. Safe to drop.
//! - **Failed**: Startup failed. No loops were spawned.

use crate::batch::BatchResult;
use crate::error::ReplicationError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// State of the replication engine.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine created but not started.
    ///
    /// Call [`start()`](super::ReplicationEngine::start) to begin replication.
    Created,

    /// Pinging stores and listing collections.
    ///
    /// Transitions to `Running` when loops are spawned, or `Failed`.
    Starting,

    /// Running and replicating.
    Running,

    /// Shutting down.
    ///
    /// Loops have been signalled and are being awaited.
    ShuttingDown,

    /// Stopped.
    Stopped,

    /// Startup failed.
    ///
    /// Check logs for error details. Engine cannot recover from this state.
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Starting => write!(f, "Starting"),
            EngineState::Running => write!(f, "Running"),
            EngineState::ShuttingDown => write!(f, "ShuttingDown"),
            EngineState::Stopped => write!(f, "Stopped"),
            EngineState::Failed => write!(f, "Failed"),
        }
    }
}

/// How a collection loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// The loop observed cancellation and returned.
    Stopped,
    /// The loop task panicked. Other collections are unaffected.
    Panicked(String),
    /// The loop did not stop within the shutdown timeout and was aborted.
    Aborted,
}

/// Running totals for one collection loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Detected ordering strategy, once known.
    pub strategy: Option<String>,
    /// Completed poll cycles.
    pub cycles: u64,
    /// Failed poll cycles.
    pub failures: u64,
    /// Failed cycles since the last success.
    pub consecutive_failures: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl CollectionStats {
    pub(crate) fn record_batch(&mut self, result: &BatchResult) {
        self.cycles += 1;
        self.consecutive_failures = 0;
        self.inserted += result.inserted as u64;
        self.updated += result.updated as u64;
        self.unchanged += result.unchanged as u64;
    }

    pub(crate) fn record_failure(&mut self, error: &ReplicationError) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Documents written to the target so far.
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Shared per-collection stats, written by loops and read by the engine.
pub(crate) type StatsTable = Arc<RwLock<HashMap<String, CollectionStats>>>;
