// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! The orchestrator that ties together:
//! - The source and target stores via [`crate::store`]
//! - One collection poll loop per replicated collection
//! - The shared cursor table via [`crate::cursor::CursorStore`]
//!
//! # Architecture
//!
//! The coordinator manages the full replication lifecycle:
//! 1. Pings both stores (fatal on failure)
//! 2. Lists source collections and drops excluded prefixes (`system.`)
//! 3. Spawns one independent poll loop per collection
//! 4. Collects loop outcomes on shutdown without propagating them
//!
//! ```text
//!                     ┌──────────────────────────┐
//!                     │    ReplicationEngine     │
//!                     │  cursors · stats · state │
//!                     └────────────┬─────────────┘
//!              ┌───────────────────┼───────────────────┐
//!              ▼                   ▼                   ▼
//!      poll_loop(orders)    poll_loop(users)    poll_loop(events)
//!              │                   │                   │
//!        source ──▶ target   source ──▶ target   source ──▶ target
//! ```

mod poll_loop;
mod types;

pub use types::{CollectionOutcome, CollectionStats, EngineState};

use crate::config::ReplicationConfig;
use crate::cursor::{Cursor, CursorStore};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::{SourceStore, TargetStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::StatsTable;

/// How often `run_until_signal` checks whether every loop has ended.
const LOOP_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable handle that asks a running engine to stop.
///
/// Obtained from [`ReplicationEngine::shutdown_trigger()`]; useful when the
/// engine itself is parked in [`ReplicationEngine::wait()`].
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Signal every collection loop to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// The main replication engine.
///
/// Replicates every non-excluded collection of the source store into the
/// target store, one poll loop per collection.
pub struct ReplicationEngine<S: SourceStore, T: TargetStore> {
    /// Configuration
    config: ReplicationConfig,

    /// Store documents are read from
    source: Arc<S>,

    /// Store documents are written to
    target: Arc<T>,

    /// Engine state (broadcast to watchers)
    state_tx: watch::Sender<EngineState>,

    /// Engine state receiver (for internal use)
    state_rx: watch::Receiver<EngineState>,

    /// Per-collection cursors, shared with the loops
    cursors: CursorStore,

    /// Per-collection stats, shared with the loops
    stats: StatsTable,

    /// Shutdown signal sender
    shutdown_tx: Arc<watch::Sender<bool>>,

    /// Shutdown signal receiver (cloned into each loop)
    shutdown_rx: watch::Receiver<bool>,

    /// Collection loop task handles
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,

    /// Collections replicated since the last start
    collections: RwLock<Vec<String>>,
}

impl<S: SourceStore, T: TargetStore> ReplicationEngine<S, T> {
    /// Create a new replication engine.
    ///
    /// The engine starts in `Created` state. Call [`start()`](Self::start)
    /// to discover collections and begin replication.
    pub fn new(config: ReplicationConfig, source: Arc<S>, target: Arc<T>) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            source,
            target,
            state_tx,
            state_rx,
            cursors: CursorStore::new(),
            stats: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
            collections: RwLock::new(Vec::new()),
        }
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if engine is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    /// Handle that stops the engine's loops from another task.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Names of the collections being replicated.
    pub async fn collections(&self) -> Vec<String> {
        self.collections.read().await.clone()
    }

    /// Snapshot of every collection's cursor.
    pub async fn cursors(&self) -> HashMap<String, Cursor> {
        self.cursors.get_all().await
    }

    /// Snapshot of every collection's stats.
    pub async fn stats(&self) -> HashMap<String, CollectionStats> {
        self.stats.read().await.clone()
    }

    /// Stats for one collection (`None` before its first cycle).
    pub async fn collection_stats(&self, collection: &str) -> Option<CollectionStats> {
        self.stats.read().await.get(collection).cloned()
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }

    /// Mark startup as failed and build the error to return.
    fn startup_failed(&self, error: ReplicationError) -> ReplicationError {
        error!(error = %error, "Replication engine failed to start");
        self.set_state(EngineState::Failed);
        error
    }

    /// Start the replication engine.
    ///
    /// 1. Validates configuration
    /// 2. Pings source and target
    /// 3. Lists source collections, dropping excluded prefixes
    /// 4. Spawns one poll loop per collection
    ///
    /// Any failure leaves the engine `Failed` with no loops running.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != EngineState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: format!("{:?}", self.state()),
            });
        }

        info!(
            poll_interval_sec = self.config.poll.poll_interval_sec,
            batch_size = self.config.poll.batch_size,
            "Starting replication engine"
        );
        self.set_state(EngineState::Starting);

        if let Err(e) = self.config.validate() {
            return Err(self.startup_failed(e));
        }

        if let Err(e) = self.source.ping().await {
            return Err(self.startup_failed(ReplicationError::Startup(format!(
                "source ping failed: {}",
                e
            ))));
        }
        if let Err(e) = self.target.ping().await {
            return Err(self.startup_failed(ReplicationError::Startup(format!(
                "target ping failed: {}",
                e
            ))));
        }
        debug!("Source and target reachable");

        let listed = match self.source.list_collections().await {
            Ok(names) => names,
            Err(e) => {
                return Err(self.startup_failed(ReplicationError::Startup(format!(
                    "listing collections failed: {}",
                    e
                ))));
            }
        };

        let (collections, excluded): (Vec<String>, Vec<String>) = listed
            .into_iter()
            .partition(|name| self.config.is_replicated(name));
        if !excluded.is_empty() {
            debug!(excluded = ?excluded, "Skipping excluded collections");
        }

        self.spawn_collection_loops(&collections).await;
        metrics::set_active_collections(collections.len());

        let count = collections.len();
        *self.collections.write().await = collections;

        self.set_state(EngineState::Running);
        info!(collections = count, "Replication engine running");

        Ok(())
    }

    /// Spawn one poll loop task per collection.
    async fn spawn_collection_loops(&self, collections: &[String]) {
        let mut handles = self.handles.lock().await;

        for collection in collections {
            let source = Arc::clone(&self.source);
            let target = Arc::clone(&self.target);
            let cursors = self.cursors.clone();
            let stats = Arc::clone(&self.stats);
            let settings = self.config.poll.clone();
            let shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(poll_loop::run_collection_loop(
                collection.clone(),
                source,
                target,
                cursors,
                stats,
                settings,
                shutdown_rx,
            ));

            info!(collection = %collection, "Spawned collection poll loop");
            handles.push((collection.clone(), handle));
        }
    }

    /// Wait for every collection loop to end.
    ///
    /// Loops only end after a shutdown signal (see
    /// [`shutdown_trigger()`](Self::shutdown_trigger)) or a panic. Outcomes
    /// are collected per collection and never propagated.
    pub async fn wait(&mut self) -> Vec<(String, CollectionOutcome)> {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let mut outcomes = Vec::with_capacity(handles.len());

        for (collection, handle) in handles {
            let outcome = outcome_of(&collection, handle.await);
            outcomes.push((collection, outcome));
        }

        if self.state() == EngineState::Running {
            metrics::set_active_collections(0);
            self.set_state(EngineState::Stopped);
        }
        outcomes
    }

    /// Shutdown the replication engine.
    ///
    /// Shutdown sequence:
    /// 1. Signal all collection loops to stop
    /// 2. Wait up to `shutdown_timeout` (one deadline shared by all loops)
    /// 3. Abort loops that did not stop in time
    pub async fn shutdown(&mut self) -> Vec<(String, CollectionOutcome)> {
        info!("Shutting down replication engine");
        self.set_state(EngineState::ShuttingDown);

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(true);

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let task_count = handles.len();
        if task_count > 0 {
            info!(task_count, "Waiting for collection loops to stop");
        }

        let outcomes = join_until(handles, self.config.shutdown_timeout_duration()).await;

        metrics::set_active_collections(0);
        self.set_state(EngineState::Stopped);
        info!("Replication engine stopped");
        outcomes
    }

    /// Start, run until Ctrl-C (or until every loop has ended), then shut down.
    pub async fn run_until_signal(&mut self) -> Result<Vec<(String, CollectionOutcome)>> {
        self.start().await?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Interrupt received"),
                    Err(e) => warn!(error = %e, "Failed to listen for interrupt, shutting down"),
                }
            }
            _ = self.all_loops_finished() => {
                warn!("All collection loops ended");
            }
        }

        Ok(self.shutdown().await)
    }

    async fn all_loops_finished(&self) {
        loop {
            {
                let handles = self.handles.lock().await;
                if handles.iter().all(|(_, handle)| handle.is_finished()) {
                    return;
                }
            }
            tokio::time::sleep(LOOP_CHECK_INTERVAL).await;
        }
    }
}

/// Join every loop before a single deadline; abort whatever is left.
async fn join_until(
    handles: Vec<(String, JoinHandle<()>)>,
    timeout: Duration,
) -> Vec<(String, CollectionOutcome)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut outcomes = Vec::with_capacity(handles.len());

    for (collection, mut handle) in handles {
        let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => outcome_of(&collection, joined),
            Err(_) => {
                warn!(collection = %collection, "Loop did not stop in time, aborting");
                handle.abort();
                CollectionOutcome::Aborted
            }
        };
        outcomes.push((collection, outcome));
    }
    outcomes
}

fn outcome_of(
    collection: &str,
    joined: std::result::Result<(), tokio::task::JoinError>,
) -> CollectionOutcome {
    match joined {
        Ok(()) => {
            debug!(collection = %collection, "Loop stopped");
            CollectionOutcome::Stopped
        }
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(collection = %collection, panic = %message, "Loop panicked");
            CollectionOutcome::Panicked(message)
        }
        Err(_) => CollectionOutcome::Aborted,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
