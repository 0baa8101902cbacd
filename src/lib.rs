//! # Poll Replication Engine
//!
//! Replicates documents from a source document store to a target document
//! store by polling each collection, for sources that cannot expose a change
//! feed. Staleness is bounded by the poll interval.
//!
//! ## Architecture
//!
//! One independent task per collection, all driven by the
//! [`ReplicationEngine`]:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                        poll-replication-engine                            │
//! │                                                                           │
//! │  ┌──────────────┐   ┌─────────────────┐   ┌────────────┐   ┌───────────┐  │
//! │  │ Strategy     │──►│ BatchFetcher    │──►│ Reconciler │──►│ Cursor    │  │
//! │  │ (detect once)│   │ (bounded query) │   │ (per doc)  │   │ (advance) │  │
//! │  └──────────────┘   └─────────────────┘   └────────────┘   └───────────┘  │
//! │         ▲                   │                   │                 │       │
//! │         │               SourceStore         TargetStore           │       │
//! │         └──────────── sleep(interval), or 2 × interval on error ◄─┘       │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Idempotent convergence**: reconciling a document twice is the same as
//!   once; re-delivered batches are harmless.
//! - **Monotonic cursors**: a failed cycle never moves or rewinds a cursor.
//! - **Isolation**: one collection's failures never stall another.
//!
//! Deletes are not replicated, and writes to the target by third parties are
//! overwritten by the next poll that sees a differing source document.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use poll_replication_engine::{InMemoryStore, ReplicationConfig, ReplicationEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReplicationConfig::from_env().expect("invalid configuration");
//!     let source = Arc::new(InMemoryStore::new());
//!     let target = Arc::new(InMemoryStore::new());
//!
//!     let mut engine = ReplicationEngine::new(config, source, target);
//!
//!     // Runs until Ctrl-C
//!     let outcomes = engine.run_until_signal().await.expect("Failed to start");
//!     for (collection, outcome) in outcomes {
//!         println!("{}: {:?}", collection, outcome);
//!     }
//! }
//! ```

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod cursor;
pub mod document;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use batch::{BatchFetcher, BatchResult};
pub use config::{PollSettings, ReplicationConfig};
pub use coordinator::{CollectionOutcome, CollectionStats, EngineState, ReplicationEngine, ShutdownTrigger};
pub use cursor::{Cursor, CursorStore};
pub use document::{Document, ObjectId, Value};
pub use error::{ReplicationError, Result};
pub use reconcile::{Reconciler, SyncAction};
pub use store::{Filter, FindOptions, InMemoryStore, SourceStore, StoreError, TargetStore};
pub use strategy::OrderingStrategy;
