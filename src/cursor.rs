// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication progress per collection (the Sync State Table).
//!
//! The table maps collection name to its [`Cursor`]. It lives in memory for
//! the lifetime of the engine and is not persisted: after a restart every
//! collection starts again from its initial window, and reconciliation
//! absorbs the re-delivery.
//!
//! # Cursor Semantics
//!
//! ```text
//! Timestamp  { field, last_seen }   next poll reads  field > last_seen
//! Identifier { last_seen_id }       next poll reads  _id > last_seen_id
//!                                   (unset: _id >= id synthesized from now - lookback)
//! ```
//!
//! Entries are created lazily on a collection's first poll and only move
//! forward. [`CursorStore::advance`] refuses to rewind an entry, so a clock
//! step backwards on the polling host leaves the window where it was instead
//! of re-reading history.
//!
//! # Ownership
//!
//! The engine owns one store and hands a clone (a shared handle) to every
//! collection loop. Each loop only reads and writes its own entry; the lock
//! exists so diagnostics can snapshot the whole table.

use crate::document::Value;
use crate::strategy::OrderingStrategy;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Per-collection progress marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Time-based progress on a bound field.
    Timestamp {
        field: String,
        last_seen: DateTime<Utc>,
    },
    /// Identifier-based progress. `None` until the first non-empty batch.
    Identifier { last_seen_id: Option<Value> },
}

impl Cursor {
    /// Initial cursor for a collection's first poll.
    ///
    /// Time-based cursors start `lookback` before `now`; identifier cursors
    /// start unset (the fetcher synthesizes the lower bound itself).
    pub fn initial(strategy: &OrderingStrategy, now: DateTime<Utc>, lookback: Duration) -> Self {
        match strategy {
            OrderingStrategy::Field(field) => Cursor::Timestamp {
                field: field.clone(),
                last_seen: now - lookback,
            },
            OrderingStrategy::Identifier => Cursor::Identifier { last_seen_id: None },
        }
    }

    /// The strategy this cursor tracks.
    pub fn strategy(&self) -> OrderingStrategy {
        match self {
            Cursor::Timestamp { field, .. } => OrderingStrategy::Field(field.clone()),
            Cursor::Identifier { .. } => OrderingStrategy::Identifier,
        }
    }

    /// Whether replacing `self` with `next` keeps the cursor monotonic.
    ///
    /// Equal positions are allowed. A cursor never changes variant or bound
    /// field, and a set identifier never goes back to unset.
    pub fn can_advance_to(&self, next: &Cursor) -> bool {
        match (self, next) {
            (
                Cursor::Timestamp { field, last_seen },
                Cursor::Timestamp {
                    field: next_field,
                    last_seen: next_seen,
                },
            ) => field == next_field && next_seen >= last_seen,
            (Cursor::Identifier { last_seen_id: None }, Cursor::Identifier { .. }) => true,
            (
                Cursor::Identifier {
                    last_seen_id: Some(current),
                },
                Cursor::Identifier {
                    last_seen_id: Some(next),
                },
            ) => next.canonical_cmp(current) != Ordering::Less,
            _ => false,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Timestamp { field, last_seen } => {
                write!(f, "{} > {}", field, last_seen.to_rfc3339())
            }
            Cursor::Identifier {
                last_seen_id: Some(id),
            } => write!(f, "_id > {}", id),
            Cursor::Identifier { last_seen_id: None } => write!(f, "_id (unset)"),
        }
    }
}

/// Process-wide table of collection cursors.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct CursorStore {
    cursors: Arc<RwLock<HashMap<String, Cursor>>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cursor for a collection.
    ///
    /// Returns `None` if the collection has not been polled yet.
    pub async fn get(&self, collection: &str) -> Option<Cursor> {
        self.cursors.read().await.get(collection).cloned()
    }

    /// Get the cursor, creating the initial entry on first use.
    ///
    /// An existing entry tracking a different strategy is replaced; the
    /// strategy is fixed per loop, so this only happens when a collection
    /// is re-registered.
    pub async fn get_or_init(
        &self,
        collection: &str,
        strategy: &OrderingStrategy,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Cursor {
        let mut cursors = self.cursors.write().await;
        match cursors.get(collection) {
            Some(existing) if existing.strategy() == *strategy => existing.clone(),
            _ => {
                let cursor = Cursor::initial(strategy, now, lookback);
                debug!(collection = %collection, cursor = %cursor, "Cursor initialized");
                cursors.insert(collection.to_string(), cursor.clone());
                cursor
            }
        }
    }

    /// Move a collection's cursor forward.
    ///
    /// Returns `true` if the entry was written. A rewind is refused (logged,
    /// returns `false`) and the stored cursor is left as it was.
    pub async fn advance(&self, collection: &str, next: Cursor) -> bool {
        let mut cursors = self.cursors.write().await;
        if let Some(current) = cursors.get(collection) {
            if !current.can_advance_to(&next) {
                warn!(
                    collection = %collection,
                    current = %current,
                    next = %next,
                    "Refusing to rewind cursor"
                );
                return false;
            }
        }
        debug!(collection = %collection, cursor = %next, "Cursor advanced");
        cursors.insert(collection.to_string(), next);
        true
    }

    /// Snapshot of every cursor.
    pub async fn get_all(&self) -> HashMap<String, Cursor> {
        self.cursors.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.cursors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cursors.read().await.is_empty()
    }
}
