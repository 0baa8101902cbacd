//! Batch fetcher for collection polling.
//!
//! Turns a collection's cursor into a bounded source query and streams the
//! matching documents lazily.
//!
//! # Design
//!
//! ```text
//! Cursor ──▶ build_query() ──▶ SourceStore::find() ──▶ stream of Document
//!   ▲                                                       │
//!   │                                                       ▼
//!   └──── next_cursor() ◀──── BatchResult ◀──── Reconciler (in fetch order)
//! ```
//!
//! | Cursor | Filter | Sort | New cursor |
//! |--------|--------|------|------------|
//! | `Timestamp` | `field > last_seen` | store default | poll start time (always) |
//! | `Identifier` (set) | `_id > last_seen_id` | `_id` ascending | last `_id` in batch |
//! | `Identifier` (unset) | `_id >= ObjectId(now - lookback)` | `_id` ascending | last `_id` in batch |
//!
//! A time-based cursor moves to the time the poll *started*, not to the
//! largest field value seen, and moves even when nothing was fetched.
//! Documents written while the fetch was running stay visible to the next
//! poll. A time-based batch that fills the cap still moves the window to the
//! poll start, so documents past the cap in that window are not fetched; the
//! poll loop reports this as a saturated batch.

use crate::cursor::Cursor;
use crate::document::{Document, ObjectId, Value, ID_FIELD};
use crate::error::{ReplicationError, Result};
use crate::store::{Filter, FindOptions, SortOrder, SourceStore};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// A source query for one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery {
    pub filter: Filter,
    pub options: FindOptions,
}

/// Build the query for the next batch from the current cursor.
///
/// `now` is only used to synthesize the first-poll lower bound of an
/// identifier cursor.
pub fn build_query(cursor: &Cursor, batch_size: usize, now: DateTime<Utc>, lookback: Duration) -> BatchQuery {
    match cursor {
        Cursor::Timestamp { field, last_seen } => BatchQuery {
            filter: Filter::gt(field.as_str(), *last_seen),
            options: FindOptions::default().with_limit(batch_size),
        },
        Cursor::Identifier { last_seen_id } => {
            let filter = match last_seen_id {
                Some(id) => Filter::gt(ID_FIELD, id.clone()),
                None => Filter::gte(ID_FIELD, ObjectId::from_datetime(now - lookback)),
            };
            BatchQuery {
                filter,
                options: FindOptions::default()
                    .with_limit(batch_size)
                    .sort_by(ID_FIELD, SortOrder::Ascending),
            }
        }
    }
}

/// The cursor to adopt once a batch has been fully reconciled.
///
/// Time-based cursors always move to `poll_started`. Identifier cursors move
/// to the last processed `_id`, or stay put on an empty batch.
pub fn next_cursor(current: &Cursor, poll_started: DateTime<Utc>, last_id: Option<&Value>) -> Cursor {
    match current {
        Cursor::Timestamp { field, .. } => Cursor::Timestamp {
            field: field.clone(),
            last_seen: poll_started,
        },
        Cursor::Identifier { .. } => match last_id {
            Some(id) => Cursor::Identifier {
                last_seen_id: Some(id.clone()),
            },
            None => current.clone(),
        },
    }
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Documents fetched and reconciled.
    pub total: usize,
    /// Documents inserted into the target.
    pub inserted: usize,
    /// Documents replaced in the target.
    pub updated: usize,
    /// Documents already identical in the target.
    pub unchanged: usize,
    /// `_id` of the last document processed.
    pub last_id: Option<Value>,
}

impl BatchResult {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether the batch hit the size cap.
    pub fn is_saturated(&self, batch_size: usize) -> bool {
        self.total >= batch_size
    }

    /// Documents that caused a write.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Reads bounded batches of one collection from the source.
pub struct BatchFetcher<S: SourceStore> {
    source: Arc<S>,
    collection: String,
    batch_size: usize,
    lookback: Duration,
}

impl<S: SourceStore> BatchFetcher<S> {
    pub fn new(source: Arc<S>, collection: impl Into<String>, batch_size: usize, lookback: Duration) -> Self {
        Self {
            source,
            collection: collection.into(),
            batch_size,
            lookback,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Query for the batch following `cursor`.
    pub fn query(&self, cursor: &Cursor, now: DateTime<Utc>) -> BatchQuery {
        build_query(cursor, self.batch_size, now, self.lookback)
    }

    /// Open the next batch as a lazy stream.
    ///
    /// Store errors surface as `ReplicationError::Source` items; the caller
    /// stops at the first one.
    pub fn fetch(&self, cursor: &Cursor, now: DateTime<Utc>) -> BoxStream<'_, Result<Document>> {
        let BatchQuery { filter, options } = self.query(cursor, now);
        let collection = self.collection.as_str();
        self.source
            .find(collection, filter, options)
            .map(move |item| item.map_err(|e| ReplicationError::source(collection, "find", e)))
            .boxed()
    }
}
