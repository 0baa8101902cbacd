// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store collaborator traits.
//!
//! The engine never talks to a database driver directly. The process that
//! embeds it provides one [`SourceStore`] and one [`TargetStore`]
//! implementation (typically thin adapters over a driver's connection pool),
//! and the engine drives replication through these traits.
//!
//! ```text
//! SourceStore                                 TargetStore
//! ├── list_collections()  (discovery)         ├── find_one(collection, _id)
//! ├── find_one(filter)    (field probe)       ├── insert_one(collection, doc)
//! ├── find(filter, opts)  (lazy batch read)   ├── replace_one(collection, _id, doc)
//! └── ping()              (startup check)     └── ping()
//! ```
//!
//! Connection management, authentication and pooling belong to the
//! implementation. Both pools are shared by every collection loop, so
//! implementations must be `Send + Sync` and safe to call concurrently.
//!
//! # Example
//!
//! ```rust,no_run
//! use poll_replication_engine::document::{Document, Value};
//! use poll_replication_engine::store::{BoxFuture, TargetStore};
//!
//! struct LoggingTarget;
//!
//! impl TargetStore for LoggingTarget {
//!     fn find_one(&self, _collection: &str, _id: &Value) -> BoxFuture<'_, Option<Document>> {
//!         Box::pin(async { Ok(None) })
//!     }
//!
//!     fn insert_one(&self, collection: &str, doc: Document) -> BoxFuture<'_, ()> {
//!         let collection = collection.to_string();
//!         Box::pin(async move {
//!             println!("insert into {}: {}", collection, doc.to_json());
//!             Ok(())
//!         })
//!     }
//!
//!     fn replace_one(&self, _collection: &str, _id: &Value, _doc: Document) -> BoxFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//! ```

pub mod memory;

pub use memory::InMemoryStore;

use crate::document::{Document, Value};
use futures::stream::BoxStream;
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Lazy, cursor-backed sequence of documents.
pub type DocumentStream<'a> = BoxStream<'a, StoreResult<Document>>;

/// Simplified error for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

// ═══════════════════════════════════════════════════════════════════════════════
// Query model
// ═══════════════════════════════════════════════════════════════════════════════

/// Single-field query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// `{field: {$exists: true}}`
    Exists(String),
    /// `{field: value}`
    Eq(String, Value),
    /// `{field: {$gt: value}}`
    Gt(String, Value),
    /// `{field: {$gte: value}}`
    Gte(String, Value),
}

impl Filter {
    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists(field.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    /// The field this predicate tests, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Filter::All => None,
            Filter::Exists(f) | Filter::Eq(f, _) | Filter::Gt(f, _) | Filter::Gte(f, _) => Some(f),
        }
    }

    /// Evaluate against a document. Range predicates use type-bracketed
    /// comparison, so values of another type never match.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Exists(field) => doc.contains_key(field),
            Filter::Eq(field, value) => doc.get(field).is_some_and(|v| v == value),
            Filter::Gt(field, bound) => doc
                .get(field)
                .and_then(|v| v.compare(bound))
                .is_some_and(|ord| ord == Ordering::Greater),
            Filter::Gte(field, bound) => doc
                .get(field)
                .and_then(|v| v.compare(bound))
                .is_some_and(|ord| ord != Ordering::Less),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options for [`SourceStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Sort key. `None` means store-default (natural) order.
    pub sort: Option<(String, SortOrder)>,
}

impl FindOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Read side: the store documents are replicated from.
pub trait SourceStore: Send + Sync + 'static {
    /// List collection names in the replicated database.
    fn list_collections(&self) -> BoxFuture<'_, Vec<String>>;

    /// Fetch one document matching the filter (used for field-existence probes).
    fn find_one(&self, collection: &str, filter: Filter) -> BoxFuture<'_, Option<Document>>;

    /// Open a lazy cursor over matching documents.
    ///
    /// Errors may surface on any item (e.g. connection lost mid-iteration).
    fn find(&self, collection: &str, filter: Filter, options: FindOptions) -> DocumentStream<'_>;

    /// Connectivity check used once at startup.
    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Write side: the store documents are replicated to.
pub trait TargetStore: Send + Sync + 'static {
    /// Fetch a document by `_id`.
    fn find_one(&self, collection: &str, id: &Value) -> BoxFuture<'_, Option<Document>>;

    /// Insert a full document.
    fn insert_one(&self, collection: &str, doc: Document) -> BoxFuture<'_, ()>;

    /// Replace the whole document with the given `_id`.
    fn replace_one(&self, collection: &str, id: &Value, doc: Document) -> BoxFuture<'_, ()>;

    /// Connectivity check used once at startup.
    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_filter_exists() {
        let doc = Document::new().with("_id", 1).with("createdAt", Utc::now());
        assert!(Filter::exists("createdAt").matches(&doc));
        assert!(!Filter::exists("updatedAt").matches(&doc));
    }

    #[test]
    fn test_filter_gt_is_strict() {
        let now = Utc::now();
        let doc = Document::new().with("_id", 1).with("updatedAt", now);
        assert!(Filter::gt("updatedAt", now - Duration::seconds(1)).matches(&doc));
        assert!(!Filter::gt("updatedAt", now).matches(&doc));
        assert!(Filter::gte("updatedAt", now).matches(&doc));
    }

    #[test]
    fn test_filter_range_ignores_other_types() {
        let now = Utc::now();
        let doc = Document::new().with("_id", 1).with("updatedAt", "2020-01-01");
        assert!(!Filter::gt("updatedAt", now - Duration::days(10_000)).matches(&doc));
        assert!(!Filter::gt("missing", now).matches(&doc));
    }

    #[test]
    fn test_filter_eq_and_field() {
        let doc = Document::new().with("_id", 3);
        assert!(Filter::eq("_id", 3).matches(&doc));
        assert!(!Filter::eq("_id", 4).matches(&doc));
        assert!(Filter::All.matches(&doc));
        assert_eq!(Filter::eq("_id", 3).field(), Some("_id"));
        assert_eq!(Filter::All.field(), None);
    }

    #[test]
    fn test_find_options_builder() {
        let opts = FindOptions::default()
            .with_limit(10)
            .sort_by("_id", SortOrder::Ascending);
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.sort, Some(("_id".to_string(), SortOrder::Ascending)));
    }

    #[test]
    fn test_store_error_display() {
        let error = StoreError::new("socket closed");
        assert_eq!(error.to_string(), "socket closed");
        let _: &dyn std::error::Error = &error;
    }
}
