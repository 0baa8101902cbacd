// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the polling replication engine.
//!
//! Errors are categorized by where they happened (source store, target store,
//! field detection, startup) and carry the collection name so every log line
//! can be traced back to the loop that produced it.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Source` | Yes | Network errors, timeouts, cursor iteration failures on the source |
//! | `Target` | Yes | Read/insert/replace of one document rejected or failed on the target |
//! | `Detection` | Yes | Ordering-field probe failed |
//! | `InvalidDocument` | Yes | Document without `_id` (batch aborts, re-fetched next cycle) |
//! | `Startup` | No | Store unreachable or collection listing failed before loops start |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Engine state machine violation |
//!
//! # Retry Behavior
//!
//! Retryable errors are absorbed by the collection poll loop: it backs off for
//! twice the poll interval and retries the same window forever. Non-retryable
//! errors never happen inside a running loop; they surface from
//! [`ReplicationEngine::start()`](crate::ReplicationEngine::start) or config
//! loading.

use crate::document::Value;
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Source store read failed (probe, find, cursor iteration).
    #[error("Source error ({collection}, {operation}): {message}")]
    Source {
        collection: String,
        operation: String,
        message: String,
    },

    /// Target store read or write for one document failed.
    #[error("Target error ({collection}, {operation}, _id {doc_id}): {message}")]
    Target {
        collection: String,
        doc_id: String,
        operation: String,
        message: String,
    },

    /// Ordering-field detection failed.
    #[error("Detection error ({collection}): {message}")]
    Detection { collection: String, message: String },

    /// A fetched document cannot be replicated as-is.
    #[error("Invalid document in {collection}: {message}")]
    InvalidDocument { collection: String, message: String },

    /// Startup failed (connectivity check or collection discovery).
    ///
    /// Fatal: the engine never spawns collection loops after this.
    #[error("Startup error: {0}")]
    Startup(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ReplicationError {
    /// Wrap a source store error with collection and operation context.
    pub fn source(collection: &str, operation: impl Into<String>, err: StoreError) -> Self {
        Self::Source {
            collection: collection.to_string(),
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Wrap a target store error with collection, document and operation context.
    pub fn target(
        collection: &str,
        doc_id: &Value,
        operation: impl Into<String>,
        err: StoreError,
    ) -> Self {
        Self::Target {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Check if this error is retryable by the collection loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Source { .. } => true,
            Self::Target { .. } => true,
            Self::Detection { .. } => true,
            Self::InvalidDocument { .. } => true,
            Self::Startup(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Short label for metrics (`stage` / `error_type`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Target { .. } => "target",
            Self::Detection { .. } => "detection",
            Self::InvalidDocument { .. } => "invalid_document",
            Self::Startup(_) => "startup",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}
