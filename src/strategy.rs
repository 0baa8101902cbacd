// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordering strategy detection.
//!
//! Without a change feed, "new" documents are found by a field that grows
//! over time. Each collection is probed once, when its loop starts:
//!
//! ```text
//! updatedAt ──▶ modifiedAt ──▶ lastModified ──▶ createdAt ──▶ _id
//!    │              │               │               │          │
//!    └── first field present on at least one document wins ────┘
//! ```
//!
//! A winning timestamp-like field gives [`OrderingStrategy::Field`]. If `_id`
//! wins, or nothing matches (empty collection), the loop falls back to
//! [`OrderingStrategy::Identifier`], which walks generation-ordered ids.

use crate::document::ID_FIELD;
use crate::error::{ReplicationError, Result};
use crate::store::{Filter, SourceStore};
use std::fmt;
use tracing::debug;

/// How a collection's "new" documents are selected. Fixed for the lifetime
/// of a collection loop once detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// Documents whose named field is newer than the cursor timestamp.
    Field(String),
    /// Documents whose `_id` is greater than the last one seen.
    Identifier,
}

impl OrderingStrategy {
    /// Bound field name, if field-based.
    pub fn field(&self) -> Option<&str> {
        match self {
            OrderingStrategy::Field(f) => Some(f),
            OrderingStrategy::Identifier => None,
        }
    }

    pub fn is_time_based(&self) -> bool {
        matches!(self, OrderingStrategy::Field(_))
    }

    /// Label for metrics and logs.
    pub fn label(&self) -> &str {
        match self {
            OrderingStrategy::Field(f) => f,
            OrderingStrategy::Identifier => ID_FIELD,
        }
    }
}

impl fmt::Display for OrderingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingStrategy::Field(field) => write!(f, "field:{}", field),
            OrderingStrategy::Identifier => write!(f, "identifier"),
        }
    }
}

/// Probe `candidates` in order and pick the ordering strategy for a collection.
///
/// Each probe is a single `find_one` with an existence filter. A probe error
/// aborts detection; the caller retries the whole detection later.
pub async fn detect<S>(source: &S, collection: &str, candidates: &[String]) -> Result<OrderingStrategy>
where
    S: SourceStore + ?Sized,
{
    for candidate in candidates {
        let probe = source
            .find_one(collection, Filter::exists(candidate.as_str()))
            .await
            .map_err(|e| ReplicationError::Detection {
                collection: collection.to_string(),
                message: format!("probe for {} failed: {}", candidate, e),
            })?;

        if probe.is_some() {
            debug!(collection = %collection, field = %candidate, "Ordering field found");
            if candidate == ID_FIELD {
                return Ok(OrderingStrategy::Identifier);
            }
            return Ok(OrderingStrategy::Field(candidate.clone()));
        }
    }

    debug!(collection = %collection, "No candidate field present, using identifier ordering");
    Ok(OrderingStrategy::Identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CANDIDATE_FIELDS;
    use crate::document::Document;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn candidates() -> Vec<String> {
        DEFAULT_CANDIDATE_FIELDS.iter().map(|f| f.to_string()).collect()
    }

    #[tokio::test]
    async fn test_detect_prefers_updated_at() {
        let store = InMemoryStore::new();
        store.put("c", Document::new().with("_id", 1).with("createdAt", Utc::now()));
        store.put("c", Document::new().with("_id", 2).with("updatedAt", Utc::now()));

        let strategy = detect(&store, "c", &candidates()).await.unwrap();
        assert_eq!(strategy, OrderingStrategy::Field("updatedAt".to_string()));
        assert!(strategy.is_time_based());
    }

    #[tokio::test]
    async fn test_detect_created_at_over_id() {
        let store = InMemoryStore::new();
        store.put("c", Document::new().with("_id", 1).with("createdAt", Utc::now()));

        let strategy = detect(&store, "c", &candidates()).await.unwrap();
        assert_eq!(strategy.field(), Some("createdAt"));
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_identifier() {
        let store = InMemoryStore::new();
        store.put("c", Document::new().with("_id", 1).with("name", "x"));

        let strategy = detect(&store, "c", &candidates()).await.unwrap();
        assert_eq!(strategy, OrderingStrategy::Identifier);
        assert_eq!(strategy.field(), None);
        assert_eq!(strategy.label(), "_id");
    }

    #[tokio::test]
    async fn test_detect_empty_collection() {
        let store = InMemoryStore::new();
        store.create_collection("empty");

        let strategy = detect(&store, "empty", &candidates()).await.unwrap();
        assert_eq!(strategy, OrderingStrategy::Identifier);
    }

    #[tokio::test]
    async fn test_detect_probe_failure() {
        let store = InMemoryStore::new();
        store.put("c", Document::new().with("_id", 1));
        store.fail_reads("c", true);

        let err = detect(&store, "c", &candidates()).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Detection { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_detect_custom_candidates() {
        let store = InMemoryStore::new();
        store.put("c", Document::new().with("_id", 1).with("ts", Utc::now()).with("updatedAt", Utc::now()));

        let strategy = detect(&store, "c", &["ts".to_string()]).await.unwrap();
        assert_eq!(strategy.to_string(), "field:ts");
    }
}
