// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-document reconciliation against the target store.
//!
//! ```text
//! source doc ──▶ target.find_one(_id)
//!                   │
//!                   ├── absent ───────────▶ insert_one(doc)          → Inserted
//!                   ├── equal ────────────▶ (no write)               → Unchanged
//!                   └── different ────────▶ replace_one(_id, doc)    → Updated
//! ```
//!
//! Equality is a deep structural comparison of the whole document. Running
//! the same document twice leaves the target as one run would and reports
//! `Unchanged` the second time, so re-delivered batches are harmless.
//!
//! Errors are never swallowed. The caller stops the batch at the first one.

use crate::document::Document;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::TargetStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of reconciling one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    Inserted,
    Updated,
    Unchanged,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Inserted => "inserted",
            SyncAction::Updated => "updated",
            SyncAction::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Makes target documents of one collection converge to their source value.
pub struct Reconciler<T: TargetStore> {
    target: Arc<T>,
    collection: String,
}

impl<T: TargetStore> Reconciler<T> {
    pub fn new(target: Arc<T>, collection: impl Into<String>) -> Self {
        Self {
            target,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Reconcile one source document.
    pub async fn reconcile(&self, doc: &Document) -> Result<SyncAction> {
        let id = doc.id().ok_or_else(|| ReplicationError::InvalidDocument {
            collection: self.collection.clone(),
            message: "document has no _id".to_string(),
        })?;

        let existing = self
            .target
            .find_one(&self.collection, id)
            .await
            .map_err(|e| ReplicationError::target(&self.collection, id, "find_one", e))?;

        let action = match existing {
            None => {
                self.target
                    .insert_one(&self.collection, doc.clone())
                    .await
                    .map_err(|e| ReplicationError::target(&self.collection, id, "insert_one", e))?;
                info!(collection = %self.collection, doc_id = %id, "Inserted document");
                SyncAction::Inserted
            }
            Some(current) if current == *doc => {
                debug!(collection = %self.collection, doc_id = %id, "Document unchanged");
                SyncAction::Unchanged
            }
            Some(_) => {
                self.target
                    .replace_one(&self.collection, id, doc.clone())
                    .await
                    .map_err(|e| ReplicationError::target(&self.collection, id, "replace_one", e))?;
                info!(collection = %self.collection, doc_id = %id, "Updated document");
                SyncAction::Updated
            }
        };

        metrics::record_reconcile(&self.collection, action.as_str());
        Ok(action)
    }
}
