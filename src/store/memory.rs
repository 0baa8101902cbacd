// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory document store.
//!
//! Implements both [`SourceStore`] and [`TargetStore`], so one instance can
//! act as either side of a replication pair. Unsorted finds return documents
//! in insertion order (the "natural" order of a real store); replacing a
//! document keeps its position.
//!
//! Faults can be injected per collection to exercise the engine's failure
//! handling without a real database:
//!
//! - [`reject_writes`](InMemoryStore::reject_writes): every insert/replace fails
//! - [`fail_reads`](InMemoryStore::fail_reads): every probe, find and lookup fails
//! - [`fail_stream_after`](InMemoryStore::fail_stream_after): a find cursor dies
//!   after yielding N documents
//! - [`set_unavailable`](InMemoryStore::set_unavailable): `ping` and
//!   `list_collections` fail

use super::{
    BoxFuture, DocumentStream, Filter, FindOptions, SortOrder, SourceStore, StoreError,
    StoreResult, TargetStore,
};
use crate::document::{Document, Value, ID_FIELD};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Vec<Document>>,
    reject_writes: HashSet<String>,
    fail_reads: HashSet<String>,
    fail_stream_after: HashMap<String, usize>,
    unavailable: bool,
}

/// Thread-safe in-memory store with fault injection.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    inserts: AtomicUsize,
    replaces: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-written document
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Create an empty collection (no-op if it exists).
    pub fn create_collection(&self, collection: &str) {
        self.lock().collections.entry(collection.to_string()).or_default();
    }

    /// Insert or overwrite a document directly, bypassing fault injection.
    pub fn put(&self, collection: &str, doc: Document) {
        let mut inner = self.lock();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match doc.id().and_then(|id| position_of(docs, id)) {
            Some(pos) => docs[pos] = doc,
            None => docs.push(doc),
        }
    }

    /// Fetch a document by `_id` directly, bypassing fault injection.
    pub fn get(&self, collection: &str, id: &Value) -> Option<Document> {
        let inner = self.lock();
        let docs = inner.collections.get(collection)?;
        position_of(docs, id).map(|pos| docs[pos].clone())
    }

    /// All documents of a collection in natural order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock().collections.get(collection).cloned().unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, Vec::len)
    }

    /// Number of successful `insert_one` calls.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of successful `replace_one` calls.
    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    pub fn reject_writes(&self, collection: &str, reject: bool) {
        let mut inner = self.lock();
        if reject {
            inner.reject_writes.insert(collection.to_string());
        } else {
            inner.reject_writes.remove(collection);
        }
    }

    pub fn fail_reads(&self, collection: &str, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.fail_reads.insert(collection.to_string());
        } else {
            inner.fail_reads.remove(collection);
        }
    }

    /// Make `find` cursors on this collection fail after `n` documents.
    pub fn fail_stream_after(&self, collection: &str, n: Option<usize>) {
        let mut inner = self.lock();
        match n {
            Some(n) => {
                inner.fail_stream_after.insert(collection.to_string(), n);
            }
            None => {
                inner.fail_stream_after.remove(collection);
            }
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn check_reads(&self, collection: &str) -> StoreResult<()> {
        if self.lock().fail_reads.contains(collection) {
            return Err(StoreError::new(format!("read failed on {}", collection)));
        }
        Ok(())
    }

    fn check_writes(&self, collection: &str) -> StoreResult<()> {
        if self.lock().reject_writes.contains(collection) {
            return Err(StoreError::new(format!("write rejected on {}", collection)));
        }
        Ok(())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.lock().unavailable {
            return Err(StoreError::new("store unavailable"));
        }
        Ok(())
    }

    /// Run a query against a snapshot of the collection.
    fn query(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let inner = self.lock();
        let mut matched: Vec<Document> = inner
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();

        if let Some((field, order)) = &options.sort {
            matched.sort_by(|a, b| {
                let av = a.get(field).unwrap_or(&Value::Null);
                let bv = b.get(field).unwrap_or(&Value::Null);
                match order {
                    SortOrder::Ascending => av.canonical_cmp(bv),
                    SortOrder::Descending => bv.canonical_cmp(av),
                }
            });
        }

        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        matched
    }
}

fn position_of(docs: &[Document], id: &Value) -> Option<usize> {
    docs.iter().position(|d| d.get(ID_FIELD) == Some(id))
}

impl SourceStore for InMemoryStore {
    fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.lock().collections.keys().cloned().collect())
        })
    }

    fn find_one(&self, collection: &str, filter: Filter) -> BoxFuture<'_, Option<Document>> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check_reads(&collection)?;
            let options = FindOptions::default().with_limit(1);
            Ok(self.query(&collection, &filter, &options).into_iter().next())
        })
    }

    fn find(&self, collection: &str, filter: Filter, options: FindOptions) -> DocumentStream<'_> {
        if let Err(e) = self.check_reads(collection) {
            return stream::once(async move { Err::<Document, StoreError>(e) }).boxed();
        }

        let docs = self.query(collection, &filter, &options);
        let fail_after = self.lock().fail_stream_after.get(collection).copied();

        match fail_after {
            Some(n) if n < docs.len() => {
                let message = format!("cursor lost on {} after {} documents", collection, n);
                stream::iter(docs.into_iter().take(n).map(Ok::<Document, StoreError>))
                    .chain(stream::once(async move { Err(StoreError::new(message)) }))
                    .boxed()
            }
            _ => stream::iter(docs.into_iter().map(Ok::<Document, StoreError>)).boxed(),
        }
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.check_available() })
    }
}

impl TargetStore for InMemoryStore {
    fn find_one(&self, collection: &str, id: &Value) -> BoxFuture<'_, Option<Document>> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            self.check_reads(&collection)?;
            Ok(self.get(&collection, &id))
        })
    }

    fn insert_one(&self, collection: &str, doc: Document) -> BoxFuture<'_, ()> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check_writes(&collection)?;
            let id = doc
                .id()
                .cloned()
                .ok_or_else(|| StoreError::new("document has no _id"))?;

            let mut inner = self.lock();
            let docs = inner.collections.entry(collection.clone()).or_default();
            if position_of(docs, &id).is_some() {
                return Err(StoreError::new(format!(
                    "duplicate key error in {}: _id {}",
                    collection, id
                )));
            }
            docs.push(doc);
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn replace_one(&self, collection: &str, id: &Value, doc: Document) -> BoxFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            self.check_writes(&collection)?;
            let mut inner = self.lock();
            // Like a non-upsert replace, a missing document matches nothing
            if let Some(docs) = inner.collections.get_mut(&collection) {
                if let Some(pos) = position_of(docs, &id) {
                    docs[pos] = doc;
                    self.replaces.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.check_available() })
    }
}
