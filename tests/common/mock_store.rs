//! Recording TargetStore for testing.
//!
//! Wraps an [`InMemoryStore`] and records every target call in order, so
//! tests can assert on write ordering and on what happened before a failure.
//! Can be told to fail after a number of successful writes.

use poll_replication_engine::document::{Document, Value};
use poll_replication_engine::store::{BoxFuture, InMemoryStore, StoreError, TargetStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A recorded target call.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetCall {
    FindOne { collection: String, id: Value },
    Insert { collection: String, id: Value },
    Replace { collection: String, id: Value },
}

impl TargetCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, TargetCall::FindOne { .. })
    }
}

/// TargetStore that records calls and delegates to an in-memory store.
///
/// # Example
/// ```rust,ignore
/// let target = Arc::new(RecordingTarget::new());
/// target.fail_after_writes(2);
///
/// // Use in tests...
///
/// assert_eq!(target.writes().len(), 2);
/// ```
pub struct RecordingTarget {
    inner: Arc<InMemoryStore>,
    calls: Mutex<Vec<TargetCall>>,
    /// Writes allowed before every further write fails
    fail_after_writes: AtomicUsize,
    write_count: AtomicUsize,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryStore::new()),
            calls: Mutex::new(Vec::new()),
            fail_after_writes: AtomicUsize::new(usize::MAX),
            write_count: AtomicUsize::new(0),
        }
    }

    /// The backing store (for seeding and inspection).
    pub fn store(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Fail every write after `n` successful ones.
    pub fn fail_after_writes(&self, n: usize) {
        self.write_count.store(0, Ordering::SeqCst);
        self.fail_after_writes.store(n, Ordering::SeqCst);
    }

    /// Accept all writes again.
    pub fn heal(&self) {
        self.fail_after_writes.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TargetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<TargetCall> {
        self.calls().into_iter().filter(TargetCall::is_write).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: TargetCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn admit_write(&self) -> Result<(), StoreError> {
        let n = self.write_count.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_after_writes.load(Ordering::SeqCst) {
            return Err(StoreError::new("injected write failure"));
        }
        Ok(())
    }
}

impl TargetStore for RecordingTarget {
    fn find_one(&self, collection: &str, id: &Value) -> BoxFuture<'_, Option<Document>> {
        self.record(TargetCall::FindOne {
            collection: collection.to_string(),
            id: id.clone(),
        });
        TargetStore::find_one(self.inner.as_ref(), collection, id)
    }

    fn insert_one(&self, collection: &str, doc: Document) -> BoxFuture<'_, ()> {
        let id = doc.id().cloned().unwrap_or(Value::Null);
        if let Err(e) = self.admit_write() {
            return Box::pin(async move { Err(e) });
        }
        self.record(TargetCall::Insert {
            collection: collection.to_string(),
            id,
        });
        self.inner.insert_one(collection, doc)
    }

    fn replace_one(&self, collection: &str, id: &Value, doc: Document) -> BoxFuture<'_, ()> {
        if let Err(e) = self.admit_write() {
            return Box::pin(async move { Err(e) });
        }
        self.record(TargetCall::Replace {
            collection: collection.to_string(),
            id: id.clone(),
        });
        self.inner.replace_one(collection, id, doc)
    }
}
