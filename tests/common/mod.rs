//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - A recording TargetStore wrapper
//! - Document and config helpers
//! - Polling helpers for paused-time tests

#![allow(dead_code)]

pub mod mock_store;

pub use mock_store::*;

use chrono::{DateTime, Utc};
use poll_replication_engine::config::{PollSettings, ReplicationConfig};
use poll_replication_engine::document::{Document, Value};
use std::future::Future;
use std::time::Duration;

/// Config with a 1s poll interval (2s error backoff).
pub fn fast_config() -> ReplicationConfig {
    ReplicationConfig {
        poll: PollSettings {
            poll_interval_sec: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `{_id, updatedAt, v}`
pub fn versioned(id: i64, updated_at: DateTime<Utc>, v: &str) -> Document {
    Document::new()
        .with("_id", id)
        .with("updatedAt", updated_at)
        .with("v", v)
}

pub fn id(n: i64) -> Value {
    Value::Int(n)
}

/// Poll `check` every 100ms (virtual time under `start_paused`) until it
/// returns true, up to `limit`. Returns whether it became true.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    loop {
        if check().await {
            return true;
        }
        if waited >= limit {
            return false;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
}
