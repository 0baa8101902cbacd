//! Collection poll loop.
//!
//! Each replicated collection has a dedicated task that:
//! 1. Detects the ordering strategy (once; retried until it succeeds)
//! 2. Captures the poll start time
//! 3. Streams the next bounded batch from the source
//! 4. Reconciles each document against the target, strictly in fetch order
//! 5. Advances the collection's cursor
//! 6. Sleeps for the poll interval
//!
//! # Failure Handling
//!
//! Any error in steps 1-5 aborts the cycle. The cursor is not touched, the
//! failure is logged with the collection name, and the loop sleeps for twice
//! the poll interval before retrying the same window. There is no retry cap:
//! a collection that keeps failing keeps backing off and retrying, and never
//! affects other collections.
//!
//! # Cancellation
//!
//! Every suspension point (store calls and sleeps) races the shutdown
//! signal with `tokio::select!`. In-flight store calls are dropped rather
//! than awaited; a half-reconciled batch is re-delivered on the next run.

use super::types::{CollectionStats, StatsTable};
use crate::batch::{self, BatchFetcher, BatchResult};
use crate::config::PollSettings;
use crate::cursor::{Cursor, CursorStore};
use crate::error::Result;
use crate::metrics;
use crate::reconcile::{Reconciler, SyncAction};
use crate::store::{SourceStore, TargetStore};
use crate::strategy::{self, OrderingStrategy};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Run the poll loop for a single collection.
///
/// This function runs until shutdown is signaled (or the signal sender is
/// dropped).
pub(crate) async fn run_collection_loop<S: SourceStore, T: TargetStore>(
    collection: String,
    source: Arc<S>,
    target: Arc<T>,
    cursors: CursorStore,
    stats: StatsTable,
    settings: PollSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let span = info_span!("poll_loop", collection = %collection);

    async move {
        info!(
            poll_interval_sec = settings.poll_interval_sec,
            batch_size = settings.batch_size,
            "Starting collection poll loop"
        );

        let mut poller = CollectionPoller::new(collection, source, target, cursors, stats, settings);

        loop {
            let outcome = tokio::select! {
                biased;

                // Priority: check shutdown first
                _ = shutdown_requested(&mut shutdown_rx) => break,

                result = poller.poll_once() => result,
            };

            let pause = match outcome {
                Ok(result) => {
                    poller.on_success(&result).await;
                    poller.settings.interval()
                }
                Err(e) => {
                    let backoff = poller.settings.error_backoff();
                    warn!(
                        error = %e,
                        stage = e.kind(),
                        backoff_sec = backoff.as_secs(),
                        "Poll cycle failed, backing off"
                    );
                    metrics::record_poll_error(&poller.collection, e.kind());
                    poller.stats_entry(|s| s.record_failure(&e)).await;
                    backoff
                }
            };

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Collection poll loop stopped");
    }
    .instrument(span)
    .await
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// State owned by one collection loop.
struct CollectionPoller<S: SourceStore, T: TargetStore> {
    collection: String,
    source: Arc<S>,
    fetcher: BatchFetcher<S>,
    reconciler: Reconciler<T>,
    cursors: CursorStore,
    stats: StatsTable,
    settings: PollSettings,
    /// Fixed once detected.
    strategy: Option<OrderingStrategy>,
}

impl<S: SourceStore, T: TargetStore> CollectionPoller<S, T> {
    fn new(
        collection: String,
        source: Arc<S>,
        target: Arc<T>,
        cursors: CursorStore,
        stats: StatsTable,
        settings: PollSettings,
    ) -> Self {
        let fetcher = BatchFetcher::new(
            Arc::clone(&source),
            collection.clone(),
            settings.batch_size,
            settings.initial_lookback(),
        );
        let reconciler = Reconciler::new(target, collection.clone());
        Self {
            collection,
            source,
            fetcher,
            reconciler,
            cursors,
            stats,
            settings,
            strategy: None,
        }
    }

    async fn strategy(&mut self) -> Result<OrderingStrategy> {
        if let Some(strategy) = &self.strategy {
            return Ok(strategy.clone());
        }

        let detected =
            strategy::detect(self.source.as_ref(), &self.collection, &self.settings.candidate_fields).await?;
        info!(strategy = %detected, "Ordering strategy selected");
        metrics::record_strategy(&self.collection, detected.label());

        let label = detected.to_string();
        self.stats_entry(|s| s.strategy = Some(label)).await;
        self.strategy = Some(detected.clone());
        Ok(detected)
    }

    /// One poll cycle. The cursor only moves if every document reconciled.
    async fn poll_once(&mut self) -> Result<BatchResult> {
        let strategy = self.strategy().await?;

        let started = Utc::now();
        let timer = Instant::now();
        let cursor = self
            .cursors
            .get_or_init(&self.collection, &strategy, started, self.settings.initial_lookback())
            .await;

        let mut result = BatchResult::default();
        {
            let mut docs = self.fetcher.fetch(&cursor, started);
            while let Some(doc) = docs.next().await {
                let doc = doc?;
                let action = self.reconciler.reconcile(&doc).await?;

                result.total += 1;
                match action {
                    SyncAction::Inserted => result.inserted += 1,
                    SyncAction::Updated => result.updated += 1,
                    SyncAction::Unchanged => result.unchanged += 1,
                }
                result.last_id = doc.id().cloned();
            }
        }

        metrics::record_documents_fetched(&self.collection, result.total);

        if strategy.is_time_based() && result.is_saturated(self.fetcher.batch_size()) {
            warn!(
                count = result.total,
                field = strategy.label(),
                "Batch hit the size cap; documents past the cap in this window are skipped"
            );
            metrics::record_saturated_batch(&self.collection);
        }

        let next = batch::next_cursor(&cursor, started, result.last_id.as_ref());
        if next != cursor && self.cursors.advance(&self.collection, next.clone()).await {
            metrics::record_cursor_advance(&self.collection);
            if let Cursor::Timestamp { last_seen, .. } = &next {
                metrics::set_cursor_timestamp(&self.collection, last_seen.timestamp());
            }
        }

        metrics::record_batch(&self.collection, result.total, timer.elapsed());
        Ok(result)
    }

    async fn on_success(&self, result: &BatchResult) {
        if result.is_empty() {
            debug!("No new documents");
        } else {
            info!(
                count = result.total,
                inserted = result.inserted,
                updated = result.updated,
                unchanged = result.unchanged,
                "Batch synced"
            );
        }
        self.stats_entry(|s| s.record_batch(result)).await;
    }

    async fn stats_entry<F>(&self, f: F)
    where
        F: FnOnce(&mut CollectionStats),
    {
        let mut stats = self.stats.write().await;
        f(stats.entry(self.collection.clone()).or_default());
    }
}
