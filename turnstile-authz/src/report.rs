//! Usage report batching.
//!
//! Allowed calls in cached mode record their usage here instead of writing
//! to the backend. The flush task periodically drains the pending map and
//! sends one report per backend target; a failed report is merged back and
//! retried on the next flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use turnstile_client::{BackendApi, Transaction};
use turnstile_core::{BackendTarget, ReportKey, UsageDelta};

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Default)]
pub struct ReportStats {
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
    /// Report records delivered to the backend
    pub records_sent: AtomicU64,
    /// Report records merged back after a failed flush
    pub records_requeued: AtomicU64,
}

/// Snapshot of report counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatsSnapshot {
    pub pending: usize,
    pub flushes: u64,
    pub flush_failures: u64,
    pub records_sent: u64,
    pub records_requeued: u64,
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub targets: usize,
    pub records_sent: usize,
    pub records_requeued: usize,
}

// ============================================================================
// REPORT CACHE
// ============================================================================

/// Pending usage keyed by backend target and application credentials.
#[derive(Debug, Default)]
pub struct ReportCache {
    pending: DashMap<ReportKey, UsageDelta>,
    stats: ReportStats,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `usage` into the pending record for `key`.
    pub fn record(&self, key: ReportKey, usage: &UsageDelta) {
        if usage.is_empty() {
            return;
        }
        self.pending.entry(key).or_default().merge(usage);
    }

    /// Number of pending report records.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> ReportStatsSnapshot {
        ReportStatsSnapshot {
            pending: self.pending(),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
            flush_failures: self.stats.flush_failures.load(Ordering::Relaxed),
            records_sent: self.stats.records_sent.load(Ordering::Relaxed),
            records_requeued: self.stats.records_requeued.load(Ordering::Relaxed),
        }
    }

    /// Remove every pending record, grouped by backend target.
    fn drain(&self) -> HashMap<BackendTarget, Vec<Transaction>> {
        let keys: Vec<ReportKey> = self.pending.iter().map(|entry| entry.key().clone()).collect();

        let mut batches: HashMap<BackendTarget, Vec<Transaction>> = HashMap::new();
        for key in keys {
            if let Some((key, usage)) = self.pending.remove(&key) {
                batches.entry(key.target).or_default().push(Transaction {
                    credentials: key.credentials,
                    usage,
                });
            }
        }
        batches
    }

    fn requeue(&self, target: &BackendTarget, transactions: Vec<Transaction>) {
        for tx in transactions {
            self.record(ReportKey::new(target.clone(), tx.credentials), &tx.usage);
        }
    }

    /// Send every pending record, one report per backend target.
    pub async fn flush(&self, backend: &dyn BackendApi) -> FlushSummary {
        let batches = self.drain();
        if batches.is_empty() {
            return FlushSummary::default();
        }
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);

        let results = join_all(batches.into_iter().map(|(target, transactions)| async move {
            let result = backend.report(&target, &transactions).await;
            (target, transactions, result)
        }))
        .await;

        let mut summary = FlushSummary {
            targets: results.len(),
            ..Default::default()
        };
        for (target, transactions, result) in results {
            match result {
                Ok(()) => {
                    summary.records_sent += transactions.len();
                    tracing::debug!(
                        service_id = %target.service_id,
                        records = transactions.len(),
                        "Usage report flushed"
                    );
                }
                Err(e) => {
                    summary.records_requeued += transactions.len();
                    tracing::warn!(
                        service_id = %target.service_id,
                        records = transactions.len(),
                        error = %e,
                        "Usage report flush failed, will retry"
                    );
                    self.requeue(&target, transactions);
                }
            }
        }

        self.stats
            .records_sent
            .fetch_add(summary.records_sent as u64, Ordering::Relaxed);
        if summary.records_requeued > 0 {
            self.stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            self.stats
                .records_requeued
                .fetch_add(summary.records_requeued as u64, Ordering::Relaxed);
        }
        summary
    }
}

// ============================================================================
// FLUSH TASK
// ============================================================================

/// Flush pending reports every `flush_interval` until shutdown, then once more.
pub(crate) async fn flush_task(
    reports: Arc<ReportCache>,
    backend: Arc<dyn BackendApi>,
    flush_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        flush_interval_ms = flush_interval.as_millis() as u64,
        "Usage report flusher started"
    );

    loop {
        tokio::select! {
            biased;
            _ = crate::stop_requested(&mut shutdown_rx) => break,
            _ = ticker.tick() => {
                reports.flush(backend.as_ref()).await;
            }
        }
    }

    let summary = reports.flush(backend.as_ref()).await;
    let stats = reports.stats();
    tracing::info!(
        final_records_sent = summary.records_sent,
        final_records_requeued = summary.records_requeued,
        flushes = stats.flushes,
        flush_failures = stats.flush_failures,
        records_sent = stats.records_sent,
        "Usage report flusher stopped"
    );
}
