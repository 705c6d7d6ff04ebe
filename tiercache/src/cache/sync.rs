//! Sync engine
//!
//! Reconciles the two in-memory tiers and pushes dirty durable copies to
//! the storage backend. The tier lock is held only while snapshotting and
//! while reporting outcomes, never during backend I/O.

use super::tiered_cache::CacheInner;
use crate::config::SyncConfig;
use crate::core::error::Result;
use crate::core::types::{CacheValue, Tier};
use crate::metrics;
use crate::monitoring::EventKind;
use serde::Serialize;
use std::future::Future;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Outcome of one sync tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pending backend deletes completed
    pub deleted: usize,
    /// Volatile entries copied into an empty durable slot
    pub copied: usize,
    /// Version mismatches settled by the conflict policy
    pub conflicts: usize,
    /// Dirty copies the backend now holds
    pub flushed: usize,
    /// Backend operations that failed after every retry
    pub errors: usize,
}

/// Run `op` once, then up to `retry_attempts` more times while it fails
/// with a storage error, sleeping `retry_delay_ms` between tries
pub(crate) async fn with_retries<T, F, Fut>(config: &SyncConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let delay = Duration::from_millis(config.retry_delay_ms);
    let mut retries_left = config.retry_attempts;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retries_left > 0 && e.is_storage_failure() => {
                retries_left -= 1;
                debug!("Backend operation failed ({}), {} retries left", e, retries_left);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// One full sync tick: pending deletes, tier reconciliation, dirty flush,
/// backend flush
pub(crate) async fn sync_once<V: CacheValue>(inner: &CacheInner<V>) -> SyncReport {
    let config = &inner.config.sync;
    let mut report = SyncReport::default();
    inner.stats.lock().record_sync_attempt();

    if !inner.config.durable.enabled {
        return report;
    }

    // 1. Pending deletes
    let deletes = inner.state.lock().await.pending_deletes();
    for key in deletes {
        match with_retries(config, || inner.backend.delete(&key)).await {
            Ok(()) => {
                inner.state.lock().await.confirm_delete(&key);
                report.deleted += 1;
            }
            Err(e) => {
                report.errors += 1;
                inner.backend_failed("delete", Some(&key), &e);
            }
        }
    }

    // 2. Reconcile tiers and snapshot what must be saved
    let dirty = {
        let mut state = inner.state.lock().await;
        let outcome = state.reconcile(config.conflict_resolution);
        report.copied = outcome.copied;
        report.conflicts = outcome.conflicts;
        let dirty = state.dirty_snapshot();
        inner.settle(&mut state);
        dirty
    };
    if report.conflicts > 0 {
        let mut stats = inner.stats.lock();
        for _ in 0..report.conflicts {
            stats.record_sync_conflict();
        }
    }

    // 3. Flush dirty copies without holding the lock
    for entry in dirty {
        match with_retries(config, || inner.backend.save(&entry)).await {
            Ok(()) => {
                if inner
                    .state
                    .lock()
                    .await
                    .mark_persisted(&entry.key, &entry.version)
                {
                    report.flushed += 1;
                }
            }
            Err(e) => {
                inner
                    .state
                    .lock()
                    .await
                    .mark_save_failed(&entry.key, &entry.version);
                report.errors += 1;
                inner.backend_failed("save", Some(&entry.key), &e);
            }
        }
    }

    // 4. Backend flush
    if let Err(e) = inner.backend.flush().await {
        report.errors += 1;
        inner.backend_failed("flush", None, &e);
    }

    inner.stats.lock().record_flushed(report.flushed as u64);
    if inner.config.metrics.enabled {
        metrics::record_sync("tick", 1);
        metrics::record_sync("flushed", report.flushed as u64);
        metrics::record_sync("conflict", report.conflicts as u64);
    }
    inner.event(
        EventKind::Sync,
        Some(Tier::Durable),
        None,
        serde_json::to_value(report).ok(),
    );

    debug!(
        "Sync tick: deleted={} copied={} conflicts={} flushed={} errors={}",
        report.deleted, report.copied, report.conflicts, report.flushed, report.errors
    );
    report
}

/// Body of the periodic sync task. Stops on the shutdown signal or once
/// every handle to the cache is gone.
pub(crate) async fn run_periodic<V: CacheValue>(
    cache: Weak<CacheInner<V>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(inner) = cache.upgrade() else {
            break;
        };
        sync_once(&inner).await;
    }

    info!("Sync task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CacheError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry_config(attempts: u32) -> SyncConfig {
        SyncConfig {
            retry_attempts: attempts,
            retry_delay_ms: 1,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retries(&retry_config(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::StorageUnavailable("down".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retries(&retry_config(5), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CacheError::StorageUnavailable("flaky".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_caller_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retries(&retry_config(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::SerializationFailure("bad".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
