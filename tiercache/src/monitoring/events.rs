//! Cache event log
//!
//! Bounded record of recent cache activity, newest last internally and
//! returned newest first.

use crate::core::types::Tier;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Evict,
    Sync,
    Error,
}

/// Event log entry
#[derive(Debug, Clone, Serialize)]
pub struct CacheEvent {
    pub id: u64,
    pub kind: EventKind,
    pub tier: Option<Tier>,
    pub key: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Ring buffer of cache events. Clones share the same log.
#[derive(Clone)]
pub struct EventLog {
    entries: Arc<Mutex<VecDeque<CacheEvent>>>,
    max_entries: usize,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(max_entries.min(1024)))),
            max_entries: max_entries.max(1),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event, dropping the oldest once full
    pub fn record(
        &self,
        kind: EventKind,
        tier: Option<Tier>,
        key: Option<&str>,
        timestamp: DateTime<Utc>,
        payload: Option<serde_json::Value>,
    ) {
        let event = CacheEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            tier,
            key: key.map(str::to_string),
            timestamp,
            payload,
        };

        let mut entries = self.entries.lock();
        entries.push_back(event);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// The `limit` most recent events, most recent first
    pub fn recent(&self, limit: usize) -> Vec<CacheEvent> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Drop every event; returns how many were removed
    pub fn reset(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recent_is_newest_first() {
        let log = EventLog::new(10);
        let now = Utc::now();
        log.record(EventKind::Set, Some(Tier::Volatile), Some("a"), now, None);
        log.record(EventKind::Hit, Some(Tier::Volatile), Some("a"), now, None);
        log.record(EventKind::Miss, None, Some("b"), now, None);

        let events = log.recent(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Miss);
        assert_eq!(events[1].kind, EventKind::Hit);
        assert!(events[0].id > events[1].id);
    }

    #[test]
    fn test_log_is_bounded() {
        let log = EventLog::new(3);
        let now = Utc::now();
        for i in 0..10 {
            log.record(
                EventKind::Set,
                None,
                Some(&format!("k{}", i)),
                now,
                Some(json!({ "i": i })),
            );
        }

        assert_eq!(log.len(), 3);
        let keys: Vec<_> = log.recent(10).into_iter().filter_map(|e| e.key).collect();
        assert_eq!(keys, vec!["k9", "k8", "k7"]);
    }

    #[test]
    fn test_reset() {
        let log = EventLog::new(5);
        log.record(EventKind::Error, None, None, Utc::now(), None);
        assert_eq!(log.reset(), 1);
        assert!(log.is_empty());
        assert_eq!(log.reset(), 0);
    }
}
