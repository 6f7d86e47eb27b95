//! In-process counter store backed by a concurrent map.
//!
//! Entries expire lazily: a read past the deadline removes the entry
//! and reports the key absent. Suitable for a single process; a
//! multi-process deployment wants a shared [`CounterStore`]
//! implementation instead.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::Result;
use crate::store::{CounterRecord, CounterStore};

#[derive(Debug, Clone, Copy)]
struct StoredValue {
    value: u64,
    written_at: Instant,
    expires_at: Instant,
}

/// A [`CounterStore`] over a [`DashMap`], with per-entry TTLs.
#[derive(Debug)]
pub struct MemoryStore {
    /// Name used in trace output to tell stores apart
    segment: String,
    entries: DashMap<String, StoredValue>,
    /// Age past which a live entry reads back as stale
    stale_after: Option<Duration>,
}

impl MemoryStore {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            entries: DashMap::new(),
            stale_after: None,
        }
    }

    /// Mark entries stale once they have sat unmodified for `age`.
    pub fn with_staleness(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove entries past their deadline without waiting for a read.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, stored| stored.expires_at > now);
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<CounterRecord> {
        let now = Instant::now();

        let stored = match self.entries.get(key) {
            Some(entry) => *entry.value(),
            None => return Ok(CounterRecord::absent()),
        };

        if stored.expires_at <= now {
            self.entries
                .remove_if(key, |_, current| current.expires_at <= now);
            trace!(segment = %self.segment, key = %key, "Expired counter removed");
            return Ok(CounterRecord::absent());
        }

        let is_stale = self
            .stale_after
            .map_or(false, |age| now >= stored.written_at + age);

        Ok(CounterRecord {
            value: Some(stored.value),
            is_stale,
            ttl: stored.expires_at - now,
        })
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        trace!(
            segment = %self.segment,
            key = %key,
            value = value,
            ttl_ms = ttl.as_millis() as u64,
            "Counter written"
        );
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                written_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_absent_key() {
        let store = MemoryStore::new("test");
        let record = store.get("missing").await.unwrap();
        assert_eq!(record, CounterRecord::absent());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new("test");
        store.set("k", 3, Duration::from_secs(60)).await.unwrap();

        let record = store.get("k").await.unwrap();
        assert_eq!(record.value, Some(3));
        assert!(!record.is_stale);
        assert!(record.ttl > Duration::from_secs(59));
        assert!(record.ttl <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_overwrite_restarts_ttl() {
        let store = MemoryStore::new("test");
        store.set("k", 1, Duration::from_millis(50)).await.unwrap();
        store.set("k", 2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let record = store.get("k").await.unwrap();
        assert_eq!(record.value, Some(2));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = MemoryStore::new("test");
        store.set("k", 5, Duration::from_millis(30)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = store.get("k").await.unwrap();
        assert_eq!(record, CounterRecord::absent());
        // The expired read also removed the entry.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_staleness_horizon() {
        let store = MemoryStore::new("test").with_staleness(Duration::from_millis(20));
        store.set("k", 1, Duration::from_secs(60)).await.unwrap();

        let record = store.get("k").await.unwrap();
        assert!(!record.is_stale);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let record = store.get("k").await.unwrap();
        assert_eq!(record.value, Some(1));
        assert!(record.is_stale);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new("test");
        store.set("a", 1, Duration::from_millis(10)).await.unwrap();
        store.set("b", 1, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.purge_expired();
        assert_eq!(store.len(), 1);
    }
}
