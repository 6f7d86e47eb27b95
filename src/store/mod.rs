//! Pluggable counter storage.
//!
//! Limiters read and write window counters through the [`CounterStore`]
//! trait, so the engine runs unchanged against an in-process map or a
//! shared external store. The bundled [`MemoryStore`] covers the
//! single-process case.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

mod memory;

pub use memory::MemoryStore;

/// A counter as read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    /// Stored count, or `None` when the key is absent or expired
    pub value: Option<u64>,
    /// Whether the entry outlived the store's staleness horizon
    pub is_stale: bool,
    /// Time left until the entry expires
    pub ttl: Duration,
}

impl CounterRecord {
    /// The record returned for a key with no live entry.
    pub fn absent() -> Self {
        Self {
            value: None,
            is_stale: false,
            ttl: Duration::ZERO,
        }
    }
}

/// Storage for expiring window counters.
///
/// Implementations must expire entries no later than their TTL and are
/// expected to be shared across tasks behind an `Arc`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter at `key`.
    ///
    /// Absent and expired keys both return [`CounterRecord::absent`];
    /// callers cannot tell the two apart, and do not need to.
    async fn get(&self, key: &str) -> Result<CounterRecord>;

    /// Write `value` at `key`, expiring after `ttl`.
    ///
    /// Overwrites any existing entry and restarts its clock.
    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()>;
}
