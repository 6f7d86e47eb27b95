//! Single-window fixed-window limiter.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::LimitConfig;
use crate::error::Result;
use crate::ratelimit::LimiterOutcome;
use crate::store::CounterStore;

/// Counts requests against one limit over one rolling succession of
/// fixed windows.
///
/// Every evaluated request is counted, including those past the limit:
/// an over-limit caller keeps pushing its count up for as long as it
/// keeps sending, though the window deadline stays where the first
/// request set it. Exceeding here only marks the outcome; acting on it
/// is the caller's decision.
pub struct SingleWindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl SingleWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Count one request at `key` and report where the window stands.
    ///
    /// A disabled limit skips storage entirely. A stale or absent
    /// counter starts a fresh window at the configured duration; a live
    /// one is incremented and keeps its remaining TTL.
    pub async fn evaluate(&self, key: &str, config: &LimitConfig) -> Result<LimiterOutcome> {
        let limit = match config.limit.value() {
            Some(limit) => limit,
            None => return Ok(LimiterOutcome::unlimited()),
        };

        trace!(
            key = %key,
            limit = limit,
            "Checking window limit"
        );

        let record = self.store.get(key).await?;
        let (count, ttl) = match record.value {
            Some(value) if !record.is_stale => (value + 1, record.ttl),
            _ => {
                debug!(
                    key = %key,
                    limit = limit,
                    window = ?config.window,
                    "Starting new quota window"
                );
                (1, config.window)
            }
        };
        let remaining = limit as i64 - count as i64;

        self.store.set(key, count, ttl).await?;

        let exceeded = remaining < 0;
        if exceeded {
            debug!(
                key = %key,
                count = count,
                limit = limit,
                "Window limit exceeded"
            );
        }

        Ok(LimiterOutcome {
            count,
            remaining,
            ttl,
            exceeded,
        })
    }
}
