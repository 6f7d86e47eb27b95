//! Multi-window coordinator for compound keys.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::LimitConfig;
use crate::error::Result;
use crate::ratelimit::{CompoundOutcome, WindowOutcome};
use crate::store::CounterStore;
use crate::window::{SpanMap, TimeSpan};

/// What one enabled span would do, before anything is written.
struct Tentative {
    limit: u64,
    /// Live stored count from the first pass; `None` when absent or stale
    stored: Option<u64>,
    count: u64,
    remaining: i64,
    ttl: Duration,
}

/// Counts one compound key against every enabled span at once, with an
/// all-or-nothing commit.
///
/// A single exhausted span vetoes the increment for every span on that
/// request: a caller already blocked by a tight window cannot keep
/// inflating the looser windows' counts while it hammers. This is the
/// opposite of the single-window limiter, which always commits.
pub struct MultiWindowLimiter {
    stores: SpanMap<Arc<dyn CounterStore>>,
}

impl MultiWindowLimiter {
    pub fn new(stores: SpanMap<Arc<dyn CounterStore>>) -> Self {
        Self { stores }
    }

    /// Count one request at `key` across all spans enabled in `configs`.
    ///
    /// Each enabled span is read exactly once. If every span still has
    /// room, every counter is written incremented; if any is exhausted,
    /// live counters are written back unchanged and the request is not
    /// counted anywhere. Spans with a disabled limit take no part in
    /// either the veto or the report.
    ///
    /// Reads and writes are not atomic across concurrent callers of the
    /// same key; a racing pair may each commit from the same snapshot.
    /// Fixed-window counting already tolerates that imprecision.
    pub async fn evaluate(
        &self,
        key: &str,
        configs: &SpanMap<LimitConfig>,
    ) -> Result<CompoundOutcome> {
        let mut tentative: SpanMap<Option<Tentative>> = SpanMap::default();
        let mut enabled = 0;

        for span in TimeSpan::ALL {
            let config = configs.get(span);
            let limit = match config.limit.value() {
                Some(limit) => limit,
                None => continue,
            };
            enabled += 1;

            let record = self.stores.get(span).get(key).await?;
            let stored = match record.value {
                Some(value) if !record.is_stale => Some(value),
                _ => None,
            };
            let (count, ttl) = match stored {
                Some(value) => (value + 1, record.ttl),
                None => (1, config.window),
            };
            let remaining = limit as i64 - count as i64;

            trace!(
                key = %key,
                span = %span,
                count = count,
                remaining = remaining,
                "Tentative window count"
            );

            *tentative.get_mut(span) = Some(Tentative {
                limit,
                stored,
                count,
                remaining,
                ttl,
            });
        }

        if enabled == 0 {
            return Ok(CompoundOutcome::bypass());
        }

        let commit = !tentative
            .iter()
            .filter_map(|(_, t)| t.as_ref())
            .any(|t| t.remaining < 0);

        if !commit {
            debug!(
                key = %key,
                "Compound window exhausted, increments vetoed"
            );
        }

        let mut windows: SpanMap<Option<WindowOutcome>> = SpanMap::default();
        for span in TimeSpan::ALL {
            let t = match tentative.get(span) {
                Some(t) => t,
                None => continue,
            };

            if commit {
                self.stores.get(span).set(key, t.count, t.ttl).await?;
                *windows.get_mut(span) = Some(WindowOutcome {
                    limit: t.limit,
                    remaining: t.remaining,
                    ttl: t.ttl,
                });
            } else {
                // Restore what the first pass saw. A span with no live
                // counter is left unwritten; a veto must not create
                // entries for a request that was never counted.
                if let Some(stored) = t.stored {
                    self.stores.get(span).set(key, stored, t.ttl).await?;
                }
                *windows.get_mut(span) = Some(WindowOutcome {
                    limit: t.limit,
                    remaining: t.limit as i64 - t.stored.unwrap_or(0) as i64,
                    ttl: t.ttl,
                });
            }
        }

        Ok(CompoundOutcome {
            exceeded: !commit,
            windows,
        })
    }
}
