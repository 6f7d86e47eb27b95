//! Limiter evaluation results.

use std::time::Duration;

use crate::window::SpanMap;

/// Result of evaluating one single-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterOutcome {
    /// Count after this request, as written to the store
    pub count: u64,
    /// Requests left in the window; negative once over the limit
    pub remaining: i64,
    /// Time until the window resets
    pub ttl: Duration,
    /// Whether this request pushed the count past the limit
    pub exceeded: bool,
}

impl LimiterOutcome {
    /// Outcome of a limiter that did not evaluate the request.
    pub fn unlimited() -> Self {
        Self {
            count: 0,
            remaining: 1,
            ttl: Duration::ZERO,
            exceeded: false,
        }
    }
}

/// Per-span result inside a compound evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// The span's configured limit
    pub limit: u64,
    /// Requests left in the span's window; negative once over
    pub remaining: i64,
    /// Time until the span's window resets
    pub ttl: Duration,
}

/// Result of evaluating a compound limiter across all of its spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundOutcome {
    /// Whether any span vetoed the request
    pub exceeded: bool,
    /// One outcome per span; `None` where the span is disabled
    pub windows: SpanMap<Option<WindowOutcome>>,
}

impl CompoundOutcome {
    /// Outcome of a compound limiter that did not evaluate the request.
    pub fn bypass() -> Self {
        Self {
            exceeded: false,
            windows: SpanMap::default(),
        }
    }
}
