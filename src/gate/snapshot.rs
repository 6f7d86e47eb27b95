//! Quota snapshots and response metadata.
//!
//! The gate captures quota state once, at evaluation time, into a
//! [`QuotaSnapshot`]. When the host later assembles its response it
//! hands the snapshot back through [`annotate_reply`], which copies the
//! metadata onto whichever header container the response kind uses.
//! Reset times are fixed when the snapshot is taken, not recomputed.

use std::collections::BTreeMap;

use crate::window::{SpanMap, TimeSpan};

/// Reported quota state for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaReport {
    /// Configured limit for the window
    pub limit: u64,
    /// Requests left; negative once over
    pub remaining: i64,
    /// Epoch milliseconds at which the window resets
    pub reset_ms: i64,
}

/// Quota state for one request across every limiter.
///
/// A `None` report means that limiter did not apply to the request,
/// because its limit is disabled or the caller is whitelisted; its
/// fields are then omitted from responses entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub path: Option<QuotaReport>,
    pub user: Option<QuotaReport>,
    pub user_path: SpanMap<Option<QuotaReport>>,
    /// Whether metadata emission is enabled for this request
    pub headers: bool,
}

/// Response header fields, keyed by canonical field name.
pub type HeaderMap = BTreeMap<&'static str, String>;

/// The outgoing response's header container, by response kind.
pub enum Reply<'a> {
    Success(&'a mut HeaderMap),
    Failure(&'a mut HeaderMap),
}

const PATH_FIELDS: (&str, &str, &str) = (
    "X-RateLimit-PathLimit",
    "X-RateLimit-PathRemaining",
    "X-RateLimit-PathReset",
);

const USER_FIELDS: (&str, &str, &str) = (
    "X-RateLimit-UserLimit",
    "X-RateLimit-UserRemaining",
    "X-RateLimit-UserReset",
);

fn span_fields(span: TimeSpan) -> (&'static str, &'static str, &'static str) {
    match span {
        TimeSpan::Seconds => (
            "X-RateLimit-UserPathLimit-Seconds",
            "X-RateLimit-UserPathRemaining-Seconds",
            "X-RateLimit-UserPathReset-Seconds",
        ),
        TimeSpan::Minutes => (
            "X-RateLimit-UserPathLimit-Minutes",
            "X-RateLimit-UserPathRemaining-Minutes",
            "X-RateLimit-UserPathReset-Minutes",
        ),
        TimeSpan::Hours => (
            "X-RateLimit-UserPathLimit-Hours",
            "X-RateLimit-UserPathRemaining-Hours",
            "X-RateLimit-UserPathReset-Hours",
        ),
        TimeSpan::Days => (
            "X-RateLimit-UserPathLimit-Days",
            "X-RateLimit-UserPathRemaining-Days",
            "X-RateLimit-UserPathReset-Days",
        ),
    }
}

impl QuotaSnapshot {
    /// Every metadata field this snapshot emits, in reporting order.
    ///
    /// Empty when header emission is disabled for the request.
    pub fn header_fields(&self) -> Vec<(&'static str, String)> {
        if !self.headers {
            return Vec::new();
        }

        let mut fields = Vec::new();
        push_report(&mut fields, PATH_FIELDS, self.path.as_ref());
        push_report(&mut fields, USER_FIELDS, self.user.as_ref());
        for (span, report) in self.user_path.iter() {
            push_report(&mut fields, span_fields(span), report.as_ref());
        }
        fields
    }
}

fn push_report(
    fields: &mut Vec<(&'static str, String)>,
    names: (&'static str, &'static str, &'static str),
    report: Option<&QuotaReport>,
) {
    if let Some(report) = report {
        fields.push((names.0, report.limit.to_string()));
        fields.push((names.1, report.remaining.to_string()));
        fields.push((names.2, report.reset_ms.to_string()));
    }
}

/// Copy quota metadata onto an outgoing response.
///
/// Both response kinds receive the full set of fields. With no snapshot
/// (admission never evaluated the request) the response is left alone.
pub fn annotate_reply(snapshot: Option<&QuotaSnapshot>, reply: Reply<'_>) {
    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => return,
    };

    let headers = match reply {
        Reply::Success(headers) => headers,
        Reply::Failure(headers) => headers,
    };
    for (name, value) in snapshot.header_fields() {
        headers.insert(name, value);
    }
}
