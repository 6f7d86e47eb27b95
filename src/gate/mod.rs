//! Admission control: one decision per request.
//!
//! A [`RateGate`] owns the global settings and the three limiters. The
//! host calls [`RateGate::check_request`] before its handler runs and
//! [`annotate_reply`] while shaping the response; everything between is
//! the gate's business. Store handles are supplied at construction, so
//! two gates never share counters by accident.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{RouteOptions, Settings};
use crate::error::Result;
use crate::identity::{CallerIdentity, RequestContext};
use crate::ratelimit::{CompoundOutcome, LimiterOutcome, MultiWindowLimiter, SingleWindowLimiter};
use crate::store::{CounterStore, MemoryStore};
use crate::window::SpanMap;

mod snapshot;

pub use snapshot::{annotate_reply, HeaderMap, QuotaReport, QuotaSnapshot, Reply};

/// Store handles for each limiter, one segment per counter family.
///
/// The path, user, and per-span compound counters never share keyspace;
/// handing each its own store (or segment of a shared one) keeps that
/// isolation explicit.
pub struct GateStores {
    pub path: Arc<dyn CounterStore>,
    pub user: Arc<dyn CounterStore>,
    pub user_path: SpanMap<Arc<dyn CounterStore>>,
}

impl GateStores {
    /// Fresh in-process stores, one [`MemoryStore`] per segment.
    pub fn in_memory() -> Self {
        Self {
            path: Arc::new(MemoryStore::new("tollgate-path")),
            user: Arc::new(MemoryStore::new("tollgate-user")),
            user_path: SpanMap::from_fn(|span| {
                Arc::new(MemoryStore::new(format!("tollgate-user-path-{}", span)))
                    as Arc<dyn CounterStore>
            }),
        }
    }
}

/// The admission decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Under every applicable limit; the snapshot feeds response metadata
    Allowed(QuotaSnapshot),
    /// Over at least one limit; the host should short-circuit
    Rejected(Rejection),
    /// The gate is switched off for this request; nothing was counted
    Disabled,
}

impl Admission {
    /// The quota snapshot, for [`annotate_reply`] at response time.
    pub fn snapshot(&self) -> Option<&QuotaSnapshot> {
        match self {
            Admission::Allowed(snapshot) => Some(snapshot),
            Admission::Rejected(rejection) => Some(&rejection.snapshot),
            Admission::Disabled => None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

/// A rejected request, with the quota state to report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub snapshot: QuotaSnapshot,
}

impl Rejection {
    /// HTTP status the host should answer with.
    pub const STATUS: u16 = 429;

    pub fn message(&self) -> &'static str {
        "Rate limit exceeded"
    }

    /// Metadata fields to attach to the rejection response.
    pub fn header_fields(&self) -> Vec<(&'static str, String)> {
        self.snapshot.header_fields()
    }
}

/// Multi-dimension request admission over expiring counters.
///
/// Three limiters run per request: path (every caller on a route), user
/// (one caller across routes), and user+path (one caller on one route,
/// across up to four windows at once). Any one of them rejecting
/// rejects the request.
pub struct RateGate {
    settings: Settings,
    path: SingleWindowLimiter,
    user: SingleWindowLimiter,
    user_path: MultiWindowLimiter,
}

impl RateGate {
    /// Build a gate over explicit store handles.
    ///
    /// Settings are validated here; route overrides are the host's to
    /// validate when routes are registered, via
    /// [`RouteOptions::validate`].
    pub fn new(settings: Settings, stores: GateStores) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            path: SingleWindowLimiter::new(stores.path),
            user: SingleWindowLimiter::new(stores.user),
            user_path: MultiWindowLimiter::new(stores.user_path),
        })
    }

    /// Build a gate with in-process memory stores.
    pub fn with_memory_stores(settings: Settings) -> Result<Self> {
        Self::new(settings, GateStores::in_memory())
    }

    /// The global settings this gate was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Evaluate one request against every applicable limit.
    ///
    /// The path limiter always counts. The user and compound limiters
    /// are skipped for whitelisted callers, whose counters are never
    /// touched. Store failures abort the evaluation rather than guess
    /// at an answer; the request is neither counted nor admitted.
    pub async fn check_request(
        &self,
        request: &RequestContext,
        route: Option<&RouteOptions>,
    ) -> Result<Admission> {
        let effective = self.settings.for_route(route);
        if !effective.enabled {
            return Ok(Admission::Disabled);
        }

        let identity = CallerIdentity::resolve(request, &effective);
        let whitelisted = effective.is_whitelisted(&identity.address, identity.user.as_deref());
        let subject = identity.subject(effective.address_only);
        let compound_key = format!("{}:{}", subject, request.path);

        let path_config = effective.path_config();
        let user_config = effective.user_config();
        let user_path_configs = effective.user_path_configs();

        let (path, user, user_path) = tokio::try_join!(
            self.path.evaluate(&request.path, &path_config),
            async {
                if whitelisted {
                    Ok(LimiterOutcome::unlimited())
                } else {
                    self.user.evaluate(subject, &user_config).await
                }
            },
            async {
                if whitelisted {
                    Ok(CompoundOutcome::bypass())
                } else {
                    self.user_path.evaluate(&compound_key, &user_path_configs).await
                }
            },
        )?;

        let now_ms = Utc::now().timestamp_millis();
        let snapshot = QuotaSnapshot {
            path: effective
                .path_limit
                .value()
                .map(|limit| report(limit, path.remaining, path.ttl, now_ms)),
            user: if whitelisted {
                None
            } else {
                effective
                    .user_limit
                    .value()
                    .map(|limit| report(limit, user.remaining, user.ttl, now_ms))
            },
            user_path: user_path
                .windows
                .map(|_, window| window.map(|w| report(w.limit, w.remaining, w.ttl, now_ms))),
            headers: effective.headers,
        };

        if path.exceeded || user.exceeded || user_path.exceeded {
            debug!(
                path = %request.path,
                path_exceeded = path.exceeded,
                user_exceeded = user.exceeded,
                compound_exceeded = user_path.exceeded,
                "Request rejected by quota"
            );
            return Ok(Admission::Rejected(Rejection { snapshot }));
        }

        Ok(Admission::Allowed(snapshot))
    }
}

fn report(limit: u64, remaining: i64, ttl: Duration, now_ms: i64) -> QuotaReport {
    QuotaReport {
        limit,
        remaining,
        reset_ms: now_ms + ttl.as_millis() as i64,
    }
}
