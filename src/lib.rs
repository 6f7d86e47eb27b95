//! Tollgate - Multi-Window Request Admission
//!
//! This crate decides, per request, whether a caller is still inside its
//! quotas. Three fixed-window limiters run against pluggable expiring
//! counter stores: one per path, one per user, and one per user+path
//! compound key evaluated across up to four time windows with an
//! all-or-nothing commit. Decisions carry quota metadata the host copies
//! onto its responses.
//!
//! The crate is host-agnostic: it never binds a socket or parses HTTP.
//! The embedding server describes each request as a [`RequestContext`],
//! asks the [`RateGate`] for an [`Admission`], and later feeds the
//! snapshot back through [`annotate_reply`].
//!
//! ```no_run
//! use tollgate::{annotate_reply, Admission, HeaderMap, RateGate, Reply};
//! use tollgate::config::Settings;
//! use tollgate::identity::{Principal, RequestContext};
//!
//! # async fn handle() -> tollgate::error::Result<()> {
//! let gate = RateGate::with_memory_stores(Settings::default())?;
//!
//! let request = RequestContext::new("/reports", "203.0.113.9")
//!     .with_principal(Principal::new().with_attribute("id", "alice"));
//!
//! let admission = gate.check_request(&request, None).await?;
//! let mut headers = HeaderMap::new();
//! match &admission {
//!     Admission::Rejected(_) => {
//!         // Answer 429 with the rejection's metadata.
//!         annotate_reply(admission.snapshot(), Reply::Failure(&mut headers));
//!     }
//!     _ => {
//!         // Run the handler, then annotate the outgoing response.
//!         annotate_reply(admission.snapshot(), Reply::Success(&mut headers));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod ratelimit;
pub mod store;
pub mod window;

pub use config::{CompoundOverrides, Limit, RouteOptions, Settings, WindowOverride};
pub use gate::{
    annotate_reply, Admission, GateStores, HeaderMap, QuotaReport, QuotaSnapshot, RateGate,
    Rejection, Reply,
};
pub use identity::{Principal, RequestContext};
pub use store::{CounterRecord, CounterStore, MemoryStore};
pub use window::{SpanMap, TimeSpan};
