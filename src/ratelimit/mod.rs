//! Fixed-window rate limiting over expiring counters.

mod multi;
mod outcome;
mod single;

pub use multi::MultiWindowLimiter;
pub use outcome::{CompoundOutcome, LimiterOutcome, WindowOutcome};
pub use single::SingleWindowLimiter;
