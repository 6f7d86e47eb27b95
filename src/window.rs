//! Named time windows and the per-window container used by the
//! compound limiter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A named time span for quota windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSpan {
    /// Per-second windows
    Seconds,
    /// Per-minute windows
    Minutes,
    /// Per-hour windows
    Hours,
    /// Per-day windows
    Days,
}

impl TimeSpan {
    /// Every named span, in evaluation and reporting order.
    pub const ALL: [TimeSpan; 4] = [
        TimeSpan::Seconds,
        TimeSpan::Minutes,
        TimeSpan::Hours,
        TimeSpan::Days,
    ];

    /// The natural duration of one window of this span.
    pub fn duration(&self) -> Duration {
        match self {
            TimeSpan::Seconds => Duration::from_secs(1),
            TimeSpan::Minutes => Duration::from_secs(60),
            TimeSpan::Hours => Duration::from_secs(3600),
            TimeSpan::Days => Duration::from_secs(86400),
        }
    }

    /// Lowercase name of this span, matching its configuration key.
    pub fn label(&self) -> &'static str {
        match self {
            TimeSpan::Seconds => "seconds",
            TimeSpan::Minutes => "minutes",
            TimeSpan::Hours => "hours",
            TimeSpan::Days => "days",
        }
    }

    fn index(self) -> usize {
        match self {
            TimeSpan::Seconds => 0,
            TimeSpan::Minutes => 1,
            TimeSpan::Hours => 2,
            TimeSpan::Days => 3,
        }
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A fixed-size map with one slot per [`TimeSpan`].
///
/// Iteration always follows [`TimeSpan::ALL`] order, which keeps store
/// traffic and reported metadata deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMap<T>([T; 4]);

impl<T> SpanMap<T> {
    /// Build a map by evaluating `f` once per span.
    pub fn from_fn(mut f: impl FnMut(TimeSpan) -> T) -> Self {
        Self([
            f(TimeSpan::Seconds),
            f(TimeSpan::Minutes),
            f(TimeSpan::Hours),
            f(TimeSpan::Days),
        ])
    }

    /// The value stored for `span`.
    pub fn get(&self, span: TimeSpan) -> &T {
        &self.0[span.index()]
    }

    /// Mutable access to the value stored for `span`.
    pub fn get_mut(&mut self, span: TimeSpan) -> &mut T {
        &mut self.0[span.index()]
    }

    /// Iterate spans and values in [`TimeSpan::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (TimeSpan, &T)> {
        TimeSpan::ALL.iter().map(move |&span| (span, self.get(span)))
    }

    /// Build a new map by transforming each span's value.
    pub fn map<U>(&self, mut f: impl FnMut(TimeSpan, &T) -> U) -> SpanMap<U> {
        SpanMap::from_fn(|span| f(span, self.get(span)))
    }
}

impl<T: Default> Default for SpanMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_durations() {
        assert_eq!(TimeSpan::Seconds.duration(), Duration::from_secs(1));
        assert_eq!(TimeSpan::Minutes.duration(), Duration::from_secs(60));
        assert_eq!(TimeSpan::Hours.duration(), Duration::from_secs(3600));
        assert_eq!(TimeSpan::Days.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_span_labels() {
        let labels: Vec<&str> = TimeSpan::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["seconds", "minutes", "hours", "days"]);
    }

    #[test]
    fn test_span_serde_lowercase() {
        assert_eq!(serde_yaml::to_string(&TimeSpan::Minutes).unwrap().trim(), "minutes");
        let span: TimeSpan = serde_yaml::from_str("days").unwrap();
        assert_eq!(span, TimeSpan::Days);
    }

    #[test]
    fn test_span_map_access() {
        let mut map = SpanMap::from_fn(|span| span.duration().as_secs());
        assert_eq!(*map.get(TimeSpan::Hours), 3600);

        *map.get_mut(TimeSpan::Hours) = 7200;
        assert_eq!(*map.get(TimeSpan::Hours), 7200);
    }

    #[test]
    fn test_span_map_iteration_order() {
        let map = SpanMap::from_fn(|span| span.label());
        let order: Vec<TimeSpan> = map.iter().map(|(span, _)| span).collect();
        assert_eq!(order, TimeSpan::ALL);
    }

    #[test]
    fn test_span_map_transform() {
        let durations = SpanMap::from_fn(|span| span.duration());
        let seconds = durations.map(|_, d| d.as_secs());
        assert_eq!(*seconds.get(TimeSpan::Minutes), 60);
        assert_eq!(*seconds.get(TimeSpan::Days), 86400);
    }
}
