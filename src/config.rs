//! Configuration management for the tollgate engine.
//!
//! Settings deserialize from YAML with every field optional; route-level
//! overrides merge over the global settings per request. Invalid values
//! are rejected when the configuration is loaded, never at request time.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::window::{SpanMap, TimeSpan};

/// A request limit: either a maximum count per window, or disabled.
///
/// In YAML a limit is written as an integer or as `false`; any other
/// value is a load-time error. `Count(0)` is valid and rejects every
/// counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// The limiter is not evaluated and contributes nothing to decisions.
    Disabled,
    /// Maximum requests allowed inside one window.
    Count(u64),
}

impl Limit {
    /// Whether this limiter is switched off.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Limit::Disabled)
    }

    /// The configured count, if enabled.
    pub fn value(&self) -> Option<u64> {
        match self {
            Limit::Disabled => None,
            Limit::Count(n) => Some(*n),
        }
    }
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Disabled
    }
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Limit::Disabled => serializer.serialize_bool(false),
            Limit::Count(n) => serializer.serialize_u64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u64),
            Flag(bool),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Limit::Count(n)),
            Repr::Flag(false) => Ok(Limit::Disabled),
            Repr::Flag(true) => Err(serde::de::Error::custom(
                "limit must be a request count or `false` to disable",
            )),
        }
    }
}

/// A limit together with the window duration it applies over.
///
/// This is the per-evaluation view handed to the limiters; it is
/// assembled from [`Settings`] after route overrides are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in the window
    pub limit: Limit,
    /// Duration of a fresh window
    pub window: Duration,
}

/// Caller-supplied hook deriving the client address from a proxy
/// forwarding header. Returning `None` falls back to the connection's
/// direct origin.
pub type AddressExtractor = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Per-span settings for the compound (user+path) limiter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Requests allowed per window; `false` disables this span
    #[serde(default)]
    pub limit: Limit,

    /// Window duration override in milliseconds; defaults to the span's
    /// natural duration
    #[serde(default)]
    pub window_ms: Option<u64>,
}

/// Compound limiter settings, one record per named span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundSettings {
    #[serde(default)]
    pub seconds: WindowSettings,
    #[serde(default)]
    pub minutes: WindowSettings,
    #[serde(default)]
    pub hours: WindowSettings,
    #[serde(default)]
    pub days: WindowSettings,
}

impl CompoundSettings {
    /// The settings record for `span`.
    pub fn get(&self, span: TimeSpan) -> &WindowSettings {
        match span {
            TimeSpan::Seconds => &self.seconds,
            TimeSpan::Minutes => &self.minutes,
            TimeSpan::Hours => &self.hours,
            TimeSpan::Days => &self.days,
        }
    }

    fn get_mut(&mut self, span: TimeSpan) -> &mut WindowSettings {
        match span {
            TimeSpan::Seconds => &mut self.seconds,
            TimeSpan::Minutes => &mut self.minutes,
            TimeSpan::Hours => &mut self.hours,
            TimeSpan::Days => &mut self.days,
        }
    }

    /// Resolve every span into its effective limit and window duration.
    pub fn limit_configs(&self) -> SpanMap<LimitConfig> {
        SpanMap::from_fn(|span| {
            let settings = self.get(span);
            LimitConfig {
                limit: settings.limit,
                window: settings
                    .window_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| span.duration()),
            }
        })
    }
}

/// Global configuration for the tollgate engine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch; disabled means requests are never evaluated
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Key user-scoped limiters by address even for authenticated callers
    #[serde(default)]
    pub address_only: bool,

    /// Whether quota state is reported through response metadata
    #[serde(default = "default_headers")]
    pub headers: bool,

    /// Addresses exempt from the user and compound limiters
    #[serde(default)]
    pub address_whitelist: Vec<String>,

    /// Users exempt from the user and compound limiters
    #[serde(default)]
    pub user_whitelist: Vec<String>,

    /// Derive the caller address from the proxy forwarding header
    #[serde(default)]
    pub trust_proxy: bool,

    /// Custom forwarding-header parser; not expressible in config files
    #[serde(skip)]
    pub proxy_address_extractor: Option<AddressExtractor>,

    /// Principal attribute that identifies the caller
    #[serde(default = "default_user_attribute")]
    pub user_attribute: String,

    /// Per-path limit
    #[serde(default = "default_path_limit")]
    pub path_limit: Limit,

    /// Per-path window duration in milliseconds
    #[serde(default = "default_path_window_ms")]
    pub path_window_ms: u64,

    /// Per-user limit
    #[serde(default = "default_user_limit")]
    pub user_limit: Limit,

    /// Per-user window duration in milliseconds
    #[serde(default = "default_user_window_ms")]
    pub user_window_ms: u64,

    /// Compound user+path limits, one per named span
    #[serde(default)]
    pub user_path: CompoundSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            address_only: false,
            headers: default_headers(),
            address_whitelist: Vec::new(),
            user_whitelist: Vec::new(),
            trust_proxy: false,
            proxy_address_extractor: None,
            user_attribute: default_user_attribute(),
            path_limit: default_path_limit(),
            path_window_ms: default_path_window_ms(),
            user_limit: default_user_limit(),
            user_window_ms: default_user_window_ms(),
            user_path: CompoundSettings::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("enabled", &self.enabled)
            .field("address_only", &self.address_only)
            .field("headers", &self.headers)
            .field("address_whitelist", &self.address_whitelist)
            .field("user_whitelist", &self.user_whitelist)
            .field("trust_proxy", &self.trust_proxy)
            .field(
                "proxy_address_extractor",
                &self.proxy_address_extractor.as_ref().map(|_| "<fn>"),
            )
            .field("user_attribute", &self.user_attribute)
            .field("path_limit", &self.path_limit)
            .field("path_window_ms", &self.path_window_ms)
            .field("user_limit", &self.user_limit)
            .field("user_window_ms", &self.user_window_ms)
            .field("user_path", &self.user_path)
            .finish()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_headers() -> bool {
    true
}

fn default_user_attribute() -> String {
    "id".to_string()
}

fn default_path_limit() -> Limit {
    Limit::Count(50)
}

fn default_path_window_ms() -> u64 {
    60 * 1000 // 1 minute
}

fn default_user_limit() -> Limit {
    Limit::Count(300)
}

fn default_user_window_ms() -> u64 {
    10 * 60 * 1000 // 10 minutes
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load settings from a YAML string, validating them.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that cannot be enforced at request time.
    pub fn validate(&self) -> Result<()> {
        if self.path_window_ms == 0 {
            return Err(GateError::Config("path window must be non-zero".into()));
        }
        if self.user_window_ms == 0 {
            return Err(GateError::Config("user window must be non-zero".into()));
        }
        for span in TimeSpan::ALL {
            if self.user_path.get(span).window_ms == Some(0) {
                return Err(GateError::Config(format!(
                    "user+path window for {} must be non-zero",
                    span
                )));
            }
        }
        if self.user_attribute.is_empty() {
            return Err(GateError::Config("user attribute must be non-empty".into()));
        }
        Ok(())
    }

    /// The path limiter's effective limit and window.
    pub fn path_config(&self) -> LimitConfig {
        LimitConfig {
            limit: self.path_limit,
            window: Duration::from_millis(self.path_window_ms),
        }
    }

    /// The user limiter's effective limit and window.
    pub fn user_config(&self) -> LimitConfig {
        LimitConfig {
            limit: self.user_limit,
            window: Duration::from_millis(self.user_window_ms),
        }
    }

    /// Effective per-span limits and windows for the compound limiter.
    pub fn user_path_configs(&self) -> SpanMap<LimitConfig> {
        self.user_path.limit_configs()
    }

    /// Whether the caller is exempt from user-scoped limiting.
    pub fn is_whitelisted(&self, address: &str, user: Option<&str>) -> bool {
        self.address_whitelist.iter().any(|a| a == address)
            || user.map_or(false, |u| self.user_whitelist.iter().any(|w| w == u))
    }

    /// Merge route-level overrides over these settings.
    ///
    /// Overrides replace values field by field, with one exception: a
    /// limiter whose global limit is disabled stays disabled. Routes may
    /// tighten, loosen, or switch off limiters, but cannot bring a
    /// globally-off limiter back, since its counters were never
    /// provisioned for the rest of the routing table.
    pub fn merged_with(&self, route: &RouteOptions) -> Settings {
        let mut merged = self.clone();

        if let Some(enabled) = route.enabled {
            merged.enabled = enabled;
        }
        if let Some(address_only) = route.address_only {
            merged.address_only = address_only;
        }
        if let Some(headers) = route.headers {
            merged.headers = headers;
        }
        if let Some(trust_proxy) = route.trust_proxy {
            merged.trust_proxy = trust_proxy;
        }
        if let Some(ref attr) = route.user_attribute {
            merged.user_attribute = attr.clone();
        }
        if let Some(ref whitelist) = route.address_whitelist {
            merged.address_whitelist = whitelist.clone();
        }
        if let Some(ref whitelist) = route.user_whitelist {
            merged.user_whitelist = whitelist.clone();
        }
        if let Some(ref extractor) = route.proxy_address_extractor {
            merged.proxy_address_extractor = Some(Arc::clone(extractor));
        }

        merged.path_limit = merge_limit(self.path_limit, route.path_limit);
        if let Some(window_ms) = route.path_window_ms {
            merged.path_window_ms = window_ms;
        }
        merged.user_limit = merge_limit(self.user_limit, route.user_limit);
        if let Some(window_ms) = route.user_window_ms {
            merged.user_window_ms = window_ms;
        }

        for span in TimeSpan::ALL {
            let global = self.user_path.get(span);
            let over = route.user_path.get(span);
            let merged_span = merged.user_path.get_mut(span);
            merged_span.limit = merge_limit(global.limit, over.limit);
            if let Some(window_ms) = over.window_ms {
                merged_span.window_ms = Some(window_ms);
            }
        }

        merged
    }

    /// Effective settings for a request, borrowing when no route
    /// overrides apply.
    pub fn for_route<'a>(&'a self, route: Option<&RouteOptions>) -> Cow<'a, Settings> {
        match route {
            None => Cow::Borrowed(self),
            Some(options) => Cow::Owned(self.merged_with(options)),
        }
    }
}

fn merge_limit(global: Limit, route: Option<Limit>) -> Limit {
    if global.is_disabled() {
        return Limit::Disabled;
    }
    route.unwrap_or(global)
}

/// Route-level overrides; every field is optional and falls back to the
/// global [`Settings`].
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RouteOptions {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub address_only: Option<bool>,
    #[serde(default)]
    pub headers: Option<bool>,
    #[serde(default)]
    pub trust_proxy: Option<bool>,
    #[serde(skip)]
    pub proxy_address_extractor: Option<AddressExtractor>,
    #[serde(default)]
    pub user_attribute: Option<String>,
    #[serde(default)]
    pub address_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub user_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub path_limit: Option<Limit>,
    #[serde(default)]
    pub path_window_ms: Option<u64>,
    #[serde(default)]
    pub user_limit: Option<Limit>,
    #[serde(default)]
    pub user_window_ms: Option<u64>,
    #[serde(default)]
    pub user_path: CompoundOverrides,
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("enabled", &self.enabled)
            .field("address_only", &self.address_only)
            .field("headers", &self.headers)
            .field("trust_proxy", &self.trust_proxy)
            .field(
                "proxy_address_extractor",
                &self.proxy_address_extractor.as_ref().map(|_| "<fn>"),
            )
            .field("user_attribute", &self.user_attribute)
            .field("address_whitelist", &self.address_whitelist)
            .field("user_whitelist", &self.user_whitelist)
            .field("path_limit", &self.path_limit)
            .field("path_window_ms", &self.path_window_ms)
            .field("user_limit", &self.user_limit)
            .field("user_window_ms", &self.user_window_ms)
            .field("user_path", &self.user_path)
            .finish()
    }
}

impl RouteOptions {
    /// Reject override values that cannot be enforced at request time.
    pub fn validate(&self) -> Result<()> {
        if self.path_window_ms == Some(0) || self.user_window_ms == Some(0) {
            return Err(GateError::Config("route window must be non-zero".into()));
        }
        for span in TimeSpan::ALL {
            if self.user_path.get(span).window_ms == Some(0) {
                return Err(GateError::Config(format!(
                    "route user+path window for {} must be non-zero",
                    span
                )));
            }
        }
        if self.user_attribute.as_deref() == Some("") {
            return Err(GateError::Config("user attribute must be non-empty".into()));
        }
        Ok(())
    }
}

/// Per-span override for the compound limiter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowOverride {
    #[serde(default)]
    pub limit: Option<Limit>,
    #[serde(default)]
    pub window_ms: Option<u64>,
}

/// Compound limiter overrides, one optional record per named span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundOverrides {
    #[serde(default)]
    pub seconds: WindowOverride,
    #[serde(default)]
    pub minutes: WindowOverride,
    #[serde(default)]
    pub hours: WindowOverride,
    #[serde(default)]
    pub days: WindowOverride,
}

impl CompoundOverrides {
    /// The override record for `span`.
    pub fn get(&self, span: TimeSpan) -> &WindowOverride {
        match span {
            TimeSpan::Seconds => &self.seconds,
            TimeSpan::Minutes => &self.minutes,
            TimeSpan::Hours => &self.hours,
            TimeSpan::Days => &self.days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert!(settings.headers);
        assert!(!settings.address_only);
        assert!(!settings.trust_proxy);
        assert_eq!(settings.user_attribute, "id");
        assert_eq!(settings.path_limit, Limit::Count(50));
        assert_eq!(settings.path_window_ms, 60_000);
        assert_eq!(settings.user_limit, Limit::Count(300));
        assert_eq!(settings.user_window_ms, 600_000);
        for span in TimeSpan::ALL {
            assert!(settings.user_path.get(span).limit.is_disabled());
        }
    }

    #[test]
    fn test_parse_limit_values() {
        let settings = Settings::from_yaml("path_limit: false").unwrap();
        assert!(settings.path_limit.is_disabled());

        let settings = Settings::from_yaml("path_limit: 10").unwrap();
        assert_eq!(settings.path_limit, Limit::Count(10));

        let err = Settings::from_yaml("path_limit: true").unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_parse_compound_settings() {
        let yaml = r#"
user_path:
  minutes:
    limit: 2
  seconds:
    limit: 50
    window_ms: 2000
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let configs = settings.user_path_configs();
        assert_eq!(configs.get(TimeSpan::Minutes).limit, Limit::Count(2));
        assert_eq!(configs.get(TimeSpan::Minutes).window, Duration::from_secs(60));
        assert_eq!(configs.get(TimeSpan::Seconds).window, Duration::from_secs(2));
        assert!(configs.get(TimeSpan::Hours).limit.is_disabled());
    }

    #[test]
    fn test_validate_rejects_zero_windows() {
        let mut settings = Settings::default();
        settings.path_window_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.user_path.hours.window_ms = Some(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_user_attribute() {
        let mut settings = Settings::default();
        settings.user_attribute = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_route_merge_replaces_values() {
        let settings = Settings::default();
        let route = RouteOptions {
            path_limit: Some(Limit::Count(5)),
            headers: Some(false),
            address_only: Some(true),
            ..RouteOptions::default()
        };

        let merged = settings.merged_with(&route);
        assert_eq!(merged.path_limit, Limit::Count(5));
        assert!(!merged.headers);
        assert!(merged.address_only);
        // Untouched fields keep the global values.
        assert_eq!(merged.user_limit, Limit::Count(300));
    }

    #[test]
    fn test_route_merge_can_disable_but_not_reenable() {
        let mut settings = Settings::default();
        settings.user_limit = Limit::Disabled;

        // A route cannot re-enable a globally disabled limiter.
        let route = RouteOptions {
            user_limit: Some(Limit::Count(10)),
            ..RouteOptions::default()
        };
        assert!(settings.merged_with(&route).user_limit.is_disabled());

        // A route can disable an enabled one.
        let route = RouteOptions {
            path_limit: Some(Limit::Disabled),
            ..RouteOptions::default()
        };
        assert!(settings.merged_with(&route).path_limit.is_disabled());
    }

    #[test]
    fn test_route_merge_compound_spans() {
        let mut settings = Settings::default();
        settings.user_path.minutes.limit = Limit::Count(10);

        let route = RouteOptions {
            user_path: CompoundOverrides {
                minutes: WindowOverride {
                    limit: Some(Limit::Count(2)),
                    window_ms: Some(500),
                },
                // Globally disabled spans stay disabled.
                hours: WindowOverride {
                    limit: Some(Limit::Count(9)),
                    window_ms: None,
                },
                ..CompoundOverrides::default()
            },
            ..RouteOptions::default()
        };

        let merged = settings.merged_with(&route);
        assert_eq!(merged.user_path.minutes.limit, Limit::Count(2));
        assert_eq!(merged.user_path.minutes.window_ms, Some(500));
        assert!(merged.user_path.hours.limit.is_disabled());
    }

    #[test]
    fn test_for_route_borrows_without_overrides() {
        let settings = Settings::default();
        assert!(matches!(settings.for_route(None), Cow::Borrowed(_)));

        let route = RouteOptions::default();
        assert!(matches!(settings.for_route(Some(&route)), Cow::Owned(_)));
    }

    #[test]
    fn test_route_options_validate() {
        let route = RouteOptions {
            path_window_ms: Some(0),
            ..RouteOptions::default()
        };
        assert!(route.validate().is_err());

        let route = RouteOptions {
            user_attribute: Some(String::new()),
            ..RouteOptions::default()
        };
        assert!(route.validate().is_err());
    }
}
