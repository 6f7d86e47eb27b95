//! Request identity: who is asking, and from where.
//!
//! The engine never talks to a real network stack. The host hands it a
//! [`RequestContext`] describing one inbound request, and identity
//! resolution turns that into the address and user the limiters key on.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::Settings;

/// One inbound request as seen by the admission engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Route pattern the request matched, e.g. `/users/{id}`
    pub path: String,
    /// Address of the connection's direct origin
    pub remote_addr: String,
    /// Raw forwarding header from an upstream proxy, if present
    pub forwarded_for: Option<String>,
    /// Authenticated principal, if the host authenticated the caller
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            remote_addr: remote_addr.into(),
            forwarded_for: None,
            principal: None,
        }
    }

    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }
}

/// Attributes of an authenticated caller.
///
/// Attributes are structured values, but limiter keys are strings:
/// string attributes are used as-is, numbers and booleans are
/// stringified, and structured values never identify a caller.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    attributes: BTreeMap<String, Value>,
}

impl Principal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute, consuming and returning the principal.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The named attribute rendered as a limiter key, if it can be.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// The resolved identity the limiters key on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Client address, possibly derived from a forwarding header
    pub address: String,
    /// Stringified user attribute, when one resolved
    pub user: Option<String>,
}

impl CallerIdentity {
    /// Resolve the caller of `request` under `settings`.
    ///
    /// When proxies are trusted and a forwarding header is present, a
    /// configured extractor decides alone: its `None` means the direct
    /// origin, never the default parse. Without one, the first
    /// comma-separated entry of the header is taken, trimmed. In every
    /// other case the connection's direct origin is the address.
    pub fn resolve(request: &RequestContext, settings: &Settings) -> Self {
        let address = if settings.trust_proxy {
            request
                .forwarded_for
                .as_deref()
                .and_then(|header| resolve_forwarded(header, settings))
                .unwrap_or_else(|| request.remote_addr.clone())
        } else {
            request.remote_addr.clone()
        };

        let user = request
            .principal
            .as_ref()
            .and_then(|p| p.attribute(&settings.user_attribute));

        Self { address, user }
    }

    /// The key user-scoped limiters count against.
    ///
    /// Anonymous callers are keyed by address; `address_only` forces
    /// that even for authenticated ones.
    pub fn subject(&self, address_only: bool) -> &str {
        if address_only {
            return &self.address;
        }
        self.user.as_deref().unwrap_or(&self.address)
    }
}

fn resolve_forwarded(header: &str, settings: &Settings) -> Option<String> {
    if let Some(extractor) = &settings.proxy_address_extractor {
        return extractor(header);
    }
    header
        .split(',')
        .next()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_direct_address_when_proxy_untrusted() {
        let settings = Settings::default();
        let request = RequestContext::new("/", "10.0.0.1")
            .with_forwarded_for("203.0.113.9, 10.0.0.1");

        let identity = CallerIdentity::resolve(&request, &settings);
        assert_eq!(identity.address, "10.0.0.1");
    }

    #[test]
    fn test_forwarded_first_entry_when_trusted() {
        let mut settings = Settings::default();
        settings.trust_proxy = true;
        let request = RequestContext::new("/", "10.0.0.1")
            .with_forwarded_for(" 203.0.113.9 , 10.0.0.1");

        let identity = CallerIdentity::resolve(&request, &settings);
        assert_eq!(identity.address, "203.0.113.9");
    }

    #[test]
    fn test_custom_extractor_takes_precedence() {
        let mut settings = Settings::default();
        settings.trust_proxy = true;
        settings.proxy_address_extractor = Some(Arc::new(|header: &str| {
            header.split(',').nth(1).map(|s| s.trim().to_string())
        }));
        let request = RequestContext::new("/", "10.0.0.1")
            .with_forwarded_for("203.0.113.9, 198.51.100.2");

        let identity = CallerIdentity::resolve(&request, &settings);
        assert_eq!(identity.address, "198.51.100.2");
    }

    #[test]
    fn test_extractor_decline_falls_back_to_direct_origin() {
        let mut settings = Settings::default();
        settings.trust_proxy = true;
        settings.proxy_address_extractor = Some(Arc::new(|_: &str| None));
        let request = RequestContext::new("/", "10.0.0.1")
            .with_forwarded_for("203.0.113.9, 198.51.100.2");

        let identity = CallerIdentity::resolve(&request, &settings);
        assert_eq!(identity.address, "10.0.0.1");
    }

    #[test]
    fn test_missing_header_falls_back_to_remote_addr() {
        let mut settings = Settings::default();
        settings.trust_proxy = true;
        let request = RequestContext::new("/", "10.0.0.1");

        let identity = CallerIdentity::resolve(&request, &settings);
        assert_eq!(identity.address, "10.0.0.1");
    }

    #[test]
    fn test_user_attribute_stringification() {
        let settings = Settings::default();

        let request = RequestContext::new("/", "10.0.0.1")
            .with_principal(Principal::new().with_attribute("id", "alice"));
        assert_eq!(
            CallerIdentity::resolve(&request, &settings).user.as_deref(),
            Some("alice")
        );

        let request = RequestContext::new("/", "10.0.0.1")
            .with_principal(Principal::new().with_attribute("id", 42));
        assert_eq!(
            CallerIdentity::resolve(&request, &settings).user.as_deref(),
            Some("42")
        );

        let request = RequestContext::new("/", "10.0.0.1").with_principal(
            Principal::new().with_attribute("id", serde_json::json!({"nested": true})),
        );
        assert_eq!(CallerIdentity::resolve(&request, &settings).user, None);
    }

    #[test]
    fn test_custom_user_attribute() {
        let mut settings = Settings::default();
        settings.user_attribute = "email".to_string();

        let request = RequestContext::new("/", "10.0.0.1").with_principal(
            Principal::new()
                .with_attribute("id", "alice")
                .with_attribute("email", "alice@example.com"),
        );
        assert_eq!(
            CallerIdentity::resolve(&request, &settings).user.as_deref(),
            Some("alice@example.com")
        );
    }

    #[test]
    fn test_subject_selection() {
        let identity = CallerIdentity {
            address: "10.0.0.1".to_string(),
            user: Some("alice".to_string()),
        };
        assert_eq!(identity.subject(false), "alice");
        assert_eq!(identity.subject(true), "10.0.0.1");

        let anonymous = CallerIdentity {
            address: "10.0.0.1".to_string(),
            user: None,
        };
        assert_eq!(anonymous.subject(false), "10.0.0.1");
    }
}
