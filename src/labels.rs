//! Metric label types and request attribute derivation
//!
//! Label keys are a closed enum so every sink sees the same bounded key set,
//! regardless of which optional labels a given observation carries.

use axum::http::{Request, Version, header::HOST};
use std::fmt;

/// Request extension marking a connection that was accepted over TLS
///
/// A TLS acceptor in front of the router inserts this into the request
/// extensions. Its presence makes the scheme label `https`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsConnection;

/// Label keys attached to HTTP server metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKey {
    /// URI scheme, `http` or `https`
    Scheme,
    /// Host the request was addressed to
    Host,
    /// Protocol flavor (`1.0`, `1.1`, `2`)
    Flavor,
    /// Request method
    Method,
    /// Response status code
    StatusCode,
    /// Error text captured while writing the response
    ErrorMessage,
}

impl LabelKey {
    /// Every key, in the order labels are derived
    pub const ALL: [LabelKey; 6] = [
        LabelKey::Scheme,
        LabelKey::Host,
        LabelKey::Flavor,
        LabelKey::Method,
        LabelKey::StatusCode,
        LabelKey::ErrorMessage,
    ];

    /// Canonical dotted key name
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKey::Scheme => "http.scheme",
            LabelKey::Host => "http.host",
            LabelKey::Flavor => "http.flavor",
            LabelKey::Method => "http.method",
            LabelKey::StatusCode => "http.status",
            LabelKey::ErrorMessage => "http.error",
        }
    }

    /// Key name restricted to the Prometheus label charset
    pub fn prometheus_name(&self) -> &'static str {
        match self {
            LabelKey::Scheme => "http_scheme",
            LabelKey::Host => "http_host",
            LabelKey::Flavor => "http_flavor",
            LabelKey::Method => "http_method",
            LabelKey::StatusCode => "http_status",
            LabelKey::ErrorMessage => "http_error",
        }
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar label value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Str(s) => f.write_str(s),
            LabelValue::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Str(value.to_string())
    }
}

impl From<u16> for LabelValue {
    fn from(value: u16) -> Self {
        LabelValue::Int(i64::from(value))
    }
}

/// Ordered set of labels attached to one counter observation
///
/// Keys are unique within a set. Extending a set with [`LabelSet::with`]
/// yields a new set and leaves the original untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<(LabelKey, LabelValue)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this set with `key` set to `value`
    ///
    /// An existing entry for `key` keeps its position and takes the new value.
    pub fn with(&self, key: LabelKey, value: impl Into<LabelValue>) -> Self {
        let mut next = self.clone();
        next.insert(key, value.into());
        next
    }

    fn insert(&mut self, key: LabelKey, value: LabelValue) {
        match self.labels.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.labels.push((key, value)),
        }
    }

    pub fn get(&self, key: LabelKey) -> Option<&LabelValue> {
        self.labels
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: LabelKey) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelKey, &LabelValue)> {
        self.labels.iter().map(|(k, v)| (*k, v))
    }

    pub fn keys(&self) -> Vec<LabelKey> {
        self.labels.iter().map(|(k, _)| *k).collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Protocol flavor label for an HTTP version
///
/// Returns `None` for versions whose major number is neither 1 nor 2.
pub fn flavor(version: Version) -> Option<&'static str> {
    match version {
        Version::HTTP_10 => Some("1.0"),
        Version::HTTP_11 => Some("1.1"),
        Version::HTTP_2 => Some("2"),
        _ => None,
    }
}

/// Derive the base label set (scheme, host, flavor) from a request
///
/// Never fails. Attributes that are absent are left out of the set.
pub fn http_basic_attributes<B>(request: &Request<B>) -> LabelSet {
    let mut labels = LabelSet::new();

    let tls = request.extensions().get::<TlsConnection>().is_some()
        || request.uri().scheme_str() == Some("https");
    labels.insert(
        LabelKey::Scheme,
        LabelValue::from(if tls { "https" } else { "http" }),
    );

    // HTTP/2 carries the authority in the URI, HTTP/1.x in the Host header
    let host = request
        .uri()
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|v| v.to_str().ok()))
        .filter(|host| !host.is_empty());
    if let Some(host) = host {
        labels.insert(LabelKey::Host, LabelValue::from(host));
    }

    if let Some(flavor) = flavor(request.version()) {
        labels.insert(LabelKey::Flavor, LabelValue::from(flavor));
    }

    labels
}
