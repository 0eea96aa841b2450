// Label set construction for HTTP transactions
//
// Dynamic label names are fixed per metric and always passed in the same
// order. The service name and static labels never vary per request, so they
// are attached once as Prometheus constant labels at registration time.

use std::collections::{BTreeMap, HashMap};

/// Dynamic labels for `requests_total` and `request_duration_seconds`
pub const REQUEST_LABELS: [&str; 3] = ["method", "path", "status_code"];

/// Dynamic labels for `requests_in_progress_total`
pub const IN_PROGRESS_LABELS: [&str; 1] = ["method"];

/// Dynamic labels for `cache_results`
pub const CACHE_LABELS: [&str; 4] = ["method", "path", "status_code", "cache_result"];

/// Name of the label carrying the service name
pub const SERVICE_LABEL: &str = "service";

/// Label names callers may not use as constant labels
pub const RESERVED_LABELS: [&str; 5] = [
    "method",
    "path",
    "status_code",
    "cache_result",
    SERVICE_LABEL,
];

/// `path` value for requests no route matched. Route patterns always start
/// with `/`, so this never collides with a real route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Outcome reported by a response cache through the cache header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResult {
    Hit,
    Miss,
}

impl CacheResult {
    /// Parse a cache header value. Only `hit` and `miss` are recognized.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("hit") {
            Some(CacheResult::Hit)
        } else if value.eq_ignore_ascii_case("miss") {
            Some(CacheResult::Miss)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheResult::Hit => "hit",
            CacheResult::Miss => "miss",
        }
    }
}

/// Labels describing one completed transaction
#[derive(Debug, Clone)]
pub struct TransactionLabels<'a> {
    method: &'a str,
    path: &'a str,
    status: u16,
    status_code: String,
}

impl<'a> TransactionLabels<'a> {
    pub fn new(method: &'a str, path: &'a str, status_code: u16) -> Self {
        Self {
            method,
            path,
            status: status_code,
            status_code: status_code.to_string(),
        }
    }

    /// Values in `REQUEST_LABELS` order
    pub fn request_values(&self) -> [&str; 3] {
        [self.method, self.path, &self.status_code]
    }

    /// Values in `CACHE_LABELS` order
    pub fn cache_values(&self, result: CacheResult) -> [&str; 4] {
        [self.method, self.path, &self.status_code, result.as_str()]
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn status(&self) -> u16 {
        self.status
    }
}

/// Build the constant label set shared by every metric.
///
/// The service label is only attached when no static labels were supplied;
/// static labels take precedence. An empty service name adds nothing.
pub fn constant_labels(
    service_name: &str,
    static_labels: &BTreeMap<String, String>,
) -> HashMap<String, String> {
    if !static_labels.is_empty() {
        return static_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }

    let mut labels = HashMap::new();
    if !service_name.is_empty() {
        labels.insert(SERVICE_LABEL.to_string(), service_name.to_string());
    }
    labels
}
