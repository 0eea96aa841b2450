// Metrics module - HTTP request instrumentation backed by Prometheus
//
// One `HttpMetrics` instance per service. It owns the four HTTP metrics,
// the filter policy, the cache header name and the gatherer used by the
// exposition endpoint. Clones share all of that state.

pub mod filter;
pub mod labels;
pub mod registry;

use http::header::HeaderName;
use http::HeaderMap;
use parking_lot::RwLock;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};
use filter::{FilterPolicy, PathDecision};
use labels::{constant_labels, CacheResult, TransactionLabels};
use registry::{CoreMetrics, MetricNames, MetricsGatherer, Registerer};

/// Header consulted for cache hit/miss signaling unless overridden
pub const DEFAULT_CACHE_HEADER: &str = "X-Cache";

/// Subsystem used by the short constructors
pub const DEFAULT_SUBSYSTEM: &str = "http";

/// HTTP request metrics for one service
///
/// Cheap to clone; the middleware layer and the exposition endpoint each
/// hold a clone.
#[derive(Clone)]
pub struct HttpMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    service_name: String,
    metrics: CoreMetrics,
    filter: FilterPolicy,
    cache_header: RwLock<HeaderName>,
    gatherer: MetricsGatherer,
}

impl HttpMetrics {
    /// Metrics for `service_name` on a fresh private registry, with the
    /// default `http` subsystem and no namespace.
    ///
    /// # Panics
    ///
    /// Panics if the metrics cannot be registered.
    pub fn new(service_name: &str) -> Self {
        Self::builder().service_name(service_name).build_or_panic()
    }

    /// Like [`HttpMetrics::new`] with a custom namespace and subsystem.
    ///
    /// # Panics
    ///
    /// Panics if the metrics cannot be registered.
    pub fn with_namespace(service_name: &str, namespace: &str, subsystem: &str) -> Self {
        Self::builder()
            .service_name(service_name)
            .namespace(namespace)
            .subsystem(subsystem)
            .build_or_panic()
    }

    /// Metrics carrying static labels instead of a service label.
    ///
    /// # Panics
    ///
    /// Panics if the metrics cannot be registered.
    pub fn with_labels<I, K, V>(const_labels: I, namespace: &str, subsystem: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::builder()
            .const_labels(const_labels)
            .namespace(namespace)
            .subsystem(subsystem)
            .build_or_panic()
    }

    /// Metrics registered on a caller-supplied registry.
    ///
    /// If `registry` cannot read back its metrics, the exposition endpoint
    /// serves the process-wide default registry instead.
    ///
    /// # Panics
    ///
    /// Panics if the metrics cannot be registered, e.g. because the same
    /// names were already registered on `registry`.
    pub fn with_registry<R>(
        registry: R,
        service_name: &str,
        namespace: &str,
        subsystem: &str,
        const_labels: Option<BTreeMap<String, String>>,
    ) -> Self
    where
        R: Registerer + 'static,
    {
        Self::builder()
            .registry(registry)
            .service_name(service_name)
            .namespace(namespace)
            .subsystem(subsystem)
            .const_labels(const_labels.unwrap_or_default())
            .build_or_panic()
    }

    /// Build an instance from configuration, registering on a fresh registry
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .service_name(&config.service_name)
            .namespace(&config.namespace)
            .subsystem(&config.subsystem)
            .const_labels(config.const_labels.clone())
            .skip_paths(config.skip_paths.iter().cloned())
            .ignore_status_codes(config.ignore_status_codes.iter().copied())
            .cache_header(&config.cache_header)
            .build()
    }

    pub fn builder() -> HttpMetricsBuilder {
        HttpMetricsBuilder::default()
    }

    /// Add paths excluded from all instrumentation. Repeated calls accumulate.
    pub fn set_skip_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.inner.filter.add_skip_paths(paths);
    }

    /// Add status codes whose outcomes are not recorded. Repeated calls
    /// accumulate. The in-flight gauge is unaffected.
    pub fn set_ignore_status_codes<I>(&self, codes: I)
    where
        I: IntoIterator<Item = u16>,
    {
        self.inner.filter.add_ignore_status_codes(codes);
    }

    /// Override the response header carrying the cache hit/miss signal
    pub fn custom_cache_key(&self, header_name: &str) -> Result<()> {
        let name = parse_header_name(header_name)?;
        *self.inner.cache_header.write() = name;
        Ok(())
    }

    pub fn cache_header(&self) -> HeaderName {
        self.inner.cache_header.read().clone()
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn is_path_skipped(&self, path: &str) -> bool {
        self.inner.filter.is_path_skipped(path)
    }

    pub fn is_status_ignored(&self, status: u16) -> bool {
        self.inner.filter.is_status_ignored(status)
    }

    /// Whether exposition falls back to the process-wide default registry
    pub fn uses_default_gatherer(&self) -> bool {
        self.inner.gatherer.is_default()
    }

    /// Path the exposition endpoint was mounted at, if any
    pub fn metrics_path(&self) -> Option<String> {
        self.inner.filter.metrics_path()
    }

    /// Snapshot of every metric family visible to the exposition endpoint
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gatherer.gather()
    }

    /// Render the current snapshot in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let families = self.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    pub(crate) fn core(&self) -> &CoreMetrics {
        &self.inner.metrics
    }

    pub(crate) fn check_path(&self, path: &str) -> PathDecision {
        self.inner.filter.check_path(path)
    }

    pub(crate) fn mark_metrics_path(&self, path: &str) {
        self.inner.filter.set_metrics_path(path);
    }

    pub(crate) fn add_exposition_path(&self, path: &str) {
        self.inner.filter.add_exposition_path(path);
    }

    /// Read the cache signal from response headers
    pub(crate) fn cache_result(&self, headers: &HeaderMap) -> Option<CacheResult> {
        let header = self.inner.cache_header.read();
        let value = headers.get(&*header)?;
        let parsed = value.to_str().ok().and_then(CacheResult::from_header_value);
        if parsed.is_none() {
            tracing::debug!(
                header = %header.as_str(),
                value = ?value,
                "Ignoring unrecognized cache header value"
            );
        }
        parsed
    }

    /// Record the outcome metrics for one completed transaction.
    ///
    /// Returns false when the status code is ignored and nothing was recorded.
    pub(crate) fn record(
        &self,
        labels: &TransactionLabels<'_>,
        elapsed: Duration,
        cache: Option<CacheResult>,
    ) -> bool {
        let status = labels.status();
        if self.inner.filter.is_status_ignored(status) {
            tracing::debug!(status, method = labels.method(), "Status code ignored, not recording");
            return false;
        }

        let values = labels.request_values();
        let metrics = &self.inner.metrics;
        metrics.requests_total.with_label_values(&values).inc();
        metrics
            .request_duration
            .with_label_values(&values)
            .observe(elapsed.as_secs_f64());

        if let Some(result) = cache {
            metrics
                .cache_results
                .with_label_values(&labels.cache_values(result))
                .inc();
        }
        true
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics")
            .field("service_name", &self.inner.service_name)
            .field("cache_header", &*self.inner.cache_header.read())
            .field("gatherer", &self.inner.gatherer)
            .finish()
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| MetricsError::InvalidHeaderName(name.to_string()))
}

/// Step-by-step construction of [`HttpMetrics`]
pub struct HttpMetricsBuilder {
    service_name: String,
    namespace: String,
    subsystem: String,
    const_labels: BTreeMap<String, String>,
    registerer: Option<Box<dyn Registerer>>,
    skip_paths: Vec<String>,
    ignore_status_codes: Vec<u16>,
    cache_header: String,
}

impl Default for HttpMetricsBuilder {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            namespace: String::new(),
            subsystem: DEFAULT_SUBSYSTEM.to_string(),
            const_labels: BTreeMap::new(),
            registerer: None,
            skip_paths: Vec::new(),
            ignore_status_codes: Vec::new(),
            cache_header: DEFAULT_CACHE_HEADER.to_string(),
        }
    }
}

impl HttpMetricsBuilder {
    pub fn service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = subsystem.to_string();
        self
    }

    /// Static labels; when any are given the service label is omitted
    pub fn const_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.const_labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Register on `registry` instead of a fresh private registry
    pub fn registry<R>(mut self, registry: R) -> Self
    where
        R: Registerer + 'static,
    {
        self.registerer = Some(Box::new(registry));
        self
    }

    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.skip_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn ignore_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.ignore_status_codes.extend(codes);
        self
    }

    pub fn cache_header(mut self, header_name: &str) -> Self {
        self.cache_header = header_name.to_string();
        self
    }

    /// Register the metrics and build the instance
    pub fn build(self) -> Result<HttpMetrics> {
        let cache_header = parse_header_name(&self.cache_header)?;
        let registerer: Box<dyn Registerer> = match self.registerer {
            Some(registerer) => registerer,
            None => Box::new(Registry::new()),
        };

        let names = MetricNames {
            namespace: self.namespace.clone(),
            subsystem: self.subsystem.clone(),
            const_labels: constant_labels(&self.service_name, &self.const_labels),
        };
        let metrics = CoreMetrics::register(registerer.as_ref(), &names)?;

        let gatherer = MetricsGatherer::resolve(registerer.as_ref());
        if gatherer.is_default() {
            tracing::warn!(
                service = %self.service_name,
                "Registry cannot gather its metrics, exposition falls back to the default registry"
            );
        }

        let filter = FilterPolicy::new();
        filter.add_skip_paths(self.skip_paths);
        filter.add_ignore_status_codes(self.ignore_status_codes);

        tracing::info!(
            service = %self.service_name,
            namespace = %self.namespace,
            subsystem = %self.subsystem,
            const_labels = self.const_labels.len(),
            "HTTP metrics registered"
        );

        Ok(HttpMetrics {
            inner: Arc::new(Inner {
                service_name: self.service_name,
                metrics,
                filter,
                cache_header: RwLock::new(cache_header),
                gatherer,
            }),
        })
    }

    fn build_or_panic(self) -> HttpMetrics {
        self.build()
            .unwrap_or_else(|e| panic!("Failed to register HTTP metrics: {}", e))
    }
}
