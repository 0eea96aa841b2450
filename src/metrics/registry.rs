// Metric registry adapter
//
// Registers the four HTTP metrics on an injectable registerer and decides,
// once, which gatherer the exposition endpoint reads from.

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;

use super::labels::{CACHE_LABELS, IN_PROGRESS_LABELS, REQUEST_LABELS};

/// Write side of a metrics registry: admits new collectors
pub trait Registerer: Send + Sync {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()>;

    /// Read-back capability query. Registerers that can also produce
    /// snapshots of what was registered on them return a gatherer here.
    fn as_gatherer(&self) -> Option<Arc<dyn Gatherer>> {
        None
    }
}

/// Read side of a metrics registry: produces point-in-time snapshots
pub trait Gatherer: Send + Sync {
    fn gather(&self) -> Vec<MetricFamily>;
}

impl Registerer for Registry {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()> {
        Registry::register(self, collector)
    }

    fn as_gatherer(&self) -> Option<Arc<dyn Gatherer>> {
        // Registry clones share the same underlying collectors
        Some(Arc::new(self.clone()))
    }
}

impl Gatherer for Registry {
    fn gather(&self) -> Vec<MetricFamily> {
        Registry::gather(self)
    }
}

/// Where the exposition endpoint reads metrics from
#[derive(Clone)]
pub enum MetricsGatherer {
    /// The registerer supplied at construction can read back its metrics
    Supplied(Arc<dyn Gatherer>),
    /// Fallback: the process-wide default registry
    Default,
}

impl MetricsGatherer {
    /// Resolve the gatherer for `registerer`. Runs once per instance.
    pub fn resolve(registerer: &dyn Registerer) -> Self {
        match registerer.as_gatherer() {
            Some(gatherer) => MetricsGatherer::Supplied(gatherer),
            None => MetricsGatherer::Default,
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        match self {
            MetricsGatherer::Supplied(gatherer) => gatherer.gather(),
            MetricsGatherer::Default => prometheus::default_registry().gather(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, MetricsGatherer::Default)
    }
}

impl std::fmt::Debug for MetricsGatherer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsGatherer::Supplied(_) => f.write_str("MetricsGatherer::Supplied"),
            MetricsGatherer::Default => f.write_str("MetricsGatherer::Default"),
        }
    }
}

/// Naming and constant labels for the registered metrics
#[derive(Debug, Clone)]
pub struct MetricNames {
    pub namespace: String,
    pub subsystem: String,
    pub const_labels: HashMap<String, String>,
}

impl MetricNames {
    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
            .const_labels(self.const_labels.clone())
    }

    fn histogram_opts(&self, name: &str, help: &str) -> HistogramOpts {
        HistogramOpts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
            .const_labels(self.const_labels.clone())
    }
}

/// The four HTTP metrics, registered together
#[derive(Clone)]
pub struct CoreMetrics {
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub requests_in_progress: IntGaugeVec,
    pub cache_results: IntCounterVec,
}

impl CoreMetrics {
    /// Create the metrics and register them on `registerer`.
    ///
    /// Fails on the first registration conflict; metrics registered before
    /// the conflict stay registered.
    pub fn register(registerer: &dyn Registerer, names: &MetricNames) -> prometheus::Result<Self> {
        let requests_total = IntCounterVec::new(
            names.opts(
                "requests_total",
                "Count all http requests by status code, method and path.",
            ),
            &REQUEST_LABELS,
        )?;

        // Default latency buckets (5ms .. 10s)
        let request_duration = HistogramVec::new(
            names.histogram_opts(
                "request_duration_seconds",
                "Duration of all HTTP requests by status code, method and path.",
            ),
            &REQUEST_LABELS,
        )?;

        let requests_in_progress = IntGaugeVec::new(
            names.opts("requests_in_progress_total", "All the requests in progress"),
            &IN_PROGRESS_LABELS,
        )?;

        let cache_results = IntCounterVec::new(
            names.opts(
                "cache_results",
                "Counts all cache hits by status code, method, and path",
            ),
            &CACHE_LABELS,
        )?;

        registerer.register(Box::new(requests_total.clone()))?;
        registerer.register(Box::new(request_duration.clone()))?;
        registerer.register(Box::new(requests_in_progress.clone()))?;
        registerer.register(Box::new(cache_results.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
            requests_in_progress,
            cache_results,
        })
    }
}
