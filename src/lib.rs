// promhttp-layer: Prometheus request metrics for axum routers
//
// Records request counts, latency histograms, in-flight gauges and cache
// hit/miss counts per route, and serves them on a pull-based endpoint.

pub mod config;
pub mod error;
pub mod exposition;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use config::{MetricsConfig, ServerConfig};
pub use error::MetricsError;
pub use exposition::{metrics_handler, MetricsRouterExt};
pub use metrics::labels::CacheResult;
pub use metrics::registry::{Gatherer, MetricsGatherer, Registerer};
pub use metrics::{HttpMetrics, HttpMetricsBuilder, DEFAULT_CACHE_HEADER};
pub use middleware::{HttpMetricsLayer, HttpMetricsService, InFlightGuard};
