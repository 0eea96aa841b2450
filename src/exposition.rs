//! Exposition endpoint: serves the gatherer's snapshot in the Prometheus
//! text format.
//!
//! - `/metrics` (or any path) - current state of every registered metric
//! - optional guard layers (authentication, IP allow-lists, ...) run first;
//!   if a guard rejects the request the handler never executes

use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter, Route};
use axum::Router;
use http::{header, Request, StatusCode};
use std::convert::Infallible;
use tower::layer::util::Identity;
use tower::{Layer, Service};

use crate::metrics::HttpMetrics;
use crate::middleware::HttpMetricsLayer;

/// Render the current metrics snapshot as an HTTP response
pub async fn metrics_handler(metrics: HttpMetrics) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Response extension identifying the exposition endpoint, so the metrics
/// layer can leave it out wherever the route ends up mounted
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExpositionResponse;

async fn mark_exposition(mut response: Response) -> Response {
    response.extensions_mut().insert(ExpositionResponse);
    response
}

impl HttpMetrics {
    /// Instrumentation middleware for `Router::layer`
    pub fn layer(&self) -> HttpMetricsLayer {
        HttpMetricsLayer::new(self.clone())
    }

    /// Mount the exposition endpoint at `path`.
    ///
    /// The endpoint is excluded from instrumentation whether the route ends
    /// up inside or outside the metrics layer, and also when the router is
    /// later nested under a prefix.
    pub fn register_at<S>(&self, router: Router<S>, path: &str) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.register_at_with(router, path, Identity::new())
    }

    /// Mount the exposition endpoint at `path` behind `guard`.
    ///
    /// Several guards can be combined with `tower::ServiceBuilder`; they run
    /// in the order they were added.
    pub fn register_at_with<S, L>(&self, router: Router<S>, path: &str, guard: L) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request<axum::body::Body>> + Clone + Send + 'static,
        <L::Service as Service<Request<axum::body::Body>>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request<axum::body::Body>>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request<axum::body::Body>>>::Future: Send + 'static,
    {
        self.mark_metrics_path(path);

        tracing::info!(
            path = %path,
            service = %self.service_name(),
            default_gatherer = self.uses_default_gatherer(),
            "Metrics endpoint registered"
        );

        let metrics = self.clone();
        let endpoint: MethodRouter<S> =
            get(move || metrics_handler(metrics.clone())).layer(guard);

        // Outermost, so rejections from the guards are marked as well
        router.route(path, endpoint.layer(map_response(mark_exposition)))
    }
}

/// Router extension mounting both halves in one call
pub trait MetricsRouterExt {
    /// Mount the exposition endpoint at `path` and instrument every route
    fn with_http_metrics(self, metrics: &HttpMetrics, path: &str) -> Self;
}

impl<S> MetricsRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_http_metrics(self, metrics: &HttpMetrics, path: &str) -> Self {
        metrics.register_at(self, path).layer(metrics.layer())
    }
}
