// Instrumentation hook: tower layer wrapping every routed request
//
// Entry: bump the in-flight gauge, note the start time, call the inner
// service. Exit: drop the gauge guard, read the final status and record
// the outcome metrics unless the filter policy says otherwise.

use axum::extract::MatchedPath;
use futures::future::BoxFuture;
use http::{Request, Response};
use prometheus::IntGauge;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

use crate::exposition::ExpositionResponse;
use crate::metrics::filter::PathDecision;
use crate::metrics::labels::{TransactionLabels, UNMATCHED_PATH};
use crate::metrics::HttpMetrics;

/// Status recorded when the inner service fails instead of responding
const INTERNAL_ERROR_STATUS: u16 = 500;

/// RAII in-flight tracker
///
/// Increments the gauge on creation and decrements it when dropped, so the
/// pair stays balanced even if the request future is cancelled or the
/// handler panics.
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl InFlightGuard {
    pub fn new(metrics: &HttpMetrics, method: &str) -> Self {
        let gauge = metrics
            .core()
            .requests_in_progress
            .with_label_values(&[method]);
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Layer applying [`HttpMetricsService`] to every route of a router
#[derive(Clone, Debug)]
pub struct HttpMetricsLayer {
    metrics: HttpMetrics,
}

impl HttpMetricsLayer {
    pub fn new(metrics: HttpMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for HttpMetricsLayer {
    type Service = HttpMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Service recording request metrics around an inner service
#[derive(Clone, Debug)]
pub struct HttpMetricsService<S> {
    inner: S,
    metrics: HttpMetrics,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let route = RoutePath::of(&request);

        match self.metrics.check_path(route.filter_path()) {
            PathDecision::Observe => {}
            decision => {
                tracing::trace!(
                    path = %route.filter_path(),
                    ?decision,
                    "Request not instrumented"
                );
                return Box::pin(self.inner.call(request));
            }
        }

        let metrics = self.metrics.clone();
        let method = request.method().as_str().to_string();
        let in_flight = InFlightGuard::new(&metrics, &method);
        let start = Instant::now();
        let response = self.inner.call(request);

        Box::pin(async move {
            let result = response.await;
            let elapsed = start.elapsed();
            drop(in_flight);

            let exposition = matches!(
                &result,
                Ok(response) if response.extensions().get::<ExpositionResponse>().is_some()
            );
            if exposition {
                // Exposition endpoint mounted under a prefix; remember the
                // pattern so later scrapes bypass the layer entirely
                if let RoutePath::Matched(pattern) = &route {
                    tracing::debug!(path = %pattern, "Excluding nested metrics endpoint");
                    metrics.add_exposition_path(pattern);
                }
                return result;
            }

            let (status, cache) = match &result {
                Ok(response) => (
                    response.status().as_u16(),
                    metrics.cache_result(response.headers()),
                ),
                Err(_) => (INTERNAL_ERROR_STATUS, None),
            };

            let labels = TransactionLabels::new(&method, route.label(), status);
            metrics.record(&labels, elapsed, cache);

            result
        })
    }
}

/// Path information for one request
enum RoutePath {
    /// Route pattern the router matched, e.g. `/users/:id`
    Matched(String),
    /// No route matched; holds the raw request path
    Unmatched(String),
}

impl RoutePath {
    fn of<B>(request: &Request<B>) -> Self {
        match request.extensions().get::<MatchedPath>() {
            Some(matched) => RoutePath::Matched(matched.as_str().to_string()),
            None => RoutePath::Unmatched(request.uri().path().to_string()),
        }
    }

    /// Path compared against the skip set and the exposition paths
    fn filter_path(&self) -> &str {
        match self {
            RoutePath::Matched(path) | RoutePath::Unmatched(path) => path,
        }
    }

    /// Value of the `path` label. Unmatched requests share one value so
    /// arbitrary URLs cannot create new series.
    fn label(&self) -> &str {
        match self {
            RoutePath::Matched(pattern) => pattern,
            RoutePath::Unmatched(_) => UNMATCHED_PATH,
        }
    }
}
