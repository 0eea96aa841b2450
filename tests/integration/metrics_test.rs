// Request metrics integration tests
//
// Verifies the labeled observations produced for ordinary traffic:
// - requests_total / request_duration_seconds per method, route and status
// - in-flight gauge returns to zero
// - namespace/subsystem prefixes and constant labels
// - route patterns (not raw URLs) as the path label

use super::test_harness::{assert_contains, assert_not_contains, get, scrape, send};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get as get_route, post};
use axum::Router;
use promhttp_layer::HttpMetrics;
use rstest::rstest;
use std::collections::BTreeMap;

async fn error_handler(Path(kind): Path<String>) -> Result<&'static str, StatusCode> {
    match kind.as_str() {
        "client" => Err(StatusCode::BAD_REQUEST),
        _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get_route(|| async { "Hello World" }))
        .route("/error/:type", get_route(error_handler))
}

#[tokio::test]
async fn test_middleware_records_requests() {
    let metrics = HttpMetrics::new("test-service");
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    assert_eq!(get(&app, "/").await.status(), StatusCode::OK);
    assert_eq!(get(&app, "/error/client").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        get(&app, "/error/unknown").await.status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/",service="test-service",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/error/:type",service="test-service",status_code="400"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/error/:type",service="test-service",status_code="500"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_request_duration_seconds_count{method="GET",path="/",service="test-service",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_in_progress_total{method="GET",service="test-service"} 0"#,
    );
}

#[tokio::test]
async fn test_middleware_with_nested_router() {
    let metrics = HttpMetrics::new("test-service");
    let public = Router::new()
        .route("/", get_route(|| async { "Hello World" }))
        .route("/error/:type", get_route(error_handler));
    let app = metrics
        .register_at(Router::new().nest("/public", public), "/metrics")
        .layer(metrics.layer());

    assert_eq!(get(&app, "/public").await.status(), StatusCode::OK);
    assert_eq!(
        get(&app, "/public/error/client").await.status(),
        StatusCode::BAD_REQUEST
    );

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/public",service="test-service",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/public/error/:type",service="test-service",status_code="400"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_in_progress_total{method="GET",service="test-service"} 0"#,
    );
}

#[tokio::test]
async fn test_middleware_with_service_name_and_namespace() {
    let metrics = HttpMetrics::with_namespace("unique-service", "my_service_with_name", "http");
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    assert_eq!(get(&app, "/").await.status(), StatusCode::OK);

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"my_service_with_name_http_requests_total{method="GET",path="/",service="unique-service",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"my_service_with_name_http_request_duration_seconds_count{method="GET",path="/",service="unique-service",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"my_service_with_name_http_requests_in_progress_total{method="GET",service="unique-service"} 0"#,
    );
}

#[tokio::test]
async fn test_middleware_with_constant_labels() {
    let mut labels = BTreeMap::new();
    labels.insert("customkey1", "customvalue1");
    labels.insert("customkey2", "customvalue2");

    let metrics = HttpMetrics::with_labels(labels, "my_service", "http");
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    assert_eq!(get(&app, "/").await.status(), StatusCode::OK);

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"my_service_http_requests_total{customkey1="customvalue1",customkey2="customvalue2",method="GET",path="/",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"my_service_http_request_duration_seconds_count{customkey1="customvalue1",customkey2="customvalue2",method="GET",path="/",status_code="200"} 1"#,
    );
    assert_contains(
        &got,
        r#"my_service_http_requests_in_progress_total{customkey1="customvalue1",customkey2="customvalue2",method="GET"} 0"#,
    );
    assert_not_contains(&got, "service=");
}

#[tokio::test]
async fn test_path_parameters_keep_route_pattern() {
    let metrics = HttpMetrics::new("test-service");
    let app = metrics
        .register_at(
            Router::new().route("/users/:id", get_route(|| async { "user" })),
            "/metrics",
        )
        .layer(metrics.layer());

    for id in ["1", "42", "550e8400-e29b-41d4-a716-446655440000"] {
        assert_eq!(get(&app, &format!("/users/{}", id)).await.status(), StatusCode::OK);
    }

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/users/:id",service="test-service",status_code="200"} 3"#,
    );
    assert_not_contains(&got, r#"path="/users/42""#);
}

#[tokio::test]
async fn test_unmatched_requests_share_one_series() {
    let metrics = HttpMetrics::new("test-service");
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    for i in 0..100 {
        let uri = format!("/scan/{}", i);
        assert_eq!(get(&app, &uri).await.status(), StatusCode::NOT_FOUND);
    }

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="unmatched",service="test-service",status_code="404"} 100"#,
    );
    assert_not_contains(&got, r#"path="/scan/"#);

    let series = got
        .lines()
        .filter(|line| line.starts_with("http_requests_total{"))
        .count();
    assert_eq!(series, 1);

    let buckets = got
        .lines()
        .filter(|line| line.starts_with("http_request_duration_seconds_bucket{"))
        .count();
    assert_eq!(buckets, prometheus::DEFAULT_BUCKETS.len() + 1);
}

#[tokio::test]
async fn test_skip_paths_apply_to_unmatched_requests() {
    let metrics = HttpMetrics::new("test-service");
    metrics.set_skip_paths(["/favicon.ico"]);
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    get(&app, "/favicon.ico").await;

    let got = scrape(&app, "/metrics").await;
    assert_not_contains(&got, r#"path="unmatched""#);
}

#[tokio::test]
async fn test_methods_are_labeled_separately() {
    let metrics = HttpMetrics::new("test-service");
    let routes = Router::new().route(
        "/items",
        get_route(|| async { "list" }).merge(post(|| async { StatusCode::CREATED })),
    );
    let app = metrics
        .register_at(routes, "/metrics")
        .layer(metrics.layer());

    assert_eq!(get(&app, "/items").await.status(), StatusCode::OK);
    assert_eq!(send(&app, "POST", "/items").await.status(), StatusCode::CREATED);

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="POST",path="/items",service="test-service",status_code="201"} 1"#,
    );
    assert_contains(
        &got,
        r#"http_requests_in_progress_total{method="POST",service="test-service"} 0"#,
    );
}

#[rstest]
#[case(1)]
#[case(5)]
#[case(25)]
#[tokio::test]
async fn test_request_count_matches_requests_sent(#[case] n: usize) {
    let metrics = HttpMetrics::new("count-service");
    let app = metrics
        .register_at(demo_routes(), "/metrics")
        .layer(metrics.layer());

    for _ in 0..n {
        assert_eq!(get(&app, "/").await.status(), StatusCode::OK);
    }

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        &format!(
            r#"http_requests_total{{method="GET",path="/",service="count-service",status_code="200"}} {}"#,
            n
        ),
    );
    assert_contains(
        &got,
        &format!(
            r#"http_request_duration_seconds_count{{method="GET",path="/",service="count-service",status_code="200"}} {}"#,
            n
        ),
    );
}

#[tokio::test]
async fn test_router_extension_mounts_both_halves() {
    use promhttp_layer::MetricsRouterExt;

    let metrics = HttpMetrics::new("ext-service");
    let app = demo_routes().with_http_metrics(&metrics, "/metrics");

    assert_eq!(get(&app, "/").await.status(), StatusCode::OK);

    let got = scrape(&app, "/metrics").await;
    assert_contains(
        &got,
        r#"http_requests_total{method="GET",path="/",service="ext-service",status_code="200"} 1"#,
    );
    assert_not_contains(&got, r#"path="/metrics""#);
}
