use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use promhttp_layer::{HttpMetrics, MetricsRouterExt, ServerConfig};
use std::path::PathBuf;

/// Demo HTTP server instrumented with promhttp-layer
#[derive(Parser, Debug)]
#[command(name = "promhttp-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }),
        None => ServerConfig::default(),
    };

    if args.test {
        println!("Configuration OK");
        return Ok(());
    }

    promhttp_layer::logging::init_subscriber(config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!(
        config_file = ?args.config,
        address = %config.listen_address(),
        metrics_path = %config.metrics.metrics_path,
        skip_paths = config.metrics.skip_paths.len(),
        "Configuration loaded successfully"
    );

    let metrics = HttpMetrics::from_config(&config.metrics)?;
    let app = Router::new()
        .route("/", get(|| async { "Hello World" }))
        .route("/hello/:name", get(hello))
        .route("/error", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
        .route("/health", get(|| async { "OK" }))
        .with_http_metrics(&metrics, &config.metrics.metrics_path);

    let listener = tokio::net::TcpListener::bind(config.listen_address()).await?;
    tracing::info!(address = %config.listen_address(), "Starting demo server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn hello(Path(name): Path<String>) -> String {
    format!("Hello, {}!", name)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
