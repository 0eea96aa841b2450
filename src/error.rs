// Error types module

use thiserror::Error;

/// Centralized error type for the instrumentation layer
///
/// Registration conflicts are startup-time programming errors; the
/// convenience constructors on `HttpMetrics` turn them into panics, while
/// `HttpMetricsBuilder::build` hands them back to the caller.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A collector could not be registered (duplicate metric identity,
    /// inconsistent label names, invalid metric name, ...)
    #[error("Metric registration error: {0}")]
    Registration(#[from] prometheus::Error),

    /// The configured cache header is not a valid HTTP header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    /// Configuration errors (invalid YAML, missing env vars, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The gathered metric families could not be encoded for exposition
    #[error("Encoding error: {0}")]
    Encode(String),
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, MetricsError>;
