// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{MetricsError, Result};
use crate::logging::LogFormat;
use crate::metrics::labels::RESERVED_LABELS;
use crate::metrics::{DEFAULT_CACHE_HEADER, DEFAULT_SUBSYSTEM};

fn default_subsystem() -> String {
    DEFAULT_SUBSYSTEM.to_string()
}

fn default_cache_header() -> String {
    DEFAULT_CACHE_HEADER.to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// HTTP metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Value of the `service` label (omitted when `const_labels` is set)
    #[serde(default)]
    pub service_name: String,

    /// Metric name prefix (default: none)
    #[serde(default)]
    pub namespace: String,

    /// Second metric name prefix (default: "http")
    #[serde(default = "default_subsystem")]
    pub subsystem: String,

    /// Static labels attached to every metric
    #[serde(default)]
    pub const_labels: BTreeMap<String, String>,

    /// Exact paths excluded from instrumentation
    #[serde(default)]
    pub skip_paths: Vec<String>,

    /// Status codes whose outcomes are not recorded
    #[serde(default)]
    pub ignore_status_codes: Vec<u16>,

    /// Response header carrying the cache hit/miss signal (default: X-Cache)
    #[serde(default = "default_cache_header")]
    pub cache_header: String,

    /// Path of the exposition endpoint (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            namespace: String::new(),
            subsystem: default_subsystem(),
            const_labels: BTreeMap::new(),
            skip_paths: Vec::new(),
            ignore_status_codes: Vec::new(),
            cache_header: default_cache_header(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl MetricsConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let substituted = substitute_env_vars(yaml)?;
        let config: MetricsConfig =
            serde_yaml::from_str(&substituted).map_err(|e| MetricsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.metrics_path.starts_with('/') {
            return Err(MetricsError::Config(format!(
                "metrics_path '{}' does not start with /",
                self.metrics_path
            )));
        }

        for path in &self.skip_paths {
            if !path.starts_with('/') {
                return Err(MetricsError::Config(format!(
                    "skip path '{}' does not start with /",
                    path
                )));
            }
        }

        for code in &self.ignore_status_codes {
            if !(100..=599).contains(code) {
                return Err(MetricsError::Config(format!(
                    "ignored status code {} is not a valid HTTP status",
                    code
                )));
            }
        }

        if http::header::HeaderName::from_bytes(self.cache_header.as_bytes()).is_err() {
            return Err(MetricsError::Config(format!(
                "cache_header '{}' is not a valid header name",
                self.cache_header
            )));
        }

        for (field, value) in [("namespace", &self.namespace), ("subsystem", &self.subsystem)] {
            if !value.is_empty() && !is_valid_identifier(value) {
                return Err(MetricsError::Config(format!(
                    "{} '{}' is not a valid metric name component",
                    field, value
                )));
            }
        }

        for name in self.const_labels.keys() {
            if !is_valid_identifier(name) || name.starts_with("__") {
                return Err(MetricsError::Config(format!(
                    "constant label '{}' is not a valid label name",
                    name
                )));
            }
            if RESERVED_LABELS.contains(&name.as_str()) {
                return Err(MetricsError::Config(format!(
                    "constant label '{}' collides with a built-in label",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Demo server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            log_format: LogFormat::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let substituted = substitute_env_vars(yaml)?;
        let config: ServerConfig =
            serde_yaml::from_str(&substituted).map_err(|e| MetricsError::Config(e.to_string()))?;
        config.metrics.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Replace `${VAR_NAME}` with environment variable values.
/// Fails if any referenced variable is unset.
fn substitute_env_vars(yaml: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| MetricsError::Config(e.to_string()))?;

    for caps in re.captures_iter(yaml) {
        let var_name = &caps[1];
        if std::env::var(var_name).is_err() {
            return Err(MetricsError::Config(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            )));
        }
    }

    let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    });
    Ok(substituted.into_owned())
}

fn is_valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
