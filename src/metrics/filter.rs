// Filter policy: which transactions are observed
//
// Both sets only ever grow. They are created empty with the instance, so
// accumulating configuration calls never have to initialize anything.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Outcome of consulting the filter before the handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    /// Observe the transaction
    Observe,
    /// Path is in the configured skip set
    Skipped,
    /// Path is the metrics endpoint itself
    MetricsEndpoint,
}

/// Thread-safe skip-path / ignored-status configuration
#[derive(Debug, Default)]
pub struct FilterPolicy {
    skip_paths: RwLock<HashSet<String>>,
    ignore_status_codes: RwLock<HashSet<u16>>,
    metrics_path: RwLock<Option<String>>,
    exposition_paths: RwLock<HashSet<String>>,
}

impl FilterPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add paths to the skip set
    pub fn add_skip_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut skip = self.skip_paths.write();
        skip.extend(paths.into_iter().map(Into::into));
    }

    /// Add status codes to the ignore set
    pub fn add_ignore_status_codes<I>(&self, codes: I)
    where
        I: IntoIterator<Item = u16>,
    {
        let mut ignore = self.ignore_status_codes.write();
        ignore.extend(codes);
    }

    /// Remember the path the exposition endpoint is mounted at.
    /// Independent of the skip set.
    pub fn set_metrics_path(&self, path: &str) {
        *self.metrics_path.write() = Some(path.to_string());
        self.add_exposition_path(path);
    }

    /// Route pattern the exposition endpoint was observed under. Differs
    /// from the mounted path when the router was nested under a prefix.
    pub fn add_exposition_path(&self, path: &str) {
        if !self.exposition_paths.read().contains(path) {
            self.exposition_paths.write().insert(path.to_string());
        }
    }

    pub fn metrics_path(&self) -> Option<String> {
        self.metrics_path.read().clone()
    }

    /// Decide whether a request to `path` is instrumented at all
    pub fn check_path(&self, path: &str) -> PathDecision {
        if self.exposition_paths.read().contains(path) {
            return PathDecision::MetricsEndpoint;
        }
        if self.skip_paths.read().contains(path) {
            return PathDecision::Skipped;
        }
        PathDecision::Observe
    }

    /// Whether outcome metrics are suppressed for `status`
    pub fn is_status_ignored(&self, status: u16) -> bool {
        self.ignore_status_codes.read().contains(&status)
    }

    pub fn is_path_skipped(&self, path: &str) -> bool {
        self.skip_paths.read().contains(path)
    }
}
