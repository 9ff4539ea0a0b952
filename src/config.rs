//! Orchestration configuration.

use std::time::Duration;

/// Default maximum payload size per batch (10 MB, the async API limit).
const DEFAULT_MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;

/// Default maximum data rows per batch.
const DEFAULT_MAX_BATCH_ROWS: usize = 10_000;

/// Default async API version path segment.
const DEFAULT_API_VERSION: &str = "29.0";

/// Default pause between batch status checks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration consumed by the orchestrator. Read-only once a run starts.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Byte threshold at which an accumulating batch payload is flushed.
    /// A payload may exceed this by one row; see the partitioner contract.
    pub max_batch_bytes: usize,
    /// Row threshold at which an accumulating batch payload is flushed.
    pub max_batch_rows: usize,
    /// API version segment used in every request path.
    pub api_version: String,
    /// Pause between consecutive batch status checks.
    pub poll_interval: Duration,
    /// Upper bound on how long a single batch may be polled. `None` polls
    /// until the batch is terminal, matching the historical behavior.
    pub poll_deadline: Option<Duration>,
    /// Serialize batch payloads as RFC 4180 CSV instead of the default
    /// naive comma-join.
    pub strict_csv: bool,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: None,
            strict_csv: false,
        }
    }
}

impl BulkConfig {
    /// Sets the byte threshold for batch flushing.
    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Sets the row threshold for batch flushing.
    pub fn max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows;
        self
    }

    /// Sets the API version path segment (e.g. "62.0").
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Sets the pause between batch status checks.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bounds how long a single batch may be polled before the run fails.
    pub fn poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = Some(deadline);
        self
    }

    /// Opts into RFC 4180 payload serialization.
    pub fn strict_csv(mut self, strict: bool) -> Self {
        self.strict_csv = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behavior() {
        let config = BulkConfig::default();
        assert_eq!(config.max_batch_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_batch_rows, 10_000);
        assert_eq!(config.api_version, "29.0");
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert!(config.poll_deadline.is_none());
        assert!(!config.strict_csv);
    }

    #[test]
    fn builder_chains() {
        let config = BulkConfig::default()
            .max_batch_bytes(1024)
            .max_batch_rows(50)
            .api_version("62.0")
            .poll_interval(Duration::from_millis(10))
            .poll_deadline(Duration::from_secs(60))
            .strict_csv(true);

        assert_eq!(config.max_batch_bytes, 1024);
        assert_eq!(config.max_batch_rows, 50);
        assert_eq!(config.api_version, "62.0");
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.poll_deadline, Some(Duration::from_secs(60)));
        assert!(config.strict_csv);
    }
}
