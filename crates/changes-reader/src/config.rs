use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ChangesError, Result};
use crate::types::Cursor;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_HEARTBEAT_MS: u64 = 5_000;

/// `seq_interval` multiplier applied when `fast_changes` is set.
pub const FAST_CHANGES_INTERVAL_FACTOR: usize = 10;

/// Settings for one run of a reader.
///
/// A fresh value is handed to every `start`/`get`/`spool` call; nothing
/// carries over from a previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Cursor to resume from.
    pub since: Cursor,
    /// `limit` per long-poll and the size of emitted spool batches.
    pub batch_size: usize,
    pub include_docs: bool,
    /// How long the server holds a long-poll open.
    pub timeout_ms: u64,
    pub heartbeat_ms: u64,
    /// Trade cursor precision for cheaper responses.
    pub fast_changes: bool,
    /// Mango selector; switches the request to `filter=_selector`.
    pub selector: Option<Value>,
    /// Passed through verbatim as query parameters.
    pub extra_query: BTreeMap<String, String>,
    /// Park after each batch until the reader is resumed.
    pub wait: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            since: Cursor::now(),
            batch_size: DEFAULT_BATCH_SIZE,
            include_docs: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            fast_changes: false,
            selector: None,
            extra_query: BTreeMap::new(),
            wait: false,
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_since(mut self, since: impl Into<Cursor>) -> Self {
        self.since = since.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat_ms = millis(heartbeat);
        self
    }

    pub fn with_fast_changes(mut self, fast_changes: bool) -> Self {
        self.fast_changes = fast_changes;
        self
    }

    pub fn with_selector(mut self, selector: Value) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query.insert(key.into(), value.into());
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Sequence-interval hint sent with every request.
    pub fn seq_interval(&self) -> usize {
        if self.fast_changes {
            self.batch_size.saturating_mul(FAST_CHANGES_INTERVAL_FACTOR)
        } else {
            self.batch_size
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ChangesError::Config("batch_size must be at least 1".into()));
        }
        if let Some(selector) = &self.selector {
            if !selector.is_object() {
                return Err(ChangesError::Config("selector must be a JSON object".into()));
            }
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = PollConfig::default();

        assert_eq!(config.since, Cursor::now());
        assert_eq!(config.batch_size, 100);
        assert!(!config.include_docs);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.heartbeat(), Duration::from_secs(5));
        assert!(config.selector.is_none());
        assert!(!config.wait);
    }

    #[test]
    fn test_builder() {
        let config = PollConfig::new()
            .with_since("thedawnoftime")
            .with_batch_size(44)
            .with_include_docs(true)
            .with_timeout(Duration::from_millis(1000))
            .with_selector(json!({"name": "fred"}))
            .with_query_param("conflicts", "true");

        assert_eq!(config.since.as_str(), "thedawnoftime");
        assert_eq!(config.batch_size, 44);
        assert!(config.include_docs);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.extra_query.get("conflicts").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let config = PollConfig::new()
            .with_timeout(Duration::MAX)
            .with_heartbeat(Duration::from_secs(u64::MAX));

        assert_eq!(config.timeout_ms, u64::MAX);
        assert_eq!(config.heartbeat_ms, u64::MAX);
    }

    #[test]
    fn test_fast_changes_widens_seq_interval() {
        let config = PollConfig::new().with_batch_size(50);
        assert_eq!(config.seq_interval(), 50);
        assert_eq!(config.with_fast_changes(true).seq_interval(), 500);
    }

    #[test]
    fn test_validate() {
        assert!(PollConfig::default().validate().is_ok());
        assert!(PollConfig::new().with_batch_size(0).validate().is_err());
        assert!(PollConfig::new().with_selector(json!(["x"])).validate().is_err());
    }

    #[test]
    fn test_deserializes_partial_config() {
        let config: PollConfig =
            serde_json::from_value(json!({"since": 0, "batch_size": 10})).unwrap();

        assert_eq!(config.since.as_str(), "0");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }
}
