use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Method;
use serde_json::{json, Value};
use std::pin::Pin;

use crate::config::PollConfig;
use crate::error::Result;
use crate::types::{ChangesResponse, Cursor};

/// Streaming response body, chunked however the network delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Performs `_changes` requests on behalf of a reader.
///
/// The reader never talks HTTP directly; swap this out to point the engine
/// at something other than a live server.
#[async_trait]
pub trait ChangesTransport: Send + Sync {
    /// Request/response round trip, used by the long-poll engine
    async fn request(&self, request: ChangesRequest) -> Result<ChangesResponse>;

    /// Streaming round trip, used by spool
    async fn stream(&self, request: ChangesRequest) -> Result<ByteStream>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangesRequest {
    pub method: Method,
    /// Path segments below the server root, unencoded.
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ChangesRequest {
    /// One long-poll slice of the feed starting at `since`.
    pub fn longpoll(db: &str, config: &PollConfig, since: &Cursor) -> Self {
        let mut request = Self::changes(db);
        request.push_query("feed", "longpoll");
        request.push_query("timeout", config.timeout_ms);
        request.push_query("since", since);
        request.push_query("limit", config.batch_size);
        request.push_query("heartbeat", config.heartbeat_ms);
        request.apply_common(config);
        request
    }

    /// Everything from `config.since` to the current end of the feed, in one body.
    pub fn spool(db: &str, config: &PollConfig) -> Self {
        let mut request = Self::changes(db);
        request.push_query("since", &config.since);
        request.apply_common(config);
        request
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Path joined with `/`, for logging.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }

    fn changes(db: &str) -> Self {
        Self {
            method: Method::POST,
            path: vec![db.to_string(), "_changes".to_string()],
            query: Vec::new(),
            body: None,
        }
    }

    fn apply_common(&mut self, config: &PollConfig) {
        self.push_query("seq_interval", config.seq_interval());
        self.push_query("include_docs", config.include_docs);

        if let Some(selector) = &config.selector {
            self.push_query("filter", "_selector");
            self.body = Some(json!({ "selector": selector }));
        }

        for (key, value) in &config.extra_query {
            self.push_query(key, value);
        }
    }

    fn push_query(&mut self, key: &str, value: impl ToString) {
        self.query.push((key.to_string(), value.to_string()));
    }
}
