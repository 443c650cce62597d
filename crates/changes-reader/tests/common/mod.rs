#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use changes_reader::{
    ByteStream, ChangeRecord, ChangesChannel, ChangesError, ChangesEvent, ChangesRequest,
    ChangesResponse, ChangesTransport, Result,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Transport that replays a fixed script.
///
/// Once the script runs out, further requests never complete, like a
/// long-poll against a quiet database.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ChangesResponse>>>,
    bodies: Mutex<VecDeque<Result<Vec<Result<Bytes>>>>>,
    requests: Mutex<Vec<ChangesRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: ChangesResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: ChangesError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Spool body delivered as the given chunks.
    pub fn body(self, chunks: Vec<Result<Bytes>>) -> Self {
        self.bodies.lock().unwrap().push_back(Ok(chunks));
        self
    }

    pub fn body_error(self, error: ChangesError) -> Self {
        self.bodies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Holds the next request open until `gate` is notified.
    pub fn gated(self, gate: Arc<Notify>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn requests(&self) -> Vec<ChangesRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChangesTransport for ScriptedTransport {
    async fn request(&self, request: ChangesRequest) -> Result<ChangesResponse> {
        self.requests.lock().unwrap().push(request);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }

    async fn stream(&self, request: ChangesRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request);
        let next = self.bodies.lock().unwrap().pop_front();
        match next {
            Some(Ok(chunks)) => Ok(Box::pin(futures::stream::iter(chunks))),
            Some(Err(error)) => Err(error),
            None => futures::future::pending().await,
        }
    }
}

pub fn change(id: &str) -> ChangeRecord {
    ChangeRecord::new(id, vec![json!("1-1")])
}

pub fn changes(prefix: &str, count: usize, first_seq: usize) -> Vec<ChangeRecord> {
    (0..count)
        .map(|i| change(&format!("{}{}", prefix, i)).with_seq(format!("{}-0", first_seq + i)))
        .collect()
}

pub fn http_error(status: u16) -> ChangesError {
    ChangesError::Http {
        status,
        error: None,
        reason: None,
    }
}

/// Next event, failing the test instead of hanging.
pub async fn next_event(channel: &ChangesChannel) -> ChangesEvent {
    tokio::time::timeout(Duration::from_secs(5), channel.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("channel closed before the expected event")
}

/// Every remaining event of a run that is expected to end on its own.
pub async fn drain(channel: &ChangesChannel) -> Vec<ChangesEvent> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), channel.recv())
            .await
            .expect("timed out waiting for the run to end");
        match next {
            Some(event) => events.push(event),
            None => return events,
        }
    }
}

pub fn names(events: &[ChangesEvent]) -> Vec<&'static str> {
    events.iter().map(ChangesEvent::name).collect()
}
