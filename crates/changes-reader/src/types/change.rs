use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Cursor;

/// One entry of the changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Null when the server batches sequence numbers (`seq_interval`).
    #[serde(default)]
    pub seq: Option<Cursor>,

    pub id: String,

    /// Revision markers, kept exactly as the server sent them.
    pub changes: Vec<Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

impl ChangeRecord {
    pub fn new(id: impl Into<String>, changes: Vec<Value>) -> Self {
        Self {
            seq: None,
            id: id.into(),
            changes,
            deleted: false,
            doc: None,
        }
    }

    pub fn with_seq(mut self, seq: impl Into<Cursor>) -> Self {
        self.seq = Some(seq.into());
        self
    }

    pub fn with_doc(mut self, doc: Value) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Body of a long-poll `_changes` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ChangeRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seq: Option<Cursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

impl ChangesResponse {
    pub fn new(results: Vec<ChangeRecord>, last_seq: impl Into<Cursor>) -> Self {
        Self {
            results: Some(results),
            last_seq: Some(last_seq.into()),
            pending: Some(0),
        }
    }

    pub fn with_pending(mut self, pending: u64) -> Self {
        self.pending = Some(pending);
        self
    }
}
