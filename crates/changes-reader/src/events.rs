use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::error::ChangesError;
use crate::types::{ChangeRecord, Cursor};

/// Notification delivered to the subscriber of a reader run.
///
/// Serialises as `{"type": "<name>", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangesEvent {
    /// One record, in server order
    Change { change: ChangeRecord },

    /// Every record of one response (poll) or one parsed batch (spool)
    Batch { changes: Vec<ChangeRecord> },

    /// The cursor advanced
    Seq { seq: Cursor },

    /// A request failed; fatal or not, it is reported exactly once
    Error {
        #[serde(serialize_with = "serialize_error")]
        error: ChangesError,
    },

    /// Finite run completed
    End { last_seq: Cursor },
}

impl ChangesEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::Batch { .. } => "batch",
            Self::Seq { .. } => "seq",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }
}

fn serialize_error<S>(error: &ChangesError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut state = serializer.serialize_struct("ChangesError", 3)?;
    state.serialize_field("message", &error.to_string())?;
    state.serialize_field("status", &error.status())?;
    state.serialize_field("reason", &error.reason())?;
    state.end()
}
