use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Position in a changes feed (`since` / `seq` / `last_seq`).
///
/// Cursors are opaque server tokens. They are compared for equality only,
/// never ordered. Numeric tokens from older servers are kept as their
/// decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Sentinel meaning "the current end of the log".
    pub const NOW: &'static str = "now";

    /// Start of the log; also the terminal cursor when a spool trailer is missing.
    pub const ZERO: &'static str = "0";

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn now() -> Self {
        Self::new(Self::NOW)
    }

    pub fn zero() -> Self {
        Self::new(Self::ZERO)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Reads a cursor out of a raw JSON value. Only strings and numbers qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(token) => Some(Self(token.clone())),
            Value::Number(number) => Some(Self(number.to_string())),
            _ => None,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawCursor {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawCursor::deserialize(deserializer)? {
            RawCursor::Text(token) => Self(token),
            RawCursor::Number(number) => Self(number.to_string()),
        })
    }
}
