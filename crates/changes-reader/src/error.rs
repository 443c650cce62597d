use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the transport and the reader loops.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChangesError {
    #[error("Server responded with status {status}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Http {
        status: u16,
        error: Option<String>,
        reason: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Event channel closed by subscriber")]
    Closed,
}

/// CouchDB error body: `{"error": "...", "reason": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    reason: Option<String>,
}

impl ChangesError {
    /// Builds an HTTP error from a status code and the raw response body.
    /// Bodies that are not CouchDB error documents are ignored.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let (error, reason) = match parsed {
            Some(body) => (body.error, body.reason),
            None => (None, None),
        };
        Self::Http {
            status,
            error,
            reason,
        }
    }

    /// HTTP-like status code, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied reason, when the failure carries one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Http { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Fatal errors end the loop: client errors other than 429, bad
    /// configuration and a dropped subscriber. Everything else is retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Http { status, .. } => (400..500).contains(status) && *status != 429,
            Self::Config(_) | Self::Closed => true,
            Self::Network(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<reqwest::Error> for ChangesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                error: None,
                reason: None,
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChangesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ChangesError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid server URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ChangesError>;
