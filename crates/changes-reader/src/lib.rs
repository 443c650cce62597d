//! Resumable reader for a CouchDB-style changes feed.
//!
//! [`ChangesReader`] offers three ways of consuming `_changes`:
//!
//! - [`start`](ChangesReader::start) tails the feed with long-polls forever,
//!   retrying transient failures without limit
//! - [`get`](ChangesReader::get) long-polls until the feed is drained, then ends
//! - [`spool`](ChangesReader::spool) drains the feed with one streamed
//!   request, parsed incrementally in bounded memory
//!
//! Each run reports [`ChangesEvent`]s through a [`ChangesChannel`].

pub mod buffer_utils;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
mod poll;
pub mod reader;
mod spool;
pub mod transport;
pub mod types;

pub use buffer_utils::{split_lines, BatchParser, LineSplitter};
pub use config::PollConfig;
pub use error::{ChangesError, Result};
pub use events::ChangesEvent;
pub use http::HttpTransport;
pub use poll::PollMode;
pub use reader::{ChangesChannel, ChangesReader};
pub use transport::{ByteStream, ChangesRequest, ChangesTransport};
pub use types::{ChangeRecord, ChangesResponse, Cursor};
