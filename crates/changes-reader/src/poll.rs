// Long-poll cursor engine

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::PollConfig;
use crate::error::{ChangesError, Result};
use crate::events::ChangesEvent;
use crate::reader::RunControl;
use crate::transport::{ChangesRequest, ChangesTransport};
use crate::types::Cursor;

/// Whether a run tails the feed forever or drains what is currently there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Continuous,
    /// Stop after the first response shorter than `batch_size`
    Finite,
}

/// Drives long-poll requests until stopped, drained (finite mode) or a fatal
/// error. Returns the cursor the run ended on.
pub(crate) async fn run_poll(
    transport: Arc<dyn ChangesTransport>,
    db: String,
    config: PollConfig,
    mode: PollMode,
    control: Arc<RunControl>,
    events: &mpsc::Sender<ChangesEvent>,
) -> Result<Cursor> {
    if let Err(error) = config.validate() {
        emit(events, ChangesEvent::Error { error: error.clone() }).await?;
        return Err(error);
    }

    let stop_on_empty = mode == PollMode::Finite;
    let mut cursor = config.since.clone();

    while control.should_continue() {
        let request = ChangesRequest::longpoll(&db, &config, &cursor);
        tracing::debug!(db = %db, since = %cursor, limit = config.batch_size, "Polling changes feed");

        match transport.request(request).await {
            Ok(response) => {
                let received = response.results.as_ref().map(Vec::len);
                let mut delivered = false;

                if let Some(results) = response.results.filter(|results| !results.is_empty()) {
                    for change in &results {
                        emit(events, ChangesEvent::Change { change: change.clone() }).await?;
                    }
                    emit(events, ChangesEvent::Batch { changes: results }).await?;
                    delivered = true;
                }

                if let Some(last_seq) = response.last_seq {
                    if last_seq != cursor {
                        tracing::debug!(from = %cursor, to = %last_seq, "Cursor advanced");
                        cursor = last_seq;
                        emit(events, ChangesEvent::Seq { seq: cursor.clone() }).await?;
                    }
                }

                if stop_on_empty && received.is_some_and(|count| count < config.batch_size) {
                    tracing::debug!(last_seq = %cursor, "Changes feed drained");
                    emit(events, ChangesEvent::End { last_seq: cursor.clone() }).await?;
                    control.stop();
                }

                if delivered && config.wait && control.should_continue() {
                    control.wait_for_resume().await;
                }
            }
            Err(error) => {
                emit(events, ChangesEvent::Error { error: error.clone() }).await?;

                if error.is_fatal() {
                    tracing::error!(since = %cursor, "Changes request failed permanently: {}", error);
                    control.stop();
                    return Err(error);
                }
                tracing::warn!(since = %cursor, "Changes request failed, retrying: {}", error);
            }
        }
    }

    Ok(cursor)
}

pub(crate) async fn emit(events: &mpsc::Sender<ChangesEvent>, event: ChangesEvent) -> Result<()> {
    events.send(event).await.map_err(|_| ChangesError::Closed)
}
