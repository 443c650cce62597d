// One-shot drain of the feed through the line splitter and batch parser

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::buffer_utils::{split_lines, BatchParser};
use crate::config::PollConfig;
use crate::error::Result;
use crate::events::ChangesEvent;
use crate::poll::emit;
use crate::reader::RunControl;
use crate::transport::{ChangesRequest, ChangesTransport};
use crate::types::Cursor;

pub(crate) async fn run_spool(
    transport: Arc<dyn ChangesTransport>,
    db: String,
    config: PollConfig,
    control: Arc<RunControl>,
    events: &mpsc::Sender<ChangesEvent>,
) -> Result<Cursor> {
    if let Err(error) = config.validate() {
        emit(events, ChangesEvent::Error { error: error.clone() }).await?;
        return Err(error);
    }

    let request = ChangesRequest::spool(&db, &config);
    tracing::debug!(db = %db, since = %config.since, "Spooling changes feed");

    let body = match transport.stream(request).await {
        Ok(body) => body,
        Err(error) => {
            tracing::error!(since = %config.since, "Spool request failed: {}", error);
            emit(events, ChangesEvent::Error { error: error.clone() }).await?;
            return Err(error);
        }
    };

    let mut lines = Box::pin(split_lines(body));
    let mut parser = BatchParser::new(config.batch_size);

    while let Some(line) = lines.next().await {
        if !control.should_continue() {
            tracing::debug!("Spool stopped before the body was consumed");
            return Ok(parser.terminal_cursor());
        }

        match line {
            Ok(line) => {
                if let Some(changes) = parser.push_line(&line) {
                    emit(events, ChangesEvent::Batch { changes }).await?;
                    if config.wait {
                        control.wait_for_resume().await;
                    }
                }
            }
            Err(error) => {
                // Truncated body: report it, then keep what already arrived
                tracing::warn!("Spool body ended early: {}", error);
                emit(events, ChangesEvent::Error { error }).await?;
            }
        }
    }

    if let Some(changes) = parser.flush() {
        emit(events, ChangesEvent::Batch { changes }).await?;
    }

    let last_seq = parser.terminal_cursor();
    tracing::debug!(last_seq = %last_seq, "Spool complete");
    emit(events, ChangesEvent::End { last_seq: last_seq.clone() }).await?;

    Ok(last_seq)
}
