use futures::Stream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

use crate::config::PollConfig;
use crate::error::{ChangesError, Result};
use crate::events::ChangesEvent;
use crate::poll::{run_poll, PollMode};
use crate::spool::run_spool;
use crate::transport::ChangesTransport;
use crate::types::Cursor;

/// Events buffered between the loop and a subscriber that has fallen behind.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Cooperative stop/resume signals shared between a reader and its loop.
///
/// The loop only looks at these between requests; nothing here interrupts
/// a request that is already in flight.
#[derive(Debug)]
pub(crate) struct RunControl {
    keep_going: AtomicBool,
    resume: Notify,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self {
            keep_going: AtomicBool::new(true),
            resume: Notify::new(),
        }
    }

    pub(crate) fn should_continue(&self) -> bool {
        self.keep_going.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
        self.resume.notify_one();
    }

    pub(crate) fn resume(&self) {
        self.resume.notify_one();
    }

    pub(crate) async fn wait_for_resume(&self) {
        self.resume.notified().await;
    }
}

/// Receiving end of a reader run.
///
/// Clones share one underlying channel: each event goes to whichever clone
/// receives first. The channel closes when the run ends, after which
/// [`outcome`](Self::outcome) reports how it ended.
#[derive(Clone)]
pub struct ChangesChannel {
    receiver: Arc<AsyncMutex<mpsc::Receiver<ChangesEvent>>>,
    outcome: Arc<OnceLock<Result<Cursor>>>,
}

impl ChangesChannel {
    fn new(receiver: mpsc::Receiver<ChangesEvent>, outcome: Arc<OnceLock<Result<Cursor>>>) -> Self {
        Self {
            receiver: Arc::new(AsyncMutex::new(receiver)),
            outcome,
        }
    }

    /// Next event, or `None` once the run has ended and every event was read.
    pub async fn recv(&self) -> Option<ChangesEvent> {
        self.receiver.lock().await.recv().await
    }

    /// Final cursor, or the error that ended the run. `None` while running.
    pub fn outcome(&self) -> Option<Result<Cursor>> {
        self.outcome.get().cloned()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// True when both handles receive from the same run.
    pub fn same_channel(&self, other: &ChangesChannel) -> bool {
        Arc::ptr_eq(&self.receiver, &other.receiver)
    }

    pub fn into_stream(self) -> impl Stream<Item = ChangesEvent> + Send {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Poll(PollMode),
    Spool,
}

struct ActiveRun {
    id: u64,
    // Weak so a run whose subscribers are all gone fails its next send
    receiver: Weak<AsyncMutex<mpsc::Receiver<ChangesEvent>>>,
    outcome: Arc<OnceLock<Result<Cursor>>>,
    control: Arc<RunControl>,
}

impl ActiveRun {
    fn channel(&self) -> Option<ChangesChannel> {
        Some(ChangesChannel {
            receiver: self.receiver.upgrade()?,
            outcome: Arc::clone(&self.outcome),
        })
    }
}

/// Reads the changes feed of one database.
///
/// At most one run (`start`, `get` or `spool`) is active at a time; asking
/// for another while one is active hands back the active run's channel.
/// Runs are spawned onto the current Tokio runtime.
pub struct ChangesReader {
    db: String,
    transport: Arc<dyn ChangesTransport>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    next_run_id: AtomicU64,
    channel_capacity: usize,
}

impl ChangesReader {
    pub fn new(db: impl Into<String>, transport: Arc<dyn ChangesTransport>) -> Self {
        Self {
            db: db.into(),
            transport,
            active: Arc::new(Mutex::new(None)),
            next_run_id: AtomicU64::new(0),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    /// Tail the feed indefinitely, surviving transient failures.
    pub fn start(&self, config: PollConfig) -> ChangesChannel {
        self.launch(RunKind::Poll(PollMode::Continuous), config)
    }

    /// Drain everything currently in the feed, then emit `End`.
    pub fn get(&self, config: PollConfig) -> ChangesChannel {
        self.launch(RunKind::Poll(PollMode::Finite), config)
    }

    /// Drain the feed with a single streamed request, emitting only
    /// `Batch` events followed by `End`.
    pub fn spool(&self, config: PollConfig) -> ChangesChannel {
        self.launch(RunKind::Spool, config)
    }

    /// Ask the active run to stop once its in-flight request settles.
    pub fn stop(&self) {
        if let Some(run) = lock(&self.active).as_ref() {
            tracing::debug!(db = %self.db, "Stop requested");
            run.control.stop();
        }
    }

    /// Let a run started with `wait` fetch its next batch.
    pub fn resume(&self) {
        if let Some(run) = lock(&self.active).as_ref() {
            run.control.resume();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    fn launch(&self, kind: RunKind, config: PollConfig) -> ChangesChannel {
        let mut active = lock(&self.active);
        if let Some(run) = active.as_ref() {
            if let Some(channel) = run.channel() {
                tracing::debug!(db = %self.db, "Reader already active, reusing its channel");
                return channel;
            }
            // Nobody is listening to the old run any more
            run.control.stop();
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let outcome = Arc::new(OnceLock::new());
        let channel = ChangesChannel::new(rx, Arc::clone(&outcome));
        let control = Arc::new(RunControl::new());
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);

        *active = Some(ActiveRun {
            id: run_id,
            receiver: Arc::downgrade(&channel.receiver),
            outcome: Arc::clone(&outcome),
            control: Arc::clone(&control),
        });
        drop(active);

        tracing::info!(db = %self.db, kind = ?kind, since = %config.since, "Starting changes reader");

        let transport = Arc::clone(&self.transport);
        let db = self.db.clone();
        let slot = Arc::clone(&self.active);

        tokio::spawn(async move {
            let result = match kind {
                RunKind::Poll(mode) => run_poll(transport, db.clone(), config, mode, control, &tx).await,
                RunKind::Spool => run_spool(transport, db.clone(), config, control, &tx).await,
            };

            match &result {
                Ok(cursor) => tracing::info!(db = %db, last_seq = %cursor, "Changes reader finished"),
                Err(ChangesError::Closed) => tracing::debug!(db = %db, "Subscriber went away"),
                Err(error) => tracing::info!(db = %db, "Changes reader ended: {}", error),
            }

            // Back to idle before the channel closes, so a subscriber that sees
            // the end of the stream can start a new run straight away.
            {
                let mut active = lock(&slot);
                if active.as_ref().is_some_and(|run| run.id == run_id) {
                    *active = None;
                }
            }
            let _ = outcome.set(result);
            drop(tx);
        });

        channel
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_wait_parks_until_resumed() {
        let control = RunControl::new();
        let mut wait = task::spawn(control.wait_for_resume());

        assert_pending!(wait.poll());
        control.resume();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_resume_before_wait_is_kept() {
        let control = RunControl::new();
        control.resume();

        let mut wait = task::spawn(control.wait_for_resume());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_stop_releases_parked_run() {
        let control = RunControl::new();
        let mut wait = task::spawn(control.wait_for_resume());

        assert_pending!(wait.poll());
        control.stop();
        assert!(!control.should_continue());
        assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_idle_reader_ignores_stop_and_resume() {
        struct Unused;

        #[async_trait::async_trait]
        impl ChangesTransport for Unused {
            async fn request(
                &self,
                _request: crate::transport::ChangesRequest,
            ) -> Result<crate::types::ChangesResponse> {
                Err(ChangesError::Closed)
            }

            async fn stream(
                &self,
                _request: crate::transport::ChangesRequest,
            ) -> Result<crate::transport::ByteStream> {
                Err(ChangesError::Closed)
            }
        }

        let reader = ChangesReader::new("db", Arc::new(Unused));
        reader.stop();
        reader.resume();
        assert!(!reader.is_active());
        assert_eq!(reader.db(), "db");
    }
}
