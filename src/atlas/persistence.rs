//! Debounced snapshotting of the store to durable storage.
//!
//! The bridge listens to store events and, once no event has arrived for
//! the debounce window, writes the canvas snapshot to `canvas_<id>`. The
//! session record is rewritten too when one of the coalesced events touched
//! the session. The first event after mount never triggers a save: it is the
//! load that installed the state being persisted.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::store::{validate_snapshot, AtlasStore, StoreEvent};
use super::types::CanvasSnapshot;
use crate::error::StorageResult;
use crate::storage::{self, canvas_key, KeyValueStore};

/// How [`restore`] initialised the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Tree and UI state came from the canvas record.
    Rehydrated,
    /// Session loaded, no usable canvas record; store shows the compass.
    Fresh,
    /// No session record; store untouched.
    MissingSession,
}

/// Load a session and its canvas record into the store.
pub async fn restore(
    store: &AtlasStore,
    storage: &dyn KeyValueStore,
    session_id: &str,
) -> StorageResult<RestoreOutcome> {
    let Some(session) = storage::load_session(storage, session_id).await? else {
        warn!(session_id, "No session record found");
        return Ok(RestoreOutcome::MissingSession);
    };

    let snapshot = load_snapshot(storage, session_id).await?;
    let outcome = if snapshot.is_some() {
        RestoreOutcome::Rehydrated
    } else {
        RestoreOutcome::Fresh
    };

    store.load_session(session, snapshot);
    info!(session_id, ?outcome, "Session restored");
    Ok(outcome)
}

/// Read the canvas record; malformed records are logged and ignored.
pub async fn load_snapshot(
    storage: &dyn KeyValueStore,
    session_id: &str,
) -> StorageResult<Option<CanvasSnapshot>> {
    let Some(value) = storage.get(&canvas_key(session_id)).await? else {
        return Ok(None);
    };

    let well_formed = value.get("nodes").is_some_and(|v| v.is_array())
        && value.get("edges").is_some_and(|v| v.is_array());
    if !well_formed {
        warn!(session_id, "Canvas record lacks nodes/edges, ignoring");
        return Ok(None);
    }

    let snapshot: CanvasSnapshot = match serde_json::from_value(value) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(session_id, error = %e, "Malformed canvas record, ignoring");
            return Ok(None);
        }
    };

    if let Err(e) = validate_snapshot(&snapshot) {
        warn!(session_id, error = %e, "Canvas record is not a valid tree, ignoring");
        return Ok(None);
    }
    Ok(Some(snapshot))
}

/// Mounts the background persistence task.
pub struct PersistenceBridge;

impl PersistenceBridge {
    /// Start persisting `store` for `session_id`. Must be called inside a tokio runtime.
    pub fn mount(
        store: AtlasStore,
        storage: Arc<dyn KeyValueStore>,
        session_id: impl Into<String>,
        debounce: Duration,
    ) -> PersistenceHandle {
        let (control_tx, control_rx) = mpsc::channel(1);
        let worker = Worker {
            events: store.subscribe(),
            store,
            storage,
            session_id: session_id.into(),
            debounce,
            control: control_rx,
            seen_first: false,
            pending: false,
            session_dirty: false,
            deadline: None,
        };

        PersistenceHandle {
            control: control_tx,
            task: tokio::spawn(worker.run()),
        }
    }
}

/// Handle to a mounted bridge.
pub struct PersistenceHandle {
    control: mpsc::Sender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PersistenceHandle {
    /// Write any pending snapshot now and stop the task.
    pub async fn flush(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "Persistence task ended abnormally");
        }
    }
}

enum Step {
    Event(Result<StoreEvent, RecvError>),
    Deadline,
    Flush(Option<oneshot::Sender<()>>),
}

struct Worker {
    store: AtlasStore,
    storage: Arc<dyn KeyValueStore>,
    session_id: String,
    debounce: Duration,
    events: broadcast::Receiver<StoreEvent>,
    control: mpsc::Receiver<oneshot::Sender<()>>,
    seen_first: bool,
    pending: bool,
    session_dirty: bool,
    deadline: Option<Instant>,
}

impl Worker {
    async fn run(mut self) {
        debug!(session_id = %self.session_id, "Persistence bridge mounted");

        loop {
            let armed = self.deadline.is_some();
            let deadline = self.deadline.unwrap_or_else(Instant::now);

            let step = tokio::select! {
                received = self.events.recv() => Step::Event(received),
                _ = tokio::time::sleep_until(deadline), if armed => Step::Deadline,
                ack = self.control.recv() => Step::Flush(ack),
            };

            match step {
                Step::Event(Ok(event)) => self.note(&event),
                Step::Event(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Persistence bridge lagged behind store events");
                    self.mark_dirty(true);
                }
                Step::Event(Err(RecvError::Closed)) => {
                    self.write_pending().await;
                    return;
                }
                Step::Deadline => self.write_pending().await,
                Step::Flush(ack) => {
                    self.drain();
                    self.write_pending().await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    debug!(session_id = %self.session_id, "Persistence bridge stopped");
                    return;
                }
            }
        }
    }

    fn note(&mut self, event: &StoreEvent) {
        if !self.seen_first {
            self.seen_first = true;
            debug!(?event, "Skipping first store change after mount");
            return;
        }
        self.mark_dirty(event.touches_session());
    }

    fn mark_dirty(&mut self, session: bool) {
        self.pending = true;
        self.session_dirty |= session;
        self.deadline = Some(Instant::now() + self.debounce);
    }

    /// Pull events already queued so a flush sees them.
    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.note(&event),
                Err(TryRecvError::Lagged(_)) => self.mark_dirty(true),
                Err(_) => break,
            }
        }
    }

    async fn write_pending(&mut self) {
        self.deadline = None;
        if !self.pending {
            return;
        }
        self.pending = false;
        let session_dirty = std::mem::take(&mut self.session_dirty);

        let (snapshot, session) = self.store.read(|s| (s.snapshot(), s.session.clone()));
        let Some(session) = session.filter(|s| s.session_id == self.session_id) else {
            debug!(session_id = %self.session_id, "Store holds another session, skipping save");
            return;
        };

        let key = canvas_key(&self.session_id);
        match storage::save_json(self.storage.as_ref(), &key, &snapshot).await {
            Ok(()) => debug!(
                session_id = %self.session_id,
                nodes = snapshot.nodes.len(),
                "Canvas snapshot saved"
            ),
            Err(e) => warn!(session_id = %self.session_id, error = %e, "Failed to save canvas"),
        }

        if session_dirty {
            if let Err(e) = storage::save_session(self.storage.as_ref(), &session).await {
                warn!(session_id = %self.session_id, error = %e, "Failed to save session");
            }
        }
    }
}
