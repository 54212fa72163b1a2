use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::export::config_store::SessionConfigStore;
use crate::export::encode_worker::EncodeWorker;
use crate::export::frame_queue::{frame_queue, FrameProducer};
use crate::export::session_state::{LifecycleState, SessionReport, SessionState};
use crate::shared::constants::WORKER_THREAD_NAME;
use crate::shared::frame::StreamGeometry;
use crate::video::domain::video_writer::WriterFactory;

type WorkerSlot = Option<JoinHandle<SessionReport>>;

/// Starts, stops and restarts the encode worker.
///
/// At most one worker exists at a time: every transition holds the worker
/// slot lock, cancels and joins the previous thread, and only then launches
/// a new one. The worker itself never touches the slot, so joining while
/// holding it cannot deadlock.
pub struct LifecycleController {
    config: Arc<SessionConfigStore>,
    session: Arc<SessionState>,
    cancelled: Arc<AtomicBool>,
    writers: WriterFactory,
    worker: Mutex<WorkerSlot>,
}

impl LifecycleController {
    pub fn new(config: Arc<SessionConfigStore>, writers: WriterFactory) -> Self {
        Self {
            config,
            session: Arc::new(SessionState::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            writers,
            worker: Mutex::new(None),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn last_session_report(&self) -> Option<SessionReport> {
        self.session.last_report()
    }

    /// Queue of the running session, starting one if none is active.
    ///
    /// Returns `None` when encoding is disabled or the worker thread could
    /// not be spawned.
    pub fn start_encoding(&self) -> Option<FrameProducer> {
        if let Some(producer) = self.session.active_producer() {
            return Some(producer);
        }

        let mut slot = self.worker_slot();
        // Another caller may have started a session while we waited
        if let Some(producer) = self.session.active_producer() {
            return Some(producer);
        }
        if !self.config.is_encoding_enabled() {
            return None;
        }

        self.stop_worker(&mut slot, || {});

        let (producer, consumer) = frame_queue();
        self.session.begin(producer.clone());

        let config = self.config.clone();
        let session = self.session.clone();
        let cancelled = self.cancelled.clone();
        let writers = self.writers.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                EncodeWorker::new(config, session, cancelled, consumer, writers()).run()
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Some(producer)
            }
            Err(e) => {
                log::error!("Failed to spawn encode worker: {e}");
                self.session.mark_idle();
                None
            }
        }
    }

    /// Disables encoding and waits for the current session to finish.
    /// Does nothing beyond that when no worker exists.
    ///
    /// Frames already queued are encoded before the file is closed, so the
    /// call blocks for as long as that backlog takes to write.
    pub fn end_encoding(&self) {
        let mut slot = self.worker_slot();
        self.stop_worker(&mut slot, || self.config.set_encoding_enabled(false));
    }

    /// Finalizes the current session and re-enables encoding; the next
    /// accepted frame starts a new file.
    pub fn change_encoding(&self) {
        self.restart(None);
    }

    /// Like `change_encoding`, storing `geometry` once the old session has
    /// closed its file. Blocks until the old session's queued frames are
    /// written, like `end_encoding`.
    pub fn change_geometry(&self, geometry: StreamGeometry) {
        self.restart(Some(geometry));
    }

    fn restart(&self, geometry: Option<StreamGeometry>) {
        let mut slot = self.worker_slot();
        self.stop_worker(&mut slot, || self.config.set_encoding_enabled(false));
        if let Some(geometry) = geometry {
            log::debug!("Stream geometry is now {geometry}");
            self.config.set_geometry(geometry);
        }
        self.config.set_encoding_enabled(true);
    }

    /// Cancels and joins the worker in `slot`, then clears cancellation.
    ///
    /// `on_cancel` runs after the cancel flag is raised and before the
    /// join, so a worker never sees its stop without the cancellation.
    fn stop_worker(&self, slot: &mut WorkerSlot, on_cancel: impl FnOnce()) {
        if let Some(handle) = slot.take() {
            self.cancelled.store(true, Ordering::SeqCst);
            on_cancel();
            self.session.mark_stopping();
            if handle.join().is_err() {
                log::error!("Encode worker panicked");
            }
            self.session.mark_idle();
        } else {
            on_cancel();
        }
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.end_encoding();
    }
}
