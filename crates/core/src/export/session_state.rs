use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::export::frame_queue::FrameProducer;

/// Where the exporter is in its start/stop cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    /// A worker was launched and is opening its output.
    Starting,
    Running,
    /// A caller is cancelling the worker and waiting for it to exit.
    Stopping,
}

/// Why an encode session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// No frame arrived within the configured timeout.
    Timeout,
    Cancelled,
    /// Encoding was switched off through the configuration.
    Disabled,
    OpenFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub path: PathBuf,
    pub frames_written: u64,
    pub write_errors: u64,
    pub end_reason: EndReason,
}

struct Inner {
    state: LifecycleState,
    producer: Option<FrameProducer>,
    last_report: Option<SessionReport>,
}

/// The encoding-in-progress flag shared by callers and the worker,
/// together with the queue feeding the active session.
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Idle,
                producer: None,
                last_report: None,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LifecycleState {
        self.inner().state
    }

    /// Queue of the session currently accepting frames, if any.
    pub fn active_producer(&self) -> Option<FrameProducer> {
        let inner = self.inner();
        match inner.state {
            LifecycleState::Starting | LifecycleState::Running => inner.producer.clone(),
            LifecycleState::Idle | LifecycleState::Stopping => None,
        }
    }

    pub(crate) fn begin(&self, producer: FrameProducer) {
        let mut inner = self.inner();
        inner.state = LifecycleState::Starting;
        inner.producer = Some(producer);
    }

    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner();
        if inner.state == LifecycleState::Starting {
            inner.state = LifecycleState::Running;
        }
    }

    pub(crate) fn mark_stopping(&self) {
        let mut inner = self.inner();
        inner.producer = None;
        inner.state = LifecycleState::Stopping;
    }

    /// Clears the active session. Safe to call more than once.
    pub(crate) fn mark_idle(&self) {
        let mut inner = self.inner();
        inner.producer = None;
        inner.state = LifecycleState::Idle;
    }

    pub(crate) fn finish(&self, report: SessionReport) {
        let mut inner = self.inner();
        inner.producer = None;
        if inner.state != LifecycleState::Stopping {
            inner.state = LifecycleState::Idle;
        }
        inner.last_report = Some(report);
    }

    pub fn last_report(&self) -> Option<SessionReport> {
        self.inner().last_report.clone()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
