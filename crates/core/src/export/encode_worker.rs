use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::export::config_store::{SessionConfigStore, SessionPlan};
use crate::export::frame_queue::{FrameConsumer, Poll};
use crate::export::session_state::{EndReason, SessionReport, SessionState};
use crate::shared::constants::QUEUE_POLL_INTERVAL;
use crate::shared::frame::FrameBuffer;
use crate::video::domain::video_writer::{EncodeError, VideoWriter};

/// One encode session: open the output, drain the queue into it, close it.
///
/// The worker knows nothing about the host. It sees the configuration
/// store, the shared session state, the cancellation flag and its own
/// queue, and ends on cancellation, on encoding being disabled, or when
/// the stream has been silent for longer than the configured timeout.
pub struct EncodeWorker {
    config: Arc<SessionConfigStore>,
    session: Arc<SessionState>,
    cancelled: Arc<AtomicBool>,
    frames: FrameConsumer,
    writer: Box<dyn VideoWriter>,
    frames_written: u64,
    write_errors: u64,
}

impl EncodeWorker {
    pub fn new(
        config: Arc<SessionConfigStore>,
        session: Arc<SessionState>,
        cancelled: Arc<AtomicBool>,
        frames: FrameConsumer,
        writer: Box<dyn VideoWriter>,
    ) -> Self {
        Self {
            config,
            session,
            cancelled,
            frames,
            writer,
            frames_written: 0,
            write_errors: 0,
        }
    }

    /// Runs the session to completion on the calling thread.
    pub fn run(mut self) -> SessionReport {
        let _unwind = IdleOnUnwind(self.session.clone());

        let plan = self.config.begin_session();
        let end_reason = match self.init(&plan) {
            Ok(()) => {
                self.session.mark_running();
                log::info!(
                    "Encoding {} @ {} fps to {}",
                    plan.format.geometry,
                    plan.format.fps,
                    plan.path.display()
                );
                self.encode_loop(plan.timeout)
            }
            Err(e) => {
                log::error!("Error encoding video stream: {e}");
                EndReason::OpenFailed
            }
        };

        self.shutdown(&plan, end_reason)
    }

    fn init(&mut self, plan: &SessionPlan) -> Result<(), EncodeError> {
        if plan.format.geometry.is_empty() {
            return Err(EncodeError::InvalidGeometry(plan.format.geometry));
        }
        if !plan.output_directory.as_os_str().is_empty() && !plan.output_directory.exists() {
            fs::create_dir_all(&plan.output_directory).map_err(|source| {
                EncodeError::CreateDir {
                    path: plan.output_directory.clone(),
                    source,
                }
            })?;
        }
        self.writer.open(&plan.path, &plan.format)
    }

    fn encode_loop(&mut self, timeout: Duration) -> EndReason {
        let mut last_frame = Instant::now();

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                self.drain_queued();
                return EndReason::Cancelled;
            }
            if !self.config.is_encoding_enabled() {
                // A stop may have disabled encoding right after we checked
                if self.cancelled.load(Ordering::SeqCst) {
                    self.drain_queued();
                    return EndReason::Cancelled;
                }
                return EndReason::Disabled;
            }

            match self.frames.pop(QUEUE_POLL_INTERVAL) {
                Poll::Frame(frame) => {
                    self.write_frame(&frame);
                    last_frame = Instant::now();
                }
                Poll::Empty => {
                    let silent = last_frame.elapsed();
                    if silent > timeout {
                        log::info!("No frame for {} ms, ending session", silent.as_millis());
                        self.config.set_encoding_enabled(false);
                        return EndReason::Timeout;
                    }
                }
                // Nothing can feed this session any more
                Poll::Closed => return EndReason::Cancelled,
            }
        }
    }

    /// Writes frames accepted before the stop request into this file.
    fn drain_queued(&mut self) {
        while let Some(frame) = self.frames.try_pop() {
            self.write_frame(&frame);
        }
    }

    fn write_frame(&mut self, frame: &FrameBuffer) {
        match self.writer.write(frame) {
            Ok(()) => self.frames_written += 1,
            Err(e) if e.is_fatal() => {
                log::error!("Error encoding video stream: {e}");
                self.write_errors += 1;
            }
            Err(e) => {
                log::warn!("Dropped frame: {e}");
                self.write_errors += 1;
            }
        }
    }

    fn shutdown(mut self, plan: &SessionPlan, end_reason: EndReason) -> SessionReport {
        if let Err(e) = self.writer.close() {
            log::error!("Error closing video stream: {e}");
        }

        let discarded = self.frames.discard_pending();
        if discarded > 0 {
            log::debug!("Discarded {discarded} queued frames");
        }

        let report = SessionReport {
            path: plan.path.clone(),
            frames_written: self.frames_written,
            write_errors: self.write_errors,
            end_reason,
        };
        log::info!(
            "Session ended ({:?}): {} frames written to {}",
            report.end_reason,
            report.frames_written,
            report.path.display()
        );
        self.session.finish(report.clone());
        report
    }
}

/// Clears the in-progress flag if the worker panics, so the next frame
/// can start a fresh session.
struct IdleOnUnwind(Arc<SessionState>);

impl Drop for IdleOnUnwind {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.mark_idle();
        }
    }
}
