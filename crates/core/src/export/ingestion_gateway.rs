use std::sync::Arc;

use crate::export::config_store::SessionConfigStore;
use crate::export::lifecycle_controller::LifecycleController;
use crate::shared::frame::FrameBuffer;

/// Entry point for frames pushed by the upstream source.
///
/// Undersized frames and frames arriving while encoding is disabled are
/// dropped without complaint; the producer never sees an error and never
/// waits on encoder I/O.
pub struct IngestionGateway {
    config: Arc<SessionConfigStore>,
    lifecycle: Arc<LifecycleController>,
}

impl IngestionGateway {
    pub fn new(config: Arc<SessionConfigStore>, lifecycle: Arc<LifecycleController>) -> Self {
        Self { config, lifecycle }
    }

    /// Routes a batch of frames to the active session, starting one if
    /// needed. Returns how many frames were queued.
    pub fn push(&self, frames: &[FrameBuffer]) -> usize {
        if frames.is_empty() {
            return 0;
        }
        let geometry = self.config.geometry();
        if geometry.is_empty() {
            return 0;
        }

        let mut accepted = 0;
        for frame in frames {
            if !frame.fits(geometry) {
                continue;
            }
            if !self.config.is_encoding_enabled() {
                continue;
            }
            let Some(producer) = self.lifecycle.start_encoding() else {
                continue;
            };
            if producer.push(frame.clone()) {
                accepted += 1;
            }
        }
        accepted
    }
}
