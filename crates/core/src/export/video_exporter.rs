use std::sync::Arc;

use crate::export::config_store::SessionConfigStore;
use crate::export::ingestion_gateway::IngestionGateway;
use crate::export::lifecycle_controller::LifecycleController;
use crate::export::session_state::{LifecycleState, SessionReport};
use crate::shared::frame::{FrameBuffer, StreamGeometry};
use crate::shared::session_config::{ConfigError, SessionConfig};
use crate::video::domain::video_writer::{VideoWriter, WriterFactory};
use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;

/// Host-facing adapter: translates connection events, frame pushes and
/// lifecycle hooks into calls on the exporter core.
///
/// One instance owns all of its state; several exporters can run side by
/// side without sharing anything.
pub struct VideoExporter {
    config: Arc<SessionConfigStore>,
    lifecycle: Arc<LifecycleController>,
    gateway: IngestionGateway,
}

impl VideoExporter {
    pub fn new(config: SessionConfig, writers: WriterFactory) -> Self {
        let config = Arc::new(SessionConfigStore::new(config));
        let lifecycle = Arc::new(LifecycleController::new(config.clone(), writers));
        let gateway = IngestionGateway::new(config.clone(), lifecycle.clone());
        Self {
            config,
            lifecycle,
            gateway,
        }
    }

    /// Exporter writing MJPEG/AVI files through FFmpeg.
    pub fn with_ffmpeg(config: SessionConfig) -> Self {
        Self::new(
            config,
            Arc::new(|| -> Box<dyn VideoWriter> { Box::new(FfmpegWriter::new()) }),
        )
    }

    /// Allows encoding and restarts file numbering at zero.
    pub fn initialize(&self) {
        self.config.initialize();
    }

    /// Ends any running session; returns once its file is closed.
    pub fn terminate(&self) {
        self.lifecycle.end_encoding();
    }

    pub fn push_frames(&self, frames: &[FrameBuffer]) -> usize {
        self.gateway.push(frames)
    }

    pub fn on_connect(&self, width: u32, height: u32) {
        log::info!("Source connected ({width}x{height})");
        self.lifecycle
            .change_geometry(StreamGeometry::new(width, height));
    }

    pub fn on_geometry_changed(&self, width: u32, height: u32) {
        log::info!("Source geometry changed to {width}x{height}");
        self.lifecycle
            .change_geometry(StreamGeometry::new(width, height));
    }

    pub fn on_disconnect(&self) {
        log::info!("Source disconnected");
        self.lifecycle.end_encoding();
    }

    pub fn config(&self) -> SessionConfig {
        self.config.snapshot()
    }

    pub fn set_config(&self, config: SessionConfig) {
        self.config.replace(config);
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        self.config.set_property(name, value)
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.config.geometry()
    }

    pub fn reset_counter(&self) {
        self.config.reset_counter();
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn last_session_report(&self) -> Option<SessionReport> {
        self.lifecycle.last_session_report()
    }
}

impl Drop for VideoExporter {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::session_state::EndReason;
    use crate::export::testing::{tagged_frame, wait_until, Event, WriterLog};
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn exporter(timeout_ms: u32) -> (VideoExporter, Arc<WriterLog>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = WriterLog::new();
        let exporter = VideoExporter::new(
            SessionConfig {
                output_directory: dir.path().to_path_buf(),
                output_base_name: "Run".into(),
                timeout_ms,
                ..SessionConfig::default()
            },
            log.factory(),
        );
        exporter.initialize();
        (exporter, log, dir)
    }

    fn names(paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_frames_before_connect_are_dropped() {
        let (exporter, log, _dir) = exporter(60_000);
        assert_eq!(exporter.push_frames(&[FrameBuffer::new(vec![0u8; 64])]), 0);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_terminate_blocks_until_all_pushed_frames_written() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        let geometry = exporter.geometry();
        for tag in 0..20 {
            exporter.push_frames(&[tagged_frame(geometry, tag)]);
        }

        exporter.terminate();

        assert_eq!(log.open_now(), 0);
        assert_eq!(log.written(), (0..20).collect::<Vec<u8>>());
        assert!(matches!(log.events().last(), Some(Event::Close(_))));
        assert_eq!(exporter.state(), LifecycleState::Idle);
    }

    #[test]
    fn test_three_sessions_get_counter_suffixes() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        for tag in 0..3 {
            exporter.push_frames(&[tagged_frame(exporter.geometry(), tag)]);
            assert!(wait_until(WAIT, || log.written().len() == tag as usize + 1));
            exporter.on_connect(2, 2);
        }
        assert_eq!(
            names(log.opened_paths()),
            vec!["Run000.avi", "Run001.avi", "Run002.avi"]
        );
    }

    #[test]
    fn test_geometry_change_starts_new_file_with_new_size() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 1)]);
        assert!(wait_until(WAIT, || log.written() == vec![1]));

        exporter.on_geometry_changed(4, 4);
        let small = tagged_frame(StreamGeometry::new(2, 2), 2);
        let large = tagged_frame(StreamGeometry::new(4, 4), 3);
        assert_eq!(exporter.push_frames(&[small, large]), 1);
        assert!(wait_until(WAIT, || log.written() == vec![1, 3]));
        exporter.terminate();

        let opens: Vec<_> = log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open(_, geometry) => Some(geometry),
                _ => None,
            })
            .collect();
        assert_eq!(opens, vec![StreamGeometry::new(2, 2), StreamGeometry::new(4, 4)]);
        assert_eq!(log.max_open(), 1);
    }

    #[test]
    fn test_disconnect_finalizes_and_stops_encoding() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 1)]);
        assert!(wait_until(WAIT, || log.written() == vec![1]));

        exporter.on_disconnect();
        assert_eq!(log.close_count(), 1);
        assert!(!exporter.config().encoding_enabled);
        assert_eq!(exporter.push_frames(&[tagged_frame(exporter.geometry(), 2)]), 0);
    }

    #[test]
    fn test_reconnect_after_disconnect_resumes() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        exporter.on_disconnect();
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 5)]);
        assert!(wait_until(WAIT, || log.written() == vec![5]));
    }

    #[test]
    fn test_stall_timeout_finalizes_file() {
        let (exporter, log, _dir) = exporter(80);
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 1)]);

        assert!(wait_until(WAIT, || exporter.state() == LifecycleState::Idle
            && log.close_count() == 1));
        let report = exporter.last_session_report().unwrap();
        assert_eq!(report.end_reason, EndReason::Timeout);
        assert_eq!(report.frames_written, 1);
    }

    #[test]
    fn test_steady_frames_keep_one_session_alive() {
        let (exporter, log, _dir) = exporter(400);
        exporter.on_connect(2, 2);
        for tag in 0..10 {
            exporter.push_frames(&[tagged_frame(exporter.geometry(), tag)]);
            thread::sleep(Duration::from_millis(50));
        }
        exporter.terminate();
        assert_eq!(log.opened_paths().len(), 1);
        assert_eq!(log.written().len(), 10);
    }

    #[test]
    fn test_initialize_resets_counter() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 1)]);
        assert!(wait_until(WAIT, || log.written().len() == 1));
        exporter.terminate();

        exporter.initialize();
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 2)]);
        assert!(wait_until(WAIT, || log.written().len() == 2));
        exporter.terminate();

        assert_eq!(names(log.opened_paths()), vec!["Run000.avi", "Run000.avi"]);
    }

    #[test]
    fn test_property_surface_controls_naming() {
        let (exporter, log, _dir) = exporter(60_000);
        exporter.set_property("useCounterSuffix", "false").unwrap();
        exporter.set_property("outputFileBaseName", "Plain").unwrap();
        exporter.on_connect(2, 2);
        exporter.push_frames(&[tagged_frame(exporter.geometry(), 1)]);
        assert!(wait_until(WAIT, || log.written().len() == 1));
        exporter.terminate();

        assert_eq!(names(log.opened_paths()), vec!["Plain.avi"]);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (exporter, _log, _dir) = exporter(60_000);
        exporter.terminate();
        exporter.terminate();
        assert_eq!(exporter.state(), LifecycleState::Idle);
    }

    #[test]
    fn test_ffmpeg_exporter_writes_playable_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VideoExporter::with_ffmpeg(SessionConfig {
            output_directory: dir.path().join("nested"),
            output_base_name: "Real".into(),
            timeout_ms: 60_000,
            ..SessionConfig::default()
        });
        exporter.initialize();
        exporter.on_connect(32, 16);
        for tag in 0..4 {
            exporter.push_frames(&[tagged_frame(exporter.geometry(), tag * 50)]);
        }
        exporter.terminate();

        let report = exporter.last_session_report().unwrap();
        assert_eq!(report.frames_written, 4);
        assert_eq!(report.path, dir.path().join("nested").join("Real000.avi"));
        assert!(std::fs::metadata(&report.path).unwrap().len() > 0);
    }
}
