use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::shared::constants::{COUNTER_DIGITS, OUTPUT_EXTENSION};
use crate::shared::frame::StreamGeometry;
use crate::shared::session_config::{ConfigError, SessionConfig};
use crate::video::domain::video_writer::VideoFormat;

/// Everything an encode session needs, captured in one critical section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPlan {
    pub output_directory: PathBuf,
    pub path: PathBuf,
    pub format: VideoFormat,
    pub timeout: Duration,
}

struct Settings {
    config: SessionConfig,
    geometry: StreamGeometry,
    counter: u32,
}

/// Guarded configuration, stream geometry and session counter of one
/// exporter instance.
///
/// The encoding-enabled flag lives outside the settings lock because the
/// ingestion path and the encode loop read it on every frame.
pub struct SessionConfigStore {
    settings: Mutex<Settings>,
    encoding_enabled: AtomicBool,
}

impl SessionConfigStore {
    pub fn new(config: SessionConfig) -> Self {
        let enabled = config.encoding_enabled;
        Self {
            settings: Mutex::new(Settings {
                config,
                geometry: StreamGeometry::default(),
                counter: 0,
            }),
            encoding_enabled: AtomicBool::new(enabled),
        }
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current configuration, including the live encoding-enabled flag.
    pub fn snapshot(&self) -> SessionConfig {
        let mut config = self.settings().config.clone();
        config.encoding_enabled = self.is_encoding_enabled();
        config
    }

    pub fn replace(&self, config: SessionConfig) {
        let enabled = config.encoding_enabled;
        self.settings().config = config;
        self.set_encoding_enabled(enabled);
    }

    /// Edits the configuration in place under the settings lock.
    pub fn update(&self, edit: impl FnOnce(&mut SessionConfig)) {
        let mut settings = self.settings();
        settings.config.encoding_enabled = self.is_encoding_enabled();
        edit(&mut settings.config);
        self.set_encoding_enabled(settings.config.encoding_enabled);
    }

    /// Applies one host property; on error the configuration is unchanged.
    pub fn set_property(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        self.try_update(|config| config.set_property(name, value))
    }

    fn try_update(
        &self,
        edit: impl FnOnce(&mut SessionConfig) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut settings = self.settings();
        let mut config = settings.config.clone();
        config.encoding_enabled = self.is_encoding_enabled();
        edit(&mut config)?;
        self.set_encoding_enabled(config.encoding_enabled);
        settings.config = config;
        Ok(())
    }

    pub fn is_encoding_enabled(&self) -> bool {
        self.encoding_enabled.load(Ordering::SeqCst)
    }

    pub fn set_encoding_enabled(&self, enabled: bool) {
        self.encoding_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.settings().geometry
    }

    pub fn set_geometry(&self, geometry: StreamGeometry) {
        self.settings().geometry = geometry;
    }

    pub fn counter(&self) -> u32 {
        self.settings().counter
    }

    pub fn reset_counter(&self) {
        self.settings().counter = 0;
    }

    /// Host initialization: counter back to zero, encoding allowed.
    pub fn initialize(&self) {
        let mut settings = self.settings();
        settings.counter = 0;
        self.set_encoding_enabled(true);
    }

    /// Snapshots the settings for a new session and advances the counter
    /// when file names carry it.
    pub fn begin_session(&self) -> SessionPlan {
        let mut settings = self.settings();
        let config = &settings.config;

        let mut name = config.output_base_name.clone();
        let use_counter = config.use_counter_suffix;
        if use_counter {
            name.push_str(&format!("{:0width$}", settings.counter, width = COUNTER_DIGITS));
        }

        let output_directory = config.output_directory.clone();
        let path = output_directory.join(format!("{name}.{OUTPUT_EXTENSION}"));
        let plan = SessionPlan {
            output_directory,
            path,
            format: VideoFormat {
                geometry: settings.geometry,
                fps: config.frames_per_second,
            },
            timeout: Duration::from_millis(u64::from(config.timeout_ms)),
        };

        if use_counter {
            settings.counter += 1;
        }
        plan
    }
}
