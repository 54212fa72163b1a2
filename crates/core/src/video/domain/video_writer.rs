use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::shared::frame::{FrameBuffer, StreamGeometry};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid stream geometry {0}")]
    InvalidGeometry(StreamGeometry),
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open '{path}' for writing: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("failed to encode frame {index}: {reason}")]
    Write { index: u64, reason: String },
    #[error("failed to finalize output: {0}")]
    Close(String),
    #[error("writer is not open")]
    NotOpen,
}

impl EncodeError {
    /// True for errors that prevent a session from producing a file.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EncodeError::Write { .. })
    }
}

/// Fixed stream parameters a writer is opened with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoFormat {
    pub geometry: StreamGeometry,
    pub fps: u32,
}

/// Abstracts video encoding so the exporter can write output without
/// depending on a specific codec library.
pub trait VideoWriter: Send {
    fn open(&mut self, path: &Path, format: &VideoFormat) -> Result<(), EncodeError>;

    /// Encodes one RGBA frame. The buffer may be longer than one frame;
    /// trailing bytes are ignored.
    fn write(&mut self, frame: &FrameBuffer) -> Result<(), EncodeError>;

    /// Flushes pending packets and finalizes the container. Calling it on
    /// a writer that is not open is a no-op.
    fn close(&mut self) -> Result<(), EncodeError>;
}

/// Builds a fresh writer for each encode session.
pub type WriterFactory = Arc<dyn Fn() -> Box<dyn VideoWriter> + Send + Sync>;
