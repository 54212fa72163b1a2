use std::sync::Arc;

use crate::shared::constants::BYTES_PER_PIXEL;

/// A single RGBA8 frame as delivered by the upstream source.
///
/// The pixel bytes are shared with the producer and never copied or
/// mutated here; cloning a buffer only bumps a reference count.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    data: Arc<[u8]>,
}

impl FrameBuffer {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if the buffer holds at least one full frame of `geometry`.
    pub fn fits(&self, geometry: StreamGeometry) -> bool {
        self.len() >= geometry.frame_len()
    }

    /// True if both buffers reference the same underlying bytes.
    pub fn shares_data_with(&self, other: &FrameBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl From<Vec<u8>> for FrameBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Pixel dimensions of the connected stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
}

impl StreamGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero in either dimension means no source is connected.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Minimum number of bytes an RGBA8 frame of this size occupies.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for StreamGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
