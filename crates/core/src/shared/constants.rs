use std::time::Duration;

/// Incoming frames are RGBA, 8 bits per channel.
pub const BYTES_PER_PIXEL: usize = 4;

pub const DEFAULT_FPS: u32 = 25;
pub const DEFAULT_TIMEOUT_MS: u32 = 2000;
pub const DEFAULT_BASE_NAME: &str = "Output";

pub const OUTPUT_EXTENSION: &str = "avi";

/// Width of the zero-padded session counter appended to file names.
pub const COUNTER_DIGITS: usize = 3;

/// Longest the worker waits on an empty queue before re-checking
/// cancellation and the stall timeout.
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const WORKER_THREAD_NAME: &str = "video-exporter-worker";
