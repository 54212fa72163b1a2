//! Stub writer and helpers shared by the exporter tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::shared::frame::{FrameBuffer, StreamGeometry};
use crate::video::domain::video_writer::{EncodeError, VideoFormat, VideoWriter, WriterFactory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Open(PathBuf, StreamGeometry),
    Write(u8),
    Close(PathBuf),
}

/// Records every writer call across all sessions of one exporter.
#[derive(Default)]
pub struct WriterLog {
    events: Mutex<Vec<Event>>,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    panic_on_tag: Mutex<Option<u8>>,
}

impl WriterLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn factory(self: &Arc<Self>) -> WriterFactory {
        let log = self.clone();
        Arc::new(move || -> Box<dyn VideoWriter> {
            Box::new(RecordingWriter {
                log: log.clone(),
                path: None,
            })
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open(path, _) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Close(_)))
            .count()
    }

    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn panic_on(&self, tag: u8) {
        *self.panic_on_tag.lock().unwrap() = Some(tag);
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

struct RecordingWriter {
    log: Arc<WriterLog>,
    path: Option<PathBuf>,
}

impl VideoWriter for RecordingWriter {
    fn open(&mut self, path: &Path, format: &VideoFormat) -> Result<(), EncodeError> {
        let now = self.log.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_open.fetch_max(now, Ordering::SeqCst);
        // Widen the window in which a second writer could sneak in
        thread::sleep(Duration::from_millis(5));
        self.path = Some(path.to_path_buf());
        self.log.push(Event::Open(path.to_path_buf(), format.geometry));
        Ok(())
    }

    fn write(&mut self, frame: &FrameBuffer) -> Result<(), EncodeError> {
        let tag = frame.data()[0];
        if *self.log.panic_on_tag.lock().unwrap() == Some(tag) {
            panic!("writer exploded on frame {tag}");
        }
        self.log.push(Event::Write(tag));
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        if let Some(path) = self.path.take() {
            self.log.push(Event::Close(path));
            self.log.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// RGBA frame for `geometry` whose bytes are all `tag`.
pub fn tagged_frame(geometry: StreamGeometry, tag: u8) -> FrameBuffer {
    FrameBuffer::new(vec![tag; geometry.frame_len()])
}

/// Polls `condition` until it holds or `limit` elapses.
pub fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
