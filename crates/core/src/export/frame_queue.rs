use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::shared::frame::FrameBuffer;

/// Creates the unbounded FIFO that hands frames from the ingestion side
/// to one encode session.
///
/// Each session gets its own queue: dropping the consumer when the session
/// ends discards whatever was still queued, and later pushes through a
/// stale producer are refused instead of leaking into the next session.
pub fn frame_queue() -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (FrameProducer { tx }, FrameConsumer { rx })
}

#[derive(Clone, Debug)]
pub struct FrameProducer {
    tx: Sender<FrameBuffer>,
}

impl FrameProducer {
    /// Enqueues a frame. Returns `false` if the consuming session is gone.
    pub fn push(&self, frame: FrameBuffer) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Outcome of waiting on the queue.
#[derive(Debug)]
pub enum Poll {
    Frame(FrameBuffer),
    Empty,
    /// Every producer was dropped and the queue is drained.
    Closed,
}

#[derive(Debug)]
pub struct FrameConsumer {
    rx: Receiver<FrameBuffer>,
}

impl FrameConsumer {
    /// Pops the oldest frame, waiting at most `wait` for one to arrive.
    pub fn pop(&self, wait: Duration) -> Poll {
        match self.rx.recv_timeout(wait) {
            Ok(frame) => Poll::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }

    /// Pops the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<FrameBuffer> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drops every queued frame, returning how many were discarded.
    pub fn discard_pending(&self) -> usize {
        self.rx.try_iter().count()
    }
}
