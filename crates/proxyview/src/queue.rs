//! Bounded single-producer / single-consumer frame queue.
//!
//! Backpressure is drop-newest: a push into a full queue is rejected and the
//! queue is left untouched. Popping never blocks.

use crate::error::{PipelineError, Result};
use crate::frame::SharedFrame;

/// Result of offering a frame to a [`FrameProducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PushOutcome {
    /// The frame was queued.
    Accepted,
    /// The queue was full; the frame was discarded.
    Dropped,
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// Writing half of a bounded frame queue. Not `Clone`: one writer per queue.
pub struct FrameProducer {
    tx: flume::Sender<SharedFrame>,
}

/// Reading half of a bounded frame queue. Not `Clone`: one reader per queue.
pub struct FrameConsumer {
    rx: flume::Receiver<SharedFrame>,
}

/// Create a queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize) -> Result<(FrameProducer, FrameConsumer)> {
    if capacity == 0 {
        return Err(PipelineError::ZeroCapacity);
    }
    let (tx, rx) = flume::bounded(capacity);
    Ok((FrameProducer { tx }, FrameConsumer { rx }))
}

impl FrameProducer {
    /// Offer a frame without blocking.
    pub fn push(&self, frame: SharedFrame) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Accepted,
            // A disconnected reader can never drain the queue, which is the
            // same as being permanently full.
            Err(flume::TrySendError::Full(_)) | Err(flume::TrySendError::Disconnected(_)) => {
                PushOutcome::Dropped
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl FrameConsumer {
    /// Take the oldest queued frame, or `None` when drained.
    pub fn pop(&self) -> Option<SharedFrame> {
        self.rx.try_recv().ok()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
