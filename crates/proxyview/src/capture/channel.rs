//! Application-fed source: frames are pushed through a [`ChannelFeed`] and read
//! back by the source reader opened on `channel://NAME`.

use super::{CancelHandle, CaptureBackend, CaptureDevice};
use crate::error::CaptureError;
use crate::frame::Frame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(super) const SCHEME: &str = "channel://";

enum FeedItem {
    Frame(Frame),
    Failure(String),
    Cancel,
}

/// Sending side of a named channel source.
#[derive(Clone)]
pub struct ChannelFeed {
    tx: flume::Sender<FeedItem>,
}

impl ChannelFeed {
    /// Hand a frame to the reader.
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(FeedItem::Frame(frame));
    }

    /// Make one read fail with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(FeedItem::Failure(reason.into()));
    }

    /// Items sent but not yet read.
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }
}

struct Registration {
    rx: flume::Receiver<FeedItem>,
    tx: flume::Sender<FeedItem>,
}

/// Registry of named channel sources.
///
/// Each name can be opened once; the device takes ownership of the receiver.
#[derive(Clone, Default)]
pub struct ChannelBackend {
    pending: Arc<Mutex<HashMap<String, Registration>>>,
}

impl ChannelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` and return the feed that supplies its frames.
    ///
    /// Registering a name again replaces the previous, unopened registration.
    pub fn register(&self, name: &str) -> ChannelFeed {
        let (tx, rx) = flume::unbounded();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Registration { rx, tx: tx.clone() });
        ChannelFeed { tx }
    }
}

impl CaptureBackend for ChannelBackend {
    fn open(&self, descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let name = descriptor
            .strip_prefix(SCHEME)
            .ok_or_else(|| CaptureError::Unsupported(descriptor.to_string()))?;
        let registration = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .ok_or_else(|| CaptureError::Open {
                descriptor: descriptor.to_string(),
                reason: format!("no feed registered as '{}'", name),
            })?;
        log::debug!("Opened channel source '{}'", name);
        Ok(Box::new(ChannelDevice {
            rx: registration.rx,
            cancel_tx: registration.tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct ChannelDevice {
    rx: flume::Receiver<FeedItem>,
    // Keeps the channel open once every feed is dropped, so a quiet feed
    // blocks like an idle camera and cancel can always reach the read.
    cancel_tx: flume::Sender<FeedItem>,
    cancelled: Arc<AtomicBool>,
}

impl CaptureDevice for ChannelDevice {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(CaptureError::Cancelled);
        }
        match self.rx.recv() {
            Ok(FeedItem::Frame(frame)) if frame.is_empty() => Err(CaptureError::EmptyFrame),
            Ok(FeedItem::Frame(frame)) => Ok(frame),
            Ok(FeedItem::Failure(reason)) => Err(CaptureError::Read(reason)),
            Ok(FeedItem::Cancel) => Err(CaptureError::Cancelled),
            Err(_) => Err(CaptureError::Read("feed disconnected".to_string())),
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        let cancelled = self.cancelled.clone();
        let tx = self.cancel_tx.clone();
        CancelHandle::new(move || {
            cancelled.store(true, Ordering::Release);
            let _ = tx.send(FeedItem::Cancel);
        })
    }

    fn close(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        // Release any frames still queued.
        self.rx.drain().for_each(drop);
    }
}
