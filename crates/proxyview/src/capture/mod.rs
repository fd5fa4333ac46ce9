//! Capture endpoints that feed the source readers.
//!
//! A descriptor string is opaque to the pipeline; a [`CaptureBackend`] turns it
//! into an open [`CaptureDevice`] with a blocking `read`.
//!
//! Backends:
//! - `pattern://WxH/COLOR` synthetic uniform frames ([`PatternBackend`])
//! - `channel://NAME` frames fed by the application ([`ChannelBackend`])
//! - anything else is a GStreamer launch line ending in an `appsink`
//!   (feature `gstreamer`)

mod channel;
#[cfg(feature = "gstreamer")]
mod gst;
mod pattern;

pub use channel::{ChannelBackend, ChannelFeed};
#[cfg(feature = "gstreamer")]
pub use gst::GstBackend;
pub use pattern::{PatternBackend, PatternSpec};

use crate::error::CaptureError;
use crate::frame::Frame;
use std::sync::Arc;

/// Opens capture endpoints from descriptors.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// An open capture endpoint.
pub trait CaptureDevice: Send {
    /// Block until the next frame is available.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Handle that makes an in-flight `read` fail promptly, when supported.
    fn cancel_handle(&self) -> CancelHandle;

    /// Release the endpoint. Further reads fail.
    fn close(&mut self);
}

/// Requests cancellation of a blocking read from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Arc::new(cancel),
        }
    }

    /// A handle for devices whose reads cannot be interrupted.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn cancel(&self) {
        (self.cancel)()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// Routes descriptors to a backend by scheme.
#[derive(Default)]
pub struct SchemeBackend {
    pattern: PatternBackend,
    channels: Option<ChannelBackend>,
}

impl SchemeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept `channel://` descriptors served by `channels`.
    pub fn with_channels(mut self, channels: ChannelBackend) -> Self {
        self.channels = Some(channels);
        self
    }
}

impl CaptureBackend for SchemeBackend {
    fn open(&self, descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if descriptor.starts_with(pattern::SCHEME) {
            return self.pattern.open(descriptor);
        }
        if descriptor.starts_with(channel::SCHEME) {
            return match &self.channels {
                Some(channels) => channels.open(descriptor),
                None => Err(CaptureError::Unsupported(descriptor.to_string())),
            };
        }
        open_pipeline(descriptor)
    }
}

#[cfg(feature = "gstreamer")]
fn open_pipeline(descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    GstBackend.open(descriptor)
}

#[cfg(not(feature = "gstreamer"))]
fn open_pipeline(descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Err(CaptureError::Unsupported(descriptor.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cancel_handle_invokes_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = CancelHandle::new({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        handle.clone().cancel();
        handle.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        CancelHandle::noop().cancel();
    }

    #[test]
    fn test_scheme_backend_routes_pattern() {
        let backend = SchemeBackend::new();
        let mut device = backend.open("pattern://4x2/red").unwrap();
        let frame = device.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
    }

    #[test]
    fn test_scheme_backend_channel_requires_registry() {
        let backend = SchemeBackend::new();
        assert!(matches!(
            backend.open("channel://front"),
            Err(CaptureError::Unsupported(_))
        ));

        let channels = ChannelBackend::new();
        let _feed = channels.register("front");
        let backend = SchemeBackend::new().with_channels(channels);
        assert!(backend.open("channel://front").is_ok());
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn test_pipeline_descriptor_unsupported_without_gstreamer() {
        let backend = SchemeBackend::new();
        assert!(matches!(
            backend.open("videotestsrc ! appsink"),
            Err(CaptureError::Unsupported(_))
        ));
    }
}
