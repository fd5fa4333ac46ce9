//! GStreamer capture backend.
//!
//! The descriptor is a `gst-launch` line whose sink is an `appsink`, e.g.
//!
//! ```text
//! rtspsrc location=rtsp://cam/stream latency=0 ! rtph264depay ! h264parse !
//!   avdec_h264 ! videoconvert ! video/x-raw,format=BGR ! appsink drop=true max-buffers=1
//! ```
//!
//! Decoding stays inside GStreamer; `read` only copies the mapped raw buffer.

use super::{CancelHandle, CaptureBackend, CaptureDevice};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat};
use gstreamer::prelude::*;
use gstreamer_video::VideoFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opens GStreamer pipeline descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstBackend;

impl CaptureBackend for GstBackend {
    fn open(&self, descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            descriptor: descriptor.to_string(),
            reason,
        };

        if !gstreamer::INITIALIZED.load(Ordering::Relaxed) {
            gstreamer::init().map_err(|e| open_err(e.to_string()))?;
        }

        log::debug!("Creating capture pipeline: {}", descriptor);

        let pipeline = gstreamer::parse::launch(descriptor)
            .map_err(|e| open_err(e.to_string()))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| open_err("descriptor is not a pipeline".to_string()))?;

        let appsink = find_appsink(&pipeline)
            .ok_or_else(|| open_err("pipeline has no appsink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_err(e.to_string()))?;

        // Wait for the state change to settle so a dead endpoint fails here,
        // not on the first read.
        let (result, _, _) = pipeline.state(gstreamer::ClockTime::NONE);
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_err(e.to_string()));
        }

        Ok(Box::new(GstDevice {
            pipeline,
            appsink,
            cancelled: Arc::new(AtomicBool::new(false)),
            closed: false,
        }))
    }
}

fn find_appsink(pipeline: &gstreamer::Pipeline) -> Option<gstreamer_app::AppSink> {
    let mut sinks = pipeline.iterate_sinks();
    loop {
        match sinks.next() {
            Ok(Some(element)) => {
                if let Ok(sink) = element.dynamic_cast::<gstreamer_app::AppSink>() {
                    return Some(sink);
                }
            }
            Ok(None) => return None,
            Err(_) => sinks.resync(),
        }
    }
}

struct GstDevice {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    cancelled: Arc<AtomicBool>,
    closed: bool,
}

impl GstDevice {
    fn map_format(format: VideoFormat) -> Option<PixelFormat> {
        match format {
            VideoFormat::Gray8 => Some(PixelFormat::Gray8),
            VideoFormat::Rgb => Some(PixelFormat::Rgb8),
            VideoFormat::Bgr => Some(PixelFormat::Bgr8),
            VideoFormat::Rgba | VideoFormat::Rgbx => Some(PixelFormat::Rgba8),
            VideoFormat::Bgra | VideoFormat::Bgrx => Some(PixelFormat::Bgra8),
            _ => None,
        }
    }
}

impl CaptureDevice for GstDevice {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.closed || self.cancelled.load(Ordering::Acquire) {
            return Err(CaptureError::Cancelled);
        }

        let sample = self.appsink.pull_sample().map_err(|_| {
            if self.cancelled.load(Ordering::Acquire) {
                CaptureError::Cancelled
            } else {
                CaptureError::Read("appsink returned no sample (EOS or flushing)".to_string())
            }
        })?;

        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Read("sample without caps".to_string()))?;
        let info = gstreamer_video::VideoInfo::from_caps(caps)
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let format = Self::map_format(info.format()).ok_or_else(|| {
            CaptureError::Read(format!("unsupported pixel format {:?}", info.format()))
        })?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Read("sample without buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::Read("failed to map buffer".to_string()))?;

        let width = info.width();
        let height = info.height();
        let row = width as usize * format.channels();
        let stride = info.stride()[0] as usize;
        let offset = info.offset()[0];
        let src = map.as_slice();

        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = offset + y * stride;
            let line = src
                .get(start..start + row)
                .ok_or_else(|| CaptureError::Read("buffer shorter than caps".to_string()))?;
            data.extend_from_slice(line);
        }

        Ok(Frame::new(width, height, format, data)?)
    }

    fn cancel_handle(&self) -> CancelHandle {
        let cancelled = self.cancelled.clone();
        let pipeline = self.pipeline.clone();
        CancelHandle::new(move || {
            cancelled.store(true, Ordering::Release);
            // Flushing the appsink makes a blocked pull_sample return.
            let _ = pipeline.set_state(gstreamer::State::Null);
        })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.pipeline.send_event(gstreamer::event::Eos::new());
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::error!("Error closing capture pipeline: {}", e);
        }
    }
}

impl Drop for GstDevice {
    fn drop(&mut self) {
        self.close();
    }
}
