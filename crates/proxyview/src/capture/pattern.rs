//! Synthetic uniform-color source, handy for demos and tests.
//!
//! Descriptor: `pattern://WIDTHxHEIGHT/COLOR[?fps=N&format=F]` where COLOR is
//! a name (`black`, `white`, `red`, `green`, `blue`, `gray`) or `#rrggbb`.
//! Without `fps` frames are produced at [`DEFAULT_FPS`]; every source is
//! paced so a reader never spins on it.

use super::{CancelHandle, CaptureBackend, CaptureDevice};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(super) const SCHEME: &str = "pattern://";

/// Frame rate used when the descriptor has no `fps` option.
pub const DEFAULT_FPS: u32 = 30;

/// Parsed `pattern://` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub width: u32,
    pub height: u32,
    pub rgb: [u8; 3],
    pub format: PixelFormat,
    pub fps: u32,
}

impl PatternSpec {
    pub fn parse(descriptor: &str) -> Result<Self, String> {
        let rest = descriptor
            .strip_prefix(SCHEME)
            .ok_or_else(|| format!("missing '{}' prefix", SCHEME))?;
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let (size, color) = path
            .split_once('/')
            .ok_or_else(|| "expected WIDTHxHEIGHT/COLOR".to_string())?;
        let (width, height) = size
            .split_once('x')
            .ok_or_else(|| format!("invalid size '{}'", size))?;
        let width: u32 = width
            .parse()
            .map_err(|_| format!("invalid width '{}'", width))?;
        let height: u32 = height
            .parse()
            .map_err(|_| format!("invalid height '{}'", height))?;
        if width == 0 || height == 0 {
            return Err(format!("size must be non-zero, got {}x{}", width, height));
        }

        let mut spec = Self {
            width,
            height,
            rgb: parse_color(color)?,
            format: PixelFormat::Rgb8,
            fps: DEFAULT_FPS,
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("fps", value)) => {
                    let fps: u32 = value
                        .parse()
                        .map_err(|_| format!("invalid fps '{}'", value))?;
                    if fps == 0 {
                        return Err("fps must be at least 1".to_string());
                    }
                    spec.fps = fps;
                }
                Some(("format", value)) => {
                    spec.format = serde_yaml::from_str(value)
                        .map_err(|_| format!("invalid format '{}'", value))?;
                }
                _ => return Err(format!("unknown option '{}'", pair)),
            }
        }

        Ok(spec)
    }

    /// The configured color laid out for `self.format`.
    pub fn pixel(&self) -> Vec<u8> {
        let [r, g, b] = self.rgb;
        match self.format {
            PixelFormat::Gray8 => {
                let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
                vec![luma as u8]
            }
            PixelFormat::Rgb8 => vec![r, g, b],
            PixelFormat::Bgr8 => vec![b, g, r],
            PixelFormat::Rgba8 => vec![r, g, b, 255],
            PixelFormat::Bgra8 => vec![b, g, r, 255],
        }
    }
}

fn parse_color(color: &str) -> Result<[u8; 3], String> {
    let rgb = match color {
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "gray" => [128, 128, 128],
        "red" => [255, 0, 0],
        "green" => [0, 255, 0],
        "blue" => [0, 0, 255],
        hex if hex.starts_with('#') && hex.len() == 7 && hex.is_ascii() => {
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|_| format!("invalid color '{}'", hex))
            };
            [channel(1)?, channel(3)?, channel(5)?]
        }
        other => return Err(format!("invalid color '{}'", other)),
    };
    Ok(rgb)
}

/// Opens `pattern://` descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternBackend;

impl CaptureBackend for PatternBackend {
    fn open(&self, descriptor: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let spec = PatternSpec::parse(descriptor).map_err(|reason| CaptureError::Open {
            descriptor: descriptor.to_string(),
            reason,
        })?;
        log::debug!("Opened pattern source {:?}", spec);
        Ok(Box::new(PatternDevice::new(spec)))
    }
}

struct PatternDevice {
    pixel: Vec<u8>,
    spec: PatternSpec,
    period: Duration,
    next_deadline: Instant,
    cancelled: Arc<AtomicBool>,
    wake_tx: flume::Sender<()>,
    wake_rx: flume::Receiver<()>,
}

impl PatternDevice {
    fn new(spec: PatternSpec) -> Self {
        let (wake_tx, wake_rx) = flume::bounded(1);
        Self {
            pixel: spec.pixel(),
            period: Duration::from_secs(1) / spec.fps,
            spec,
            next_deadline: Instant::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }
}

impl CaptureDevice for PatternDevice {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(CaptureError::Cancelled);
        }
        // Sleep until the next tick unless cancel() wakes us first.
        if self.wake_rx.recv_deadline(self.next_deadline).is_ok() {
            return Err(CaptureError::Cancelled);
        }
        let next = self.next_deadline + self.period;
        self.next_deadline = next.max(Instant::now());
        Ok(Frame::filled(
            self.spec.width,
            self.spec.height,
            self.spec.format,
            &self.pixel,
        )?)
    }

    fn cancel_handle(&self) -> CancelHandle {
        let cancelled = self.cancelled.clone();
        let wake_tx = self.wake_tx.clone();
        CancelHandle::new(move || {
            cancelled.store(true, Ordering::Release);
            let _ = wake_tx.try_send(());
        })
    }

    fn close(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let spec = PatternSpec::parse("pattern://640x480/red?fps=30&format=bgr").unwrap();
        assert_eq!(spec.width, 640);
        assert_eq!(spec.height, 480);
        assert_eq!(spec.rgb, [255, 0, 0]);
        assert_eq!(spec.format, PixelFormat::Bgr8);
        assert_eq!(spec.fps, 30);
        assert_eq!(spec.pixel(), vec![0, 0, 255]);
    }

    #[test]
    fn test_parse_hex_color() {
        let spec = PatternSpec::parse("pattern://2x2/#10ff0a").unwrap();
        assert_eq!(spec.rgb, [0x10, 0xff, 0x0a]);
        assert_eq!(spec.format, PixelFormat::Rgb8);
        assert_eq!(spec.fps, DEFAULT_FPS);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PatternSpec::parse("rtsp://camera").is_err());
        assert!(PatternSpec::parse("pattern://640/red").is_err());
        assert!(PatternSpec::parse("pattern://0x480/red").is_err());
        assert!(PatternSpec::parse("pattern://640x480/purple").is_err());
        assert!(PatternSpec::parse("pattern://640x480/red?speed=2").is_err());
        assert!(PatternSpec::parse("pattern://640x480/red?fps=0").is_err());
    }

    #[test]
    fn test_open_failure_is_open_error() {
        let result = PatternBackend.open("pattern://nope");
        assert!(matches!(result, Err(CaptureError::Open { .. })));
    }

    #[test]
    fn test_read_produces_uniform_frames() {
        let mut device = PatternBackend.open("pattern://3x2/blue?format=rgba").unwrap();
        let frame = device.read().unwrap();
        assert_eq!(frame.format(), PixelFormat::Rgba8);
        assert!(frame
            .as_slice()
            .chunks(4)
            .all(|px| px == [0, 0, 255, 255]));
    }

    #[test]
    fn test_cancel_interrupts_paced_read() {
        let mut device = PatternBackend.open("pattern://2x2/red?fps=1").unwrap();
        // The first tick is immediate.
        assert!(device.read().is_ok());

        let cancel = device.cancel_handle();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });
        let started = Instant::now();
        assert!(matches!(device.read(), Err(CaptureError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(900));
        handle.join().unwrap();
    }

    #[test]
    fn test_default_rate_paces_reads() {
        let mut device = PatternBackend.open("pattern://2x2/red").unwrap();
        let started = Instant::now();
        for _ in 0..3 {
            assert!(device.read().is_ok());
        }
        // First tick is immediate, then one period per read.
        assert!(started.elapsed() >= Duration::from_secs(1) / DEFAULT_FPS);
    }

    #[test]
    fn test_read_after_close_fails() {
        let mut device = PatternBackend.open("pattern://2x2/red").unwrap();
        device.close();
        assert!(matches!(device.read(), Err(CaptureError::Cancelled)));
    }
}
