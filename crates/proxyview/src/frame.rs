//! Immutable image buffers shared between queues and the compositor cache.

use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A frame shared between a queue slot and the compositor's last-known cache.
pub type SharedFrame = Arc<Frame>;

/// Interleaved 8-bit pixel layouts understood by the compositor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[serde(alias = "gray")]
    Gray8,
    #[default]
    #[serde(alias = "rgb")]
    Rgb8,
    #[serde(alias = "bgr")]
    Bgr8,
    #[serde(alias = "rgba")]
    Rgba8,
    #[serde(alias = "bgra")]
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Rgb8 => "RGB",
            PixelFormat::Bgr8 => "BGR",
            PixelFormat::Rgba8 => "RGBA",
            PixelFormat::Bgra8 => "BGRA",
        };
        f.write_str(name)
    }
}

/// A decoded video frame with tightly packed rows.
///
/// Frames are never mutated once built. Producers hand them off wrapped in a
/// [`SharedFrame`] so the compositor can keep a cached copy alive while a
/// fresher frame sits in a queue.
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap raw samples, checking that they match the geometry.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = byte_len(width, height, format)?;
        if data.len() != expected {
            return Err(FrameError::SampleCount {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// An all-zero frame.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Result<Self, FrameError> {
        let len = byte_len(width, height, format)?;
        Self::new(width, height, format, vec![0; len])
    }

    /// A frame where every pixel holds `pixel`.
    ///
    /// `pixel` must have exactly `format.channels()` bytes.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel: &[u8],
    ) -> Result<Self, FrameError> {
        let pixels = byte_len(width, height, PixelFormat::Gray8)?;
        let data = if pixel.len() == format.channels() {
            pixel.repeat(pixels)
        } else {
            Vec::new()
        };
        Self::new(width, height, format, data)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.channels()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples of the pixel at (`x`, `y`), or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.format.channels();
        let start = y as usize * self.stride() + x as usize * channels;
        self.data.get(start..start + channels)
    }

    pub fn into_shared(self) -> SharedFrame {
        Arc::new(self)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Number of bytes a tightly packed frame of this geometry occupies.
pub(crate) fn byte_len(width: u32, height: u32, format: PixelFormat) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(format.channels()))
        .ok_or(FrameError::Overflow(width, height))
}
