//! Error types for the proxy view pipeline.

use crate::frame::PixelFormat;
use thiserror::Error;

/// Errors raised while building a [`Frame`](crate::frame::Frame).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Sample count mismatch: {width}x{height} {format} needs {expected} bytes, got {actual}")]
    SampleCount {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("Frame dimensions overflow: {0}x{1}")]
    Overflow(u32, u32),
}

/// Errors reported by a capture endpoint.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The endpoint could not be opened. Terminal for the source.
    #[error("Failed to open '{descriptor}': {reason}")]
    Open { descriptor: String, reason: String },
    /// A single read failed. The reader retries on the next iteration.
    #[error("Read failed: {0}")]
    Read(String),
    /// The endpoint produced a frame with no samples.
    #[error("Empty frame")]
    EmptyFrame,
    /// The read was interrupted by a cancellation request.
    #[error("Read cancelled")]
    Cancelled,
    #[error("Unsupported descriptor '{0}'")]
    Unsupported(String),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
}

/// Errors that abandon a single composition cycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error("No source frames to compose")]
    NoSources,
    #[error("Format mismatch: source {index} is {found}, canvas is {expected}")]
    FormatMismatch {
        index: usize,
        expected: PixelFormat,
        found: PixelFormat,
    },
    #[error("Canvas would be empty ({0}x{1})")]
    EmptyCanvas(u32, u32),
    #[error("Failed to allocate {0} bytes for the canvas")]
    Allocation(usize),
    #[error("Invalid output size {0}x{1}")]
    InvalidOutputSize(u32, u32),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
}

/// Construction-time failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,
    #[error("Output size must be non-zero, got {0}x{1}")]
    ZeroOutputSize(u32, u32),
    #[error("Blank frame size must be non-zero, got {0}x{1}")]
    ZeroBlankSize(u32, u32),
    #[error("Frame rate must be at least 1 fps")]
    ZeroFps,
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
