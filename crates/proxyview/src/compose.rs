//! Spatial composition: tile source frames left to right, then resize.
//!
//! Everything here is pure and single-threaded; the compositor thread calls
//! [`compose`] once per wake.

use crate::error::CompositionError;
use crate::frame::{byte_len, Frame, PixelFormat, SharedFrame};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

/// Size and format of the canvas that tiles `frames` in one row.
///
/// Width is the sum of widths, height the tallest frame, format that of the
/// first frame. Every frame must share that format.
pub fn canvas_geometry(frames: &[SharedFrame]) -> Result<(u32, u32, PixelFormat), CompositionError> {
    let first = frames.first().ok_or(CompositionError::NoSources)?;
    let format = first.format();

    let mut width: u32 = 0;
    let mut height: u32 = 0;
    for (index, frame) in frames.iter().enumerate() {
        if frame.format() != format {
            return Err(CompositionError::FormatMismatch {
                index,
                expected: format,
                found: frame.format(),
            });
        }
        width = width
            .checked_add(frame.width())
            .ok_or(CompositionError::Allocation(usize::MAX))?;
        height = height.max(frame.height());
    }

    if width == 0 || height == 0 {
        return Err(CompositionError::EmptyCanvas(width, height));
    }
    Ok((width, height, format))
}

/// Copy `frames` into one canvas, left to right, top-aligned.
///
/// Rows below a shorter frame are left zeroed.
pub fn build_canvas(frames: &[SharedFrame]) -> Result<Frame, CompositionError> {
    let (width, height, format) = canvas_geometry(frames)?;
    let len = byte_len(width, height, format)?;

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CompositionError::Allocation(len))?;
    data.resize(len, 0);

    let canvas_stride = width as usize * format.channels();
    let mut x_offset = 0usize;
    for frame in frames {
        let tile_stride = frame.stride();
        // A zero-width tile adds no columns.
        if tile_stride == 0 {
            continue;
        }
        for (y, row) in frame.as_slice().chunks_exact(tile_stride).enumerate() {
            let start = y * canvas_stride + x_offset;
            data[start..start + tile_stride].copy_from_slice(row);
        }
        x_offset += tile_stride;
    }

    Ok(Frame::new(width, height, format, data)?)
}

/// Resize with bilinear interpolation to exactly `width` x `height`.
///
/// Aspect ratio is not preserved.
pub fn resize(frame: &Frame, width: u32, height: u32) -> Result<Frame, CompositionError> {
    if width == 0 || height == 0 {
        return Err(CompositionError::InvalidOutputSize(width, height));
    }
    if frame.width() == width && frame.height() == height {
        return Ok(Frame::new(
            width,
            height,
            frame.format(),
            frame.as_slice().to_vec(),
        )?);
    }

    let data = match frame.format() {
        PixelFormat::Gray8 => resize_as::<Luma<u8>>(frame, width, height)?,
        // Channel order does not matter to the filter.
        PixelFormat::Rgb8 | PixelFormat::Bgr8 => resize_as::<Rgb<u8>>(frame, width, height)?,
        PixelFormat::Rgba8 | PixelFormat::Bgra8 => resize_as::<Rgba<u8>>(frame, width, height)?,
    };
    Ok(Frame::new(width, height, frame.format(), data)?)
}

fn resize_as<P>(frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>, CompositionError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let view = ImageBuffer::<P, &[u8]>::from_raw(frame.width(), frame.height(), frame.as_slice())
        .ok_or(CompositionError::EmptyCanvas(frame.width(), frame.height()))?;
    Ok(imageops::resize(&view, width, height, FilterType::Triangle).into_raw())
}

/// Tile `frames` and resize the canvas to the output geometry.
pub fn compose(frames: &[SharedFrame], width: u32, height: u32) -> Result<Frame, CompositionError> {
    let canvas = build_canvas(frames)?;
    resize(&canvas, width, height)
}
