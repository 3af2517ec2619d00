//! Host-side conversions of bridge results
//!
//! Consumer counterparts of the bridge: turn an RGB result or a thumbnail
//! into something a host can display.

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::{DecodeError, Result};
use crate::frame::RgbFrame;

/// Copy an RGB result into an `image::RgbImage`
pub fn frame_to_image(data: &[u8]) -> Result<RgbImage> {
    let frame = RgbFrame::parse(data)?;
    RgbImage::from_raw(frame.width, frame.height, frame.pixels.to_vec()).ok_or(
        DecodeError::PayloadMismatch {
            expected: frame.width as usize * frame.height as usize * 3,
            actual: frame.pixels.len(),
        },
    )
}

/// Pack an RGB result as opaque ARGB8888 pixels (alpha fixed at 0xFF)
///
/// `reuse` is cleared and refilled when given, so hosts can recycle a pixel
/// array of the right size across frames.
pub fn frame_to_argb(data: &[u8], reuse: Option<Vec<u32>>) -> Result<Vec<u32>> {
    let frame = RgbFrame::parse(data)?;
    let count = frame.width as usize * frame.height as usize;

    let mut pixels = reuse.unwrap_or_default();
    pixels.clear();
    pixels
        .try_reserve_exact(count)
        .map_err(|_| DecodeError::Allocation(count * 4))?;
    pixels.extend(frame.pixels.chunks_exact(3).map(|p| {
        0xFF00_0000 | (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32
    }));
    Ok(pixels)
}

/// Decode a thumbnail returned by `decode_thumbnail`
pub fn thumbnail_to_image(jpeg: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?)
}
