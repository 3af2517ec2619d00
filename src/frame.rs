//! RGB result layout
//!
//! ```text
//! offset 0  u32 LE  width
//! offset 4  u32 LE  height
//! offset 8  width * height * 3 bytes, interleaved R,G,B, row-major, no padding
//! ```

use crate::error::{DecodeError, Result};
use crate::options::Limits;

pub const HEADER_LEN: usize = 8;
pub const CHANNELS: usize = 3;

/// Payload size for a `width` x `height` image, checked against `limits`.
///
/// Returns `(pixel_bytes, total)` where `total` includes the header.
pub fn checked_sizes(width: u32, height: u32, limits: &Limits) -> Result<(usize, usize)> {
    if width == 0 || height == 0 || width > limits.max_dimension || height > limits.max_dimension
    {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    let pixel_bytes = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(CHANNELS))
        .ok_or(DecodeError::SizeOverflow { width, height })?;
    let total = pixel_bytes
        .checked_add(HEADER_LEN)
        .ok_or(DecodeError::SizeOverflow { width, height })?;

    if pixel_bytes > limits.max_pixel_bytes {
        return Err(DecodeError::TooLarge {
            bytes: pixel_bytes,
            limit: limits.max_pixel_bytes,
        });
    }

    Ok((pixel_bytes, total))
}

/// Build the result buffer: header followed by the first `w*h*3` bytes of `pixels`
pub fn encode(width: u32, height: u32, pixels: &[u8], limits: &Limits) -> Result<Vec<u8>> {
    let (pixel_bytes, total) = checked_sizes(width, height, limits)?;

    if pixels.len() < pixel_bytes {
        return Err(DecodeError::PayloadMismatch {
            expected: pixel_bytes,
            actual: pixels.len(),
        });
    }

    let mut out = Vec::new();
    out.try_reserve_exact(total)
        .map_err(|_| DecodeError::Allocation(total))?;
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&pixels[..pixel_bytes]);

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// Parsed view over an RGB result buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

impl<'a> RgbFrame<'a> {
    /// Validate `data` against the layout. The length must match exactly.
    ///
    /// Only the layout is checked; any dimensions whose size fits in memory
    /// are accepted. Use [`RgbFrame::parse_with_limits`] to apply ceilings.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let unbounded = Limits {
            max_dimension: u32::MAX,
            max_pixel_bytes: usize::MAX,
        };
        Self::parse_with_limits(data, &unbounded)
    }

    /// Like [`RgbFrame::parse`], also rejecting frames outside `limits`
    pub fn parse_with_limits(data: &'a [u8], limits: &Limits) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::PayloadMismatch {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let width = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let (pixel_bytes, total) = checked_sizes(width, height, limits)?;

        if data.len() != total {
            return Err(DecodeError::PayloadMismatch {
                expected: pixel_bytes,
                actual: data.len() - HEADER_LEN,
            });
        }

        Ok(Self {
            width,
            height,
            pixels: &data[HEADER_LEN..],
        })
    }

    /// RGB triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
    }
}
