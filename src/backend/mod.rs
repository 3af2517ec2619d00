//! Decoding library seam
//!
//! The bridge drives the decoding library only through these traits. Every
//! session and processed image is an owning value: dropping it releases the
//! native resource, so early returns cannot leak.

pub mod libraw;

use crate::error::BackendError;
use crate::options::DecodeOptions;
use crate::source::Source;

pub use libraw::LibRaw;

/// Embedded thumbnail encodings (LibRaw `LibRaw_thumbnail_formats`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Unknown,
    Jpeg,
    Bitmap,
    Bitmap16,
    Layer,
    Rollei,
    H265,
    JpegXl,
    Other(i32),
}

impl ThumbnailFormat {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ThumbnailFormat::Unknown,
            1 => ThumbnailFormat::Jpeg,
            2 => ThumbnailFormat::Bitmap,
            3 => ThumbnailFormat::Bitmap16,
            4 => ThumbnailFormat::Layer,
            5 => ThumbnailFormat::Rollei,
            6 => ThumbnailFormat::H265,
            7 => ThumbnailFormat::JpegXl,
            other => ThumbnailFormat::Other(other),
        }
    }
}

/// Thumbnail payload borrowed from an open session
#[derive(Debug, Clone, Copy)]
pub struct Thumbnail<'s> {
    pub format: ThumbnailFormat,
    pub data: &'s [u8],
}

/// A decoding library that can open sessions on a source
pub trait RawBackend {
    type Session<'a>: DecodeSession
    where
        Self: 'a;

    /// Open a session bound to `source`. The session may borrow the source.
    fn open<'a>(&'a self, source: Source<'a>) -> Result<Self::Session<'a>, BackendError>;

    /// Library version string, if the library reports one
    fn version(&self) -> Option<String>;

    /// Sensor dimensions without unpacking
    fn probe(&self, data: &[u8]) -> Result<(u32, u32), BackendError>;
}

/// One open source. Released when dropped.
pub trait DecodeSession {
    type Image: ProcessedImage;

    fn unpack_thumbnail(&mut self) -> Result<Thumbnail<'_>, BackendError>;

    fn unpack_raw(&mut self) -> Result<(), BackendError>;

    /// Apply `options` and run demosaic, color transform and gamma
    fn process(&mut self, options: &DecodeOptions) -> Result<(), BackendError>;

    /// Materialize the processed image in memory
    fn make_image(&mut self) -> Result<Self::Image, BackendError>;
}

/// In-memory processed image. Released when dropped.
pub trait ProcessedImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn bits(&self) -> u16;
    fn colors(&self) -> u16;
    fn data(&self) -> &[u8];
}
