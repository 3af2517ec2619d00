//! Decode bridge
//!
//! Drives a [`RawBackend`] through open → unpack → process → extract for a
//! single source and marshals the result into an owned byte buffer. Each call
//! opens its own session and releases it before returning; nothing is cached
//! between calls.

use tracing::{debug, warn};

use crate::backend::{DecodeSession, LibRaw, ProcessedImage, RawBackend, ThumbnailFormat};
use crate::error::{DecodeError, Result};
use crate::frame;
use crate::options::{DecodeOptions, Limits};
use crate::source::Source;

/// Placeholder when the library does not report a version
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone)]
pub struct DecodeBridge<B = LibRaw> {
    backend: B,
    options: DecodeOptions,
    limits: Limits,
}

impl DecodeBridge<LibRaw> {
    pub fn new() -> Self {
        Self::with_backend(LibRaw::new())
    }
}

impl Default for DecodeBridge<LibRaw> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RawBackend> DecodeBridge<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            options: DecodeOptions::default(),
            limits: Limits::default(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn version(&self) -> String {
        self.backend
            .version()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    /// Extract the embedded JPEG thumbnail, byte for byte
    pub fn decode_thumbnail(&self, source: Source<'_>) -> Result<Vec<u8>> {
        source.validate()?;

        let mut session = self.backend.open(source).map_err(|e| {
            warn!("open for thumbnail failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Open(e)
        })?;

        let thumb = session.unpack_thumbnail().map_err(|e| {
            warn!("unpack_thumb failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Thumbnail(e)
        })?;

        if thumb.format != ThumbnailFormat::Jpeg {
            warn!("Thumbnail not JPEG (format={:?}) {}", thumb.format, source);
            return Err(DecodeError::NotJpeg(thumb.format));
        }
        if thumb.data.is_empty() {
            warn!("Empty thumbnail data {}", source);
            return Err(DecodeError::EmptyThumbnail);
        }
        if !infer::image::is_jpeg(thumb.data) {
            warn!("Thumbnail declared JPEG but lacks JPEG magic {}", source);
        }

        let mut out = Vec::new();
        out.try_reserve_exact(thumb.data.len()).map_err(|_| {
            warn!("Failed to allocate thumbnail size={} {}", thumb.data.len(), source);
            DecodeError::Allocation(thumb.data.len())
        })?;
        out.extend_from_slice(thumb.data);

        debug!("Thumbnail extracted: {} bytes from {}", out.len(), source);
        Ok(out)
    }

    /// Full decode to the 8-bit RGB result layout (see [`frame`])
    pub fn decode_to_rgb(&self, source: Source<'_>) -> Result<Vec<u8>> {
        source.validate()?;

        let mut session = self.backend.open(source).map_err(|e| {
            warn!("open failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Open(e)
        })?;

        session.unpack_raw().map_err(|e| {
            warn!("unpack failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Unpack(e)
        })?;

        session.process(&self.options).map_err(|e| {
            warn!("dcraw_process failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Process(e)
        })?;

        // Declared after the session so it is released first
        let image = session.make_image().map_err(|e| {
            warn!("dcraw_make_mem_image failed ({}) {}: {}", e.code, source, e.message);
            DecodeError::Process(e)
        })?;

        if image.bits() != 8 || image.colors() != 3 {
            warn!(
                "Unexpected image format bits={} colors={} {}",
                image.bits(),
                image.colors(),
                source
            );
            return Err(DecodeError::UnexpectedFormat {
                bits: image.bits(),
                colors: image.colors(),
            });
        }

        let (width, height) = (image.width(), image.height());
        let out = frame::encode(width, height, image.data(), &self.limits).map_err(|e| {
            warn!("Invalid image data {}x{} {}: {}", width, height, source, e);
            e
        })?;

        debug!("Decoded {}x{} RGB ({} bytes) from {}", width, height, out.len(), source);
        Ok(out)
    }

    /// Sensor dimensions of an in-memory RAW file
    pub fn probe(&self, data: &[u8]) -> Result<(u32, u32)> {
        Source::bytes(data).validate()?;
        self.backend.probe(data).map_err(|e| {
            debug!("probe failed ({}): {}", e.code, e.message);
            DecodeError::Open(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{FailAt, MockBackend, MockRaw};

    fn bridge(raw: MockRaw) -> DecodeBridge<MockBackend> {
        DecodeBridge::with_backend(MockBackend::new(raw))
    }

    fn assert_released(b: &DecodeBridge<MockBackend>) {
        let stats = b.backend().stats();
        assert_eq!(stats.open_sessions(), 0, "session leaked");
        assert_eq!(stats.live_images(), 0, "processed image leaked");
    }

    const DATA: &[u8] = &[0x49, 0x49, 0x2A, 0x00];

    #[test]
    fn test_scenario_100x50_with_2048_byte_thumbnail() {
        let b = bridge(MockRaw::new(100, 50, 2048));

        let thumb = b.decode_thumbnail(Source::bytes(DATA)).unwrap();
        assert_eq!(thumb.len(), 2048);

        let rgb = b.decode_to_rgb(Source::path("/photos/IMG_0001.CR2")).unwrap();
        assert_eq!(rgb.len(), 15_008);
        assert_eq!(&rgb[0..4], &[0x64, 0x00, 0x00, 0x00]);
        assert_eq!(&rgb[4..8], &[0x32, 0x00, 0x00, 0x00]);

        assert_released(&b);
    }

    #[test]
    fn test_rgb_payload_copied_verbatim() {
        let b = bridge(MockRaw::new(4, 3, 16));
        let rgb = b.decode_to_rgb(Source::bytes(DATA)).unwrap();
        let expected: Vec<u8> = (0..4 * 3 * 3).map(|i| (i % 251) as u8).collect();
        assert_eq!(&rgb[8..], expected.as_slice());
    }

    #[test]
    fn test_thumbnail_not_jpeg() {
        let b = bridge(
            MockRaw::new(10, 10, 0).with_thumbnail(ThumbnailFormat::Bitmap, vec![1u8; 300]),
        );
        let err = b.decode_thumbnail(Source::bytes(DATA)).unwrap_err();
        assert!(matches!(err, DecodeError::NotJpeg(ThumbnailFormat::Bitmap)));
        assert_released(&b);
    }

    #[test]
    fn test_declared_jpeg_without_magic_is_still_returned() {
        let b = bridge(
            MockRaw::new(10, 10, 0).with_thumbnail(ThumbnailFormat::Jpeg, vec![0u8; 32]),
        );
        let thumb = b.decode_thumbnail(Source::bytes(DATA)).unwrap();
        assert_eq!(thumb, vec![0u8; 32]);
        assert_released(&b);
    }

    #[test]
    fn test_empty_thumbnail() {
        let b = bridge(MockRaw::new(10, 10, 0));
        let err = b.decode_thumbnail(Source::bytes(DATA)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyThumbnail);
        assert_released(&b);
    }

    #[test]
    fn test_empty_source_never_opens_a_session() {
        let b = bridge(MockRaw::new(10, 10, 64));

        assert_eq!(
            b.decode_thumbnail(Source::bytes(&[])).unwrap_err().kind(),
            ErrorKind::InvalidSource
        );
        assert_eq!(
            b.decode_to_rgb(Source::path("")).unwrap_err().kind(),
            ErrorKind::InvalidSource
        );
        assert_eq!(b.backend().stats().sessions_opened(), 0);
    }

    #[test]
    fn test_each_failure_stage_maps_to_its_kind_and_releases() {
        let cases = [
            (FailAt::Open, ErrorKind::Open),
            (FailAt::Unpack, ErrorKind::Unpack),
            (FailAt::Process, ErrorKind::Process),
            (FailAt::MakeImage, ErrorKind::Process),
        ];
        for (stage, kind) in cases {
            let b = bridge(MockRaw::new(10, 10, 64).failing_at(stage));
            let err = b.decode_to_rgb(Source::bytes(DATA)).unwrap_err();
            assert_eq!(err.kind(), kind, "stage {:?}", stage);
            assert!(err.backend_code().is_some());
            assert_released(&b);
        }

        let b = bridge(MockRaw::new(10, 10, 64).failing_at(FailAt::Thumbnail));
        let err = b.decode_thumbnail(Source::bytes(DATA)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Thumbnail);
        assert_released(&b);
    }

    #[test]
    fn test_unexpected_format_releases_image() {
        let b = bridge(MockRaw::new(10, 10, 64).with_format(16, 3));
        let err = b.decode_to_rgb(Source::bytes(DATA)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnexpectedFormat { bits: 16, colors: 3 }
        ));
        assert_eq!(b.backend().stats().images_made(), 1);
        assert_released(&b);

        let b = bridge(MockRaw::new(10, 10, 64).with_format(8, 4));
        assert_eq!(
            b.decode_to_rgb(Source::bytes(DATA)).unwrap_err().kind(),
            ErrorKind::UnexpectedFormat
        );
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let b = bridge(MockRaw::new(70_000, 10, 64));
        let err = b.decode_to_rgb(Source::bytes(DATA)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidDimensions { width: 70_000, height: 10 }
        ));
        assert_released(&b);

        let b = bridge(MockRaw::new(0, 10, 64));
        assert_eq!(
            b.decode_to_rgb(Source::bytes(DATA)).unwrap_err().kind(),
            ErrorKind::InvalidDimensions
        );
    }

    #[test]
    fn test_pixel_ceiling_from_limits() {
        let b = bridge(MockRaw::new(100, 100, 64)).with_limits(Limits {
            max_dimension: 65_535,
            max_pixel_bytes: 1_000,
        });
        let err = b.decode_to_rgb(Source::bytes(DATA)).unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { bytes: 30_000, limit: 1_000 }));
        assert_released(&b);
    }

    #[test]
    fn test_short_payload_rejected() {
        let mut raw = MockRaw::new(10, 10, 64);
        raw.payload_len = Some(10);
        let b = bridge(raw);
        assert_eq!(
            b.decode_to_rgb(Source::bytes(DATA)).unwrap_err().kind(),
            ErrorKind::PayloadMismatch
        );
        assert_released(&b);
    }

    #[test]
    fn test_decode_to_rgb_is_idempotent() {
        let b = bridge(MockRaw::new(32, 16, 64));
        let first = b.decode_to_rgb(Source::bytes(DATA)).unwrap();
        let second = b.decode_to_rgb(Source::bytes(DATA)).unwrap();
        assert_eq!(first, second);

        let seen = b.backend().stats().options_seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
    }

    #[test]
    fn test_options_reach_the_backend() {
        let b = bridge(MockRaw::new(8, 8, 64)).with_options(DecodeOptions::preview());
        b.decode_to_rgb(Source::bytes(DATA)).unwrap();
        assert_eq!(b.backend().stats().options_seen(), vec![DecodeOptions::preview()]);
    }

    #[test]
    fn test_version_and_probe() {
        let b = bridge(MockRaw::new(6000, 4000, 64));
        assert_eq!(b.version(), "0.0.0-mock");
        assert_eq!(b.probe(DATA).unwrap(), (6000, 4000));
        assert_eq!(b.probe(&[]).unwrap_err().kind(), ErrorKind::InvalidSource);
    }
}
