//! Null-compatible boundary surface
//!
//! Hosts that can only express "result or nothing" call these. The failure
//! cause is logged and then dropped; use [`DecodeBridge`] directly to get it.

use tracing::warn;

use crate::backend::{LibRaw, RawBackend};
use crate::bridge::DecodeBridge;
use crate::error::Result;
use crate::source::Source;

/// Wraps a bridge and collapses every failure to `None`
#[derive(Debug, Clone)]
pub struct Boundary<B = LibRaw> {
    bridge: DecodeBridge<B>,
}

impl Default for Boundary<LibRaw> {
    fn default() -> Self {
        Self::new(DecodeBridge::new())
    }
}

impl<B: RawBackend> Boundary<B> {
    pub fn new(bridge: DecodeBridge<B>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &DecodeBridge<B> {
        &self.bridge
    }

    pub fn version(&self) -> String {
        self.bridge.version()
    }

    pub fn decode_thumbnail(&self, path: &str) -> Option<Vec<u8>> {
        absent_on_error("decodeThumbnail", self.bridge.decode_thumbnail(Source::path(path)))
    }

    pub fn decode_thumbnail_from_bytes(&self, data: &[u8]) -> Option<Vec<u8>> {
        absent_on_error(
            "decodeThumbnailFromBytes",
            self.bridge.decode_thumbnail(Source::bytes(data)),
        )
    }

    pub fn decode_to_rgb(&self, path: &str) -> Option<Vec<u8>> {
        absent_on_error("decodeToRGB", self.bridge.decode_to_rgb(Source::path(path)))
    }

    pub fn decode_to_rgb_from_bytes(&self, data: &[u8]) -> Option<Vec<u8>> {
        absent_on_error(
            "decodeToRGBFromBytes",
            self.bridge.decode_to_rgb(Source::bytes(data)),
        )
    }
}

fn absent_on_error(op: &str, result: Result<Vec<u8>>) -> Option<Vec<u8>> {
    match result {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(op, kind = e.kind().as_str(), "{}", e);
            None
        }
    }
}

/// LibRaw version string, or "unknown"
pub fn version() -> String {
    Boundary::<LibRaw>::default().version()
}

pub fn decode_thumbnail(path: &str) -> Option<Vec<u8>> {
    Boundary::<LibRaw>::default().decode_thumbnail(path)
}

pub fn decode_thumbnail_from_bytes(data: &[u8]) -> Option<Vec<u8>> {
    Boundary::<LibRaw>::default().decode_thumbnail_from_bytes(data)
}

pub fn decode_to_rgb(path: &str) -> Option<Vec<u8>> {
    Boundary::<LibRaw>::default().decode_to_rgb(path)
}

pub fn decode_to_rgb_from_bytes(data: &[u8]) -> Option<Vec<u8>> {
    Boundary::<LibRaw>::default().decode_to_rgb_from_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ThumbnailFormat;
    use crate::testing::{FailAt, MockBackend, MockRaw};

    fn boundary(raw: MockRaw) -> Boundary<MockBackend> {
        Boundary::new(DecodeBridge::with_backend(MockBackend::new(raw)))
    }

    #[test]
    fn test_success_passes_bytes_through() {
        let b = boundary(MockRaw::new(100, 50, 2048));
        assert_eq!(b.decode_thumbnail("/a.NEF").map(|t| t.len()), Some(2048));
        assert_eq!(
            b.decode_to_rgb_from_bytes(&[1, 2, 3]).map(|t| t.len()),
            Some(15_008)
        );
    }

    #[test]
    fn test_failures_collapse_to_none() {
        let b = boundary(MockRaw::new(10, 10, 0).with_thumbnail(ThumbnailFormat::H265, vec![1; 8]));
        assert!(b.decode_thumbnail_from_bytes(&[1, 2, 3]).is_none());
        assert!(b.decode_thumbnail("").is_none());
        assert!(b.decode_to_rgb_from_bytes(&[]).is_none());

        let b = boundary(MockRaw::new(10, 10, 64).failing_at(FailAt::Open));
        assert!(b.decode_to_rgb("/missing.CR2").is_none());
        assert_eq!(b.bridge().backend().stats().open_sessions(), 0);
    }

    #[test]
    fn test_libraw_rejects_garbage() {
        assert!(decode_to_rgb_from_bytes(&[0u8; 1024]).is_none());
        assert!(decode_thumbnail("/nonexistent/file.ARW").is_none());
        assert!(!version().is_empty());
    }
}
