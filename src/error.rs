use serde::Serialize;
use thiserror::Error;

use crate::backend::ThumbnailFormat;

/// Error reported by the decoding library itself (code + description)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct BackendError {
    pub code: i32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Source could not be opened: {0}")]
    Open(BackendError),

    #[error("Unpacking failed: {0}")]
    Unpack(BackendError),

    #[error("Thumbnail extraction failed: {0}")]
    Thumbnail(BackendError),

    #[error("Thumbnail is not JPEG (format={0:?})")]
    NotJpeg(ThumbnailFormat),

    #[error("Empty thumbnail data")]
    EmptyThumbnail,

    #[error("Processing failed: {0}")]
    Process(BackendError),

    #[error("Unexpected image format bits={bits} colors={colors}")]
    UnexpectedFormat { bits: u16, colors: u16 },

    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Size computation overflow for {width}x{height}")]
    SizeOverflow { width: u32, height: u32 },

    #[error("Image too large: {bytes} bytes exceeds limit of {limit}")]
    TooLarge { bytes: usize, limit: usize },

    #[error("Image payload holds {actual} bytes, expected at least {expected}")]
    PayloadMismatch { expected: usize, actual: usize },

    #[error("Failed to allocate output buffer size={0}")]
    Allocation(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Failure cause without its payload, for callers and the C ABI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidSource,
    Open,
    Unpack,
    Thumbnail,
    NotJpeg,
    EmptyThumbnail,
    Process,
    UnexpectedFormat,
    InvalidDimensions,
    SizeOverflow,
    TooLarge,
    PayloadMismatch,
    Allocation,
    Io,
    Image,
}

impl ErrorKind {
    /// Stable code exposed across the C boundary. Zero is reserved for success.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidSource => 1,
            ErrorKind::Open => 2,
            ErrorKind::Unpack => 3,
            ErrorKind::Thumbnail => 4,
            ErrorKind::NotJpeg => 5,
            ErrorKind::EmptyThumbnail => 6,
            ErrorKind::Process => 7,
            ErrorKind::UnexpectedFormat => 8,
            ErrorKind::InvalidDimensions => 9,
            ErrorKind::SizeOverflow => 10,
            ErrorKind::TooLarge => 11,
            ErrorKind::PayloadMismatch => 12,
            ErrorKind::Allocation => 13,
            ErrorKind::Io => 14,
            ErrorKind::Image => 15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidSource => "InvalidSource",
            ErrorKind::Open => "Open",
            ErrorKind::Unpack => "Unpack",
            ErrorKind::Thumbnail => "Thumbnail",
            ErrorKind::NotJpeg => "NotJpeg",
            ErrorKind::EmptyThumbnail => "EmptyThumbnail",
            ErrorKind::Process => "Process",
            ErrorKind::UnexpectedFormat => "UnexpectedFormat",
            ErrorKind::InvalidDimensions => "InvalidDimensions",
            ErrorKind::SizeOverflow => "SizeOverflow",
            ErrorKind::TooLarge => "TooLarge",
            ErrorKind::PayloadMismatch => "PayloadMismatch",
            ErrorKind::Allocation => "Allocation",
            ErrorKind::Io => "Io",
            ErrorKind::Image => "Image",
        }
    }
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::InvalidSource(_) => ErrorKind::InvalidSource,
            DecodeError::Open(_) => ErrorKind::Open,
            DecodeError::Unpack(_) => ErrorKind::Unpack,
            DecodeError::Thumbnail(_) => ErrorKind::Thumbnail,
            DecodeError::NotJpeg(_) => ErrorKind::NotJpeg,
            DecodeError::EmptyThumbnail => ErrorKind::EmptyThumbnail,
            DecodeError::Process(_) => ErrorKind::Process,
            DecodeError::UnexpectedFormat { .. } => ErrorKind::UnexpectedFormat,
            DecodeError::InvalidDimensions { .. } => ErrorKind::InvalidDimensions,
            DecodeError::SizeOverflow { .. } => ErrorKind::SizeOverflow,
            DecodeError::TooLarge { .. } => ErrorKind::TooLarge,
            DecodeError::PayloadMismatch { .. } => ErrorKind::PayloadMismatch,
            DecodeError::Allocation(_) => ErrorKind::Allocation,
            DecodeError::Io(_) => ErrorKind::Io,
            DecodeError::Image(_) => ErrorKind::Image,
        }
    }

    /// Library error code, when the failure came from the decoding library
    pub fn backend_code(&self) -> Option<i32> {
        match self {
            DecodeError::Open(e)
            | DecodeError::Unpack(e)
            | DecodeError::Thumbnail(e)
            | DecodeError::Process(e) => Some(e.code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_unique_and_nonzero() {
        let kinds = [
            ErrorKind::InvalidSource,
            ErrorKind::Open,
            ErrorKind::Unpack,
            ErrorKind::Thumbnail,
            ErrorKind::NotJpeg,
            ErrorKind::EmptyThumbnail,
            ErrorKind::Process,
            ErrorKind::UnexpectedFormat,
            ErrorKind::InvalidDimensions,
            ErrorKind::SizeOverflow,
            ErrorKind::TooLarge,
            ErrorKind::PayloadMismatch,
            ErrorKind::Allocation,
            ErrorKind::Io,
            ErrorKind::Image,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_backend_code_only_for_library_failures() {
        let open = DecodeError::Open(BackendError::new(-2, "unsupported file format"));
        assert_eq!(open.backend_code(), Some(-2));
        assert_eq!(open.kind(), ErrorKind::Open);
        assert!(open.to_string().contains("unsupported file format"));

        let dims = DecodeError::InvalidDimensions { width: 0, height: 10 };
        assert_eq!(dims.backend_code(), None);
    }
}
