use std::fmt;
use std::path::Path;

use crate::error::{DecodeError, Result};

/// Where a RAW image comes from. Both variants are borrowed from the caller
/// and stay read-only for the duration of a decode call.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

impl<'a> Source<'a> {
    pub fn path(path: &'a (impl AsRef<Path> + ?Sized)) -> Self {
        Source::Path(path.as_ref())
    }

    pub fn bytes(data: &'a [u8]) -> Self {
        Source::Bytes(data)
    }

    /// Reject empty paths and zero-length buffers before any library call
    pub fn validate(&self) -> Result<()> {
        match self {
            Source::Path(p) if p.as_os_str().is_empty() => {
                Err(DecodeError::InvalidSource("empty path".to_string()))
            }
            Source::Bytes(b) if b.is_empty() => {
                Err(DecodeError::InvalidSource("empty buffer".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(p) => write!(f, "{}", p.display()),
            Source::Bytes(b) => write!(f, "<memory: {} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sources_rejected() {
        assert!(Source::path("").validate().is_err());
        assert!(Source::bytes(&[]).validate().is_err());
        assert!(Source::path("/tmp/a.CR2").validate().is_ok());
        assert!(Source::bytes(&[0u8; 4]).validate().is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(Source::path("/tmp/a.NEF").to_string(), "/tmp/a.NEF");
        assert_eq!(Source::bytes(&[1, 2, 3]).to_string(), "<memory: 3 bytes>");
    }
}
