//! raw_bridge - LibRaw decode bridge for host applications
//!
//! Opens a RAW file or in-memory buffer, drives LibRaw through
//! open → unpack → process → extract, and hands back an owned byte buffer:
//! either the embedded JPEG thumbnail or an 8-bit RGB image behind an 8-byte
//! width/height header (see [`frame`]).
//!
//! Native resources (decode sessions, processed images, borrowed views of
//! caller buffers) are owned by guards and released on every exit path.
//! Failures are typed ([`DecodeError`]); [`boundary`] and [`ffi`] collapse
//! them to "no result" for hosts that cannot carry an error.

pub mod backend;
pub mod boundary;
pub mod bridge;
pub mod convert;
pub mod error;
pub mod ffi;
pub mod frame;
pub mod metrics;
pub mod options;
pub mod organ;
pub mod source;
// Mock backend for tests and downstream test suites, not shipped in release builds
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod validation;

pub use backend::{LibRaw, RawBackend, ThumbnailFormat};
pub use bridge::DecodeBridge;
pub use error::{BackendError, DecodeError, ErrorKind};
pub use frame::RgbFrame;
pub use options::{ColorSpace, DecodeOptions, Gamma, Interpolation, Limits, WhiteBalance};
pub use source::Source;

pub type Result<T> = std::result::Result<T, DecodeError>;
