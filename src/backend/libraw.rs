//! LibRaw backend via FFI
//!
//! `rsraw` does not expose the session pointer or the processed-image API,
//! so the lifecycle is driven through `rsraw_sys` directly. Two guards own
//! the native resources:
//!
//! - [`LibRawSession`] calls `libraw_close` on drop. A buffer-backed session
//!   borrows the caller's slice for `'a`, since LibRaw reads from it lazily.
//! - [`MemImage`] calls `libraw_dcraw_clear_mem` on drop.

use std::ffi::{c_void, CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr::NonNull;

use rsraw::RawImage;
use rsraw_sys as sys;
use tracing::debug;

use super::{DecodeSession, ProcessedImage, RawBackend, Thumbnail, ThumbnailFormat};
use crate::error::BackendError;
use crate::options::{DecodeOptions, WhiteBalance};
use crate::source::Source;

const LIBRAW_SUCCESS: c_int = 0;
const LIBRAW_UNSPECIFIED_ERROR: c_int = -1;
const LIBRAW_UNSUFFICIENT_MEMORY: c_int = -100007;

/// The LibRaw library. Stateless; every `open` creates a fresh session.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibRaw;

impl LibRaw {
    pub fn new() -> Self {
        Self
    }

    /// Human-readable description of a LibRaw return code
    pub fn describe_error(code: c_int) -> String {
        owned(unsafe { sys::libraw_strerror(code) })
            .unwrap_or_else(|| format!("LibRaw error {}", code))
    }

    fn check(code: c_int) -> Result<(), BackendError> {
        if code == LIBRAW_SUCCESS {
            Ok(())
        } else {
            Err(BackendError::new(code, Self::describe_error(code)))
        }
    }
}

impl RawBackend for LibRaw {
    type Session<'a> = LibRawSession<'a>;

    fn open<'a>(&'a self, source: Source<'a>) -> Result<LibRawSession<'a>, BackendError> {
        let ptr = unsafe { sys::libraw_init(0) };
        let inner = NonNull::new(ptr).ok_or_else(|| {
            BackendError::new(LIBRAW_UNSUFFICIENT_MEMORY, "libraw_init returned null")
        })?;
        // Guard first so a failed open still closes the handle
        let session = LibRawSession {
            inner,
            _source: PhantomData,
        };

        let ret = match source {
            Source::Path(path) => {
                let c_path = path_to_cstring(path)?;
                unsafe { sys::libraw_open_file(session.as_ptr(), c_path.as_ptr()) }
            }
            Source::Bytes(data) => unsafe {
                sys::libraw_open_buffer(
                    session.as_ptr(),
                    data.as_ptr() as *const c_void,
                    data.len(),
                )
            },
        };
        LibRaw::check(ret)?;

        debug!("LibRaw session opened on {}", source);
        Ok(session)
    }

    fn version(&self) -> Option<String> {
        owned(unsafe { sys::libraw_version() }).filter(|v| !v.is_empty())
    }

    fn probe(&self, data: &[u8]) -> Result<(u32, u32), BackendError> {
        let raw = RawImage::open(data).map_err(|e| {
            BackendError::new(LIBRAW_UNSPECIFIED_ERROR, format!("Failed to open RAW file: {:?}", e))
        })?;
        Ok((raw.width(), raw.height()))
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, BackendError> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path
        .to_str()
        .ok_or_else(|| BackendError::new(LIBRAW_UNSPECIFIED_ERROR, "path is not valid UTF-8"))?
        .as_bytes()
        .to_vec();

    CString::new(bytes)
        .map_err(|_| BackendError::new(LIBRAW_UNSPECIFIED_ERROR, "path contains a NUL byte"))
}

/// Open LibRaw handle. Closed on drop.
pub struct LibRawSession<'a> {
    inner: NonNull<sys::libraw_data_t>,
    _source: PhantomData<&'a [u8]>,
}

impl LibRawSession<'_> {
    fn as_ptr(&self) -> *mut sys::libraw_data_t {
        self.inner.as_ptr()
    }

    fn apply_options(&mut self, options: &DecodeOptions) {
        let params = unsafe { &mut (*self.as_ptr()).params };

        params.user_qual = options.interpolation as c_int;
        params.output_bps = options.bit_depth as c_int;
        params.output_color = options.color_space as c_int;

        params.gamm[0] = 1.0 / options.gamma.power;
        params.gamm[1] = options.gamma.slope;

        // aber[0] scales red, aber[2] scales blue
        let (red, blue) = options.chromatic_aberration;
        params.aber[0] = red;
        params.aber[1] = 1.0;
        params.aber[2] = blue;
        params.aber[3] = 1.0;

        params.med_passes = options.median_filter_passes as c_int;

        match &options.white_balance {
            WhiteBalance::Camera => {
                params.use_camera_wb = 1;
                params.use_auto_wb = 0;
            }
            WhiteBalance::Auto => {
                params.use_camera_wb = 0;
                params.use_auto_wb = 1;
            }
            WhiteBalance::None => {
                params.use_camera_wb = 0;
                params.use_auto_wb = 0;
            }
            WhiteBalance::Custom(mults) => {
                params.use_camera_wb = 0;
                params.use_auto_wb = 0;
                params.user_mul = *mults;
            }
        }

        params.no_auto_bright = if options.auto_brightness { 0 } else { 1 };
        params.half_size = if options.half_size { 1 } else { 0 };
    }
}

impl DecodeSession for LibRawSession<'_> {
    type Image = MemImage;

    fn unpack_thumbnail(&mut self) -> Result<Thumbnail<'_>, BackendError> {
        LibRaw::check(unsafe { sys::libraw_unpack_thumb(self.as_ptr()) })?;

        let thumb = unsafe { &(*self.as_ptr()).thumbnail };
        let format = ThumbnailFormat::from_code(thumb.tformat as i32);
        let data = if thumb.thumb.is_null() || thumb.tlength == 0 {
            &[][..]
        } else {
            // Owned by the session, freed by libraw_close
            unsafe {
                std::slice::from_raw_parts(thumb.thumb as *const u8, thumb.tlength as usize)
            }
        };

        Ok(Thumbnail { format, data })
    }

    fn unpack_raw(&mut self) -> Result<(), BackendError> {
        LibRaw::check(unsafe { sys::libraw_unpack(self.as_ptr()) })
    }

    fn process(&mut self, options: &DecodeOptions) -> Result<(), BackendError> {
        self.apply_options(options);
        LibRaw::check(unsafe { sys::libraw_dcraw_process(self.as_ptr()) })
    }

    fn make_image(&mut self) -> Result<MemImage, BackendError> {
        let mut ret: c_int = LIBRAW_SUCCESS;
        let img = unsafe { sys::libraw_dcraw_make_mem_image(self.as_ptr(), &mut ret) };
        let image = NonNull::new(img).map(|inner| MemImage { inner });
        LibRaw::check(ret)?;
        image.ok_or_else(|| {
            BackendError::new(LIBRAW_UNSUFFICIENT_MEMORY, "dcraw_make_mem_image returned null")
        })
    }
}

impl Drop for LibRawSession<'_> {
    fn drop(&mut self) {
        unsafe { sys::libraw_close(self.as_ptr()) };
    }
}

/// Processed image from `libraw_dcraw_make_mem_image`. Freed on drop.
pub struct MemImage {
    inner: NonNull<sys::libraw_processed_image_t>,
}

impl MemImage {
    fn header(&self) -> &sys::libraw_processed_image_t {
        unsafe { self.inner.as_ref() }
    }
}

impl ProcessedImage for MemImage {
    fn width(&self) -> u32 {
        self.header().width as u32
    }

    fn height(&self) -> u32 {
        self.header().height as u32
    }

    fn bits(&self) -> u16 {
        self.header().bits as u16
    }

    fn colors(&self) -> u16 {
        self.header().colors as u16
    }

    fn data(&self) -> &[u8] {
        let len = self.header().data_size as usize;
        // `data` is a trailing flexible array of `data_size` bytes
        let start = unsafe { std::ptr::addr_of!((*self.inner.as_ptr()).data) } as *const u8;
        unsafe { std::slice::from_raw_parts(start, len) }
    }
}

impl Drop for MemImage {
    fn drop(&mut self) {
        unsafe { sys::libraw_dcraw_clear_mem(self.inner.as_ptr()) };
    }
}

/// Copy a C string owned by LibRaw
fn owned(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_blank() {
        let version = LibRaw::new().version().unwrap_or_default();
        assert!(!version.trim().is_empty(), "LibRaw version should not be blank");
    }

    #[test]
    fn test_garbage_buffer_fails_to_open() {
        let data = vec![0x42u8; 4096];
        let backend = LibRaw::new();
        let err = backend.open(Source::bytes(&data)).err().expect("garbage must not open");
        assert_ne!(err.code, 0);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let backend = LibRaw::new();
        let result = backend.open(Source::path("/nonexistent/file.CR2"));
        assert!(result.is_err());
    }

    #[test]
    fn test_describe_error_success_code() {
        assert!(!LibRaw::describe_error(LIBRAW_SUCCESS).is_empty());
    }
}
