//! C ABI for managed-runtime hosts
//!
//! Every decode entry point returns either a heap buffer owned by the caller
//! (free it with [`raw_bridge_buffer_free`]) or null. After a null return,
//! [`raw_bridge_last_error`] gives the [`ErrorKind`](crate::ErrorKind) code of
//! the failure on the calling thread. Panics are caught here and reported as
//! [`RAW_BRIDGE_PANIC`]; they never unwind into the host.

use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::OnceLock;

use tracing::{error, warn};

use crate::bridge::DecodeBridge;
use crate::error::{DecodeError, Result};
use crate::source::Source;

/// Last-error code after success
pub const RAW_BRIDGE_OK: c_int = 0;
/// Last-error code when a call panicked
pub const RAW_BRIDGE_PANIC: c_int = -1;

thread_local! {
    static LAST_ERROR: Cell<c_int> = const { Cell::new(RAW_BRIDGE_OK) };
}

/// Byte buffer handed to the host
#[repr(C)]
pub struct RawBridgeBuffer {
    pub data: *mut u8,
    pub len: usize,
}

fn into_raw_buffer(bytes: Vec<u8>) -> *mut RawBridgeBuffer {
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    let data = Box::into_raw(boxed) as *mut u8;
    Box::into_raw(Box::new(RawBridgeBuffer { data, len }))
}

fn set_last_error(code: c_int) {
    LAST_ERROR.with(|e| e.set(code));
}

/// Run `f`, record its outcome for `raw_bridge_last_error`, and hand back a buffer or null
fn guarded(op: &str, f: impl FnOnce() -> Result<Vec<u8>>) -> *mut RawBridgeBuffer {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(bytes)) => {
            set_last_error(RAW_BRIDGE_OK);
            into_raw_buffer(bytes)
        }
        Ok(Err(e)) => {
            warn!(op, kind = e.kind().as_str(), "{}", e);
            set_last_error(e.kind().code());
            ptr::null_mut()
        }
        Err(_) => {
            error!("{} panicked", op);
            set_last_error(RAW_BRIDGE_PANIC);
            ptr::null_mut()
        }
    }
}

unsafe fn path_arg<'a>(path: *const c_char) -> Result<&'a Path> {
    if path.is_null() {
        return Err(DecodeError::InvalidSource("null path".to_string()));
    }
    let s = unsafe { CStr::from_ptr(path) }
        .to_str()
        .map_err(|_| DecodeError::InvalidSource("path is not valid UTF-8".to_string()))?;
    Ok(Path::new(s))
}

unsafe fn bytes_arg<'a>(data: *const u8, len: usize) -> Result<&'a [u8]> {
    if data.is_null() || len == 0 {
        return Err(DecodeError::InvalidSource("null or empty buffer".to_string()));
    }
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

/// Library version. The pointer is static; do not free it.
#[no_mangle]
pub extern "C" fn raw_bridge_version() -> *const c_char {
    static VERSION: OnceLock<CString> = OnceLock::new();
    VERSION
        .get_or_init(|| {
            let v = panic::catch_unwind(|| DecodeBridge::new().version())
                .unwrap_or_else(|_| crate::bridge::UNKNOWN_VERSION.to_string());
            CString::new(v).unwrap_or_default()
        })
        .as_ptr()
}

/// Failure code of the last call on this thread, 0 after success
#[no_mangle]
pub extern "C" fn raw_bridge_last_error() -> c_int {
    LAST_ERROR.with(|e| e.get())
}

/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn raw_bridge_decode_thumbnail(path: *const c_char) -> *mut RawBridgeBuffer {
    guarded("decode_thumbnail", || {
        let path = unsafe { path_arg(path) }?;
        DecodeBridge::new().decode_thumbnail(Source::Path(path))
    })
}

/// # Safety
/// `data` must be null or point to `len` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn raw_bridge_decode_thumbnail_from_bytes(
    data: *const u8,
    len: usize,
) -> *mut RawBridgeBuffer {
    guarded("decode_thumbnail_from_bytes", || {
        let data = unsafe { bytes_arg(data, len) }?;
        DecodeBridge::new().decode_thumbnail(Source::Bytes(data))
    })
}

/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn raw_bridge_decode_to_rgb(path: *const c_char) -> *mut RawBridgeBuffer {
    guarded("decode_to_rgb", || {
        let path = unsafe { path_arg(path) }?;
        DecodeBridge::new().decode_to_rgb(Source::Path(path))
    })
}

/// # Safety
/// `data` must be null or point to `len` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn raw_bridge_decode_to_rgb_from_bytes(
    data: *const u8,
    len: usize,
) -> *mut RawBridgeBuffer {
    guarded("decode_to_rgb_from_bytes", || {
        let data = unsafe { bytes_arg(data, len) }?;
        DecodeBridge::new().decode_to_rgb(Source::Bytes(data))
    })
}

/// Release a buffer returned by any decode function. Null is ignored.
///
/// # Safety
/// `buffer` must come from this library and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn raw_bridge_buffer_free(buffer: *mut RawBridgeBuffer) {
    if buffer.is_null() {
        return;
    }
    let buffer = unsafe { Box::from_raw(buffer) };
    if !buffer.data.is_null() {
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(buffer.data, buffer.len)) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_null_arguments_return_null() {
        unsafe {
            assert!(raw_bridge_decode_thumbnail(ptr::null()).is_null());
            assert_eq!(raw_bridge_last_error(), ErrorKind::InvalidSource.code());

            assert!(raw_bridge_decode_to_rgb_from_bytes(ptr::null(), 10).is_null());
            assert_eq!(raw_bridge_last_error(), ErrorKind::InvalidSource.code());

            let data = [1u8; 4];
            assert!(raw_bridge_decode_thumbnail_from_bytes(data.as_ptr(), 0).is_null());
            assert_eq!(raw_bridge_last_error(), ErrorKind::InvalidSource.code());
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_rejected_arguments_are_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || unsafe {
            assert!(raw_bridge_decode_thumbnail(ptr::null()).is_null());
        });

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "no warning in: {}", output);
        assert!(output.contains("decode_thumbnail"));
        assert!(output.contains("InvalidSource"));
    }

    #[test]
    fn test_garbage_bytes_report_open_failure() {
        let data = vec![0x5Au8; 2048];
        unsafe {
            assert!(raw_bridge_decode_to_rgb_from_bytes(data.as_ptr(), data.len()).is_null());
        }
        assert_eq!(raw_bridge_last_error(), ErrorKind::Open.code());
    }

    #[test]
    fn test_missing_file_reports_open_failure() {
        let path = CString::new("/nonexistent/file.NEF").unwrap();
        unsafe {
            assert!(raw_bridge_decode_to_rgb(path.as_ptr()).is_null());
        }
        assert_eq!(raw_bridge_last_error(), ErrorKind::Open.code());
    }

    #[test]
    fn test_guarded_success_and_panic() {
        let buf = guarded("test", || Ok(vec![9u8; 5]));
        assert_eq!(raw_bridge_last_error(), RAW_BRIDGE_OK);
        unsafe {
            assert_eq!((*buf).len, 5);
            assert_eq!(*(*buf).data.add(4), 9);
            raw_bridge_buffer_free(buf);
            raw_bridge_buffer_free(ptr::null_mut());
        }

        let buf = guarded("test", || panic!("boom"));
        assert!(buf.is_null());
        assert_eq!(raw_bridge_last_error(), RAW_BRIDGE_PANIC);
    }

    #[test]
    fn test_version_is_static_and_non_empty() {
        let a = raw_bridge_version();
        let b = raw_bridge_version();
        assert_eq!(a, b);
        let s = unsafe { CStr::from_ptr(a) }.to_str().unwrap();
        assert!(!s.is_empty());
    }
}
