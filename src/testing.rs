//! Instrumented in-memory backend
//!
//! Stands in for LibRaw in tests. Every session and processed image it hands
//! out is counted on creation and on drop, so a test can assert that nothing
//! is left open after a call, whichever branch it took.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{DecodeSession, ProcessedImage, RawBackend, Thumbnail, ThumbnailFormat};
use crate::error::BackendError;
use crate::options::DecodeOptions;
use crate::source::Source;

/// Images larger than this get an empty payload instead of a generated one
const MAX_GENERATED_PAYLOAD: usize = 16 * 1024 * 1024;

/// Stage at which the mock library reports failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Open,
    Unpack,
    Thumbnail,
    Process,
    MakeImage,
}

impl FailAt {
    fn error(self) -> BackendError {
        match self {
            FailAt::Open => BackendError::new(-2, "Unsupported file format or not RAW file"),
            FailAt::Unpack => BackendError::new(-4, "Corrupted data or unexpected EOF"),
            FailAt::Thumbnail => BackendError::new(-5, "No thumbnail in file"),
            FailAt::Process => BackendError::new(-8, "Cancelled by callback"),
            FailAt::MakeImage => BackendError::new(-100007, "Out of memory"),
        }
    }
}

/// Description of the RAW file every mock session decodes
#[derive(Debug, Clone)]
pub struct MockRaw {
    pub width: u32,
    pub height: u32,
    pub bits: u16,
    pub colors: u16,
    pub thumbnail: Option<(ThumbnailFormat, Vec<u8>)>,
    pub fail_at: Option<FailAt>,
    /// Overrides the generated payload length
    pub payload_len: Option<usize>,
}

impl MockRaw {
    /// An 8-bit RGB image with a JPEG thumbnail of `thumb_len` bytes
    pub fn new(width: u32, height: u32, thumb_len: usize) -> Self {
        let mut thumb = vec![0u8; thumb_len];
        // SOI marker so magic sniffing agrees with the declared format
        if thumb_len >= 3 {
            thumb[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        }
        for (i, b) in thumb.iter_mut().enumerate().skip(3) {
            *b = (i % 256) as u8;
        }
        Self {
            width,
            height,
            bits: 8,
            colors: 3,
            thumbnail: Some((ThumbnailFormat::Jpeg, thumb)),
            fail_at: None,
            payload_len: None,
        }
    }

    pub fn failing_at(mut self, stage: FailAt) -> Self {
        self.fail_at = Some(stage);
        self
    }

    pub fn with_thumbnail(mut self, format: ThumbnailFormat, data: Vec<u8>) -> Self {
        self.thumbnail = Some((format, data));
        self
    }

    pub fn with_format(mut self, bits: u16, colors: u16) -> Self {
        self.bits = bits;
        self.colors = colors;
        self
    }

    fn payload(&self) -> Vec<u8> {
        let bytes_per_sample = (self.bits as usize).div_ceil(8);
        let len = self.payload_len.unwrap_or_else(|| {
            (self.width as usize)
                .checked_mul(self.height as usize)
                .and_then(|px| px.checked_mul(self.colors as usize))
                .and_then(|n| n.checked_mul(bytes_per_sample))
                .filter(|&n| n <= MAX_GENERATED_PAYLOAD)
                .unwrap_or(0)
        });
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn fails_at(&self, stage: FailAt) -> Result<(), BackendError> {
        match self.fail_at {
            Some(s) if s == stage => Err(stage.error()),
            _ => Ok(()),
        }
    }
}

/// Live-resource counters shared by a backend and everything it creates
#[derive(Debug, Default)]
pub struct Instrumentation {
    sessions_opened: AtomicUsize,
    sessions_released: AtomicUsize,
    images_made: AtomicUsize,
    images_released: AtomicUsize,
    options_seen: Mutex<Vec<DecodeOptions>>,
}

impl Instrumentation {
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn images_made(&self) -> usize {
        self.images_made.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions_opened() - self.sessions_released.load(Ordering::SeqCst)
    }

    pub fn live_images(&self) -> usize {
        self.images_made() - self.images_released.load(Ordering::SeqCst)
    }

    /// Options passed to `process`, in call order
    pub fn options_seen(&self) -> Vec<DecodeOptions> {
        self.options_seen
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MockBackend {
    raw: Arc<MockRaw>,
    stats: Arc<Instrumentation>,
}

impl MockBackend {
    pub fn new(raw: MockRaw) -> Self {
        Self {
            raw: Arc::new(raw),
            stats: Arc::new(Instrumentation::default()),
        }
    }

    pub fn stats(&self) -> Arc<Instrumentation> {
        Arc::clone(&self.stats)
    }
}

impl RawBackend for MockBackend {
    type Session<'a> = MockSession<'a>;

    fn open<'a>(&'a self, _source: Source<'a>) -> Result<MockSession<'a>, BackendError> {
        self.raw.fails_at(FailAt::Open)?;
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            backend: self,
            unpacked: false,
            processed: false,
        })
    }

    fn version(&self) -> Option<String> {
        Some("0.0.0-mock".to_string())
    }

    fn probe(&self, _data: &[u8]) -> Result<(u32, u32), BackendError> {
        self.raw.fails_at(FailAt::Open)?;
        Ok((self.raw.width, self.raw.height))
    }
}

pub struct MockSession<'a> {
    backend: &'a MockBackend,
    unpacked: bool,
    processed: bool,
}

impl DecodeSession for MockSession<'_> {
    type Image = MockImage;

    fn unpack_thumbnail(&mut self) -> Result<Thumbnail<'_>, BackendError> {
        let raw = &self.backend.raw;
        raw.fails_at(FailAt::Thumbnail)?;
        match &raw.thumbnail {
            Some((format, data)) => Ok(Thumbnail {
                format: *format,
                data: data.as_slice(),
            }),
            None => Err(FailAt::Thumbnail.error()),
        }
    }

    fn unpack_raw(&mut self) -> Result<(), BackendError> {
        self.backend.raw.fails_at(FailAt::Unpack)?;
        self.unpacked = true;
        Ok(())
    }

    fn process(&mut self, options: &DecodeOptions) -> Result<(), BackendError> {
        if !self.unpacked {
            return Err(BackendError::new(-7, "Out of order call of libraw function"));
        }
        if let Ok(mut seen) = self.backend.stats.options_seen.lock() {
            seen.push(options.clone());
        }
        self.backend.raw.fails_at(FailAt::Process)?;
        self.processed = true;
        Ok(())
    }

    fn make_image(&mut self) -> Result<MockImage, BackendError> {
        if !self.processed {
            return Err(BackendError::new(-7, "Out of order call of libraw function"));
        }
        let raw = &self.backend.raw;
        raw.fails_at(FailAt::MakeImage)?;
        self.backend.stats.images_made.fetch_add(1, Ordering::SeqCst);
        Ok(MockImage {
            width: raw.width,
            height: raw.height,
            bits: raw.bits,
            colors: raw.colors,
            data: raw.payload(),
            stats: Arc::clone(&self.backend.stats),
        })
    }
}

impl Drop for MockSession<'_> {
    fn drop(&mut self) {
        self.backend
            .stats
            .sessions_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockImage {
    width: u32,
    height: u32,
    bits: u16,
    colors: u16,
    data: Vec<u8>,
    stats: Arc<Instrumentation>,
}

impl ProcessedImage for MockImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bits(&self) -> u16 {
        self.bits
    }

    fn colors(&self) -> u16 {
        self.colors
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockImage {
    fn drop(&mut self) {
        self.stats.images_released.fetch_add(1, Ordering::SeqCst);
    }
}
