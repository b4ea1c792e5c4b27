//! Frame data model.
//!
//! Producers hand the engine `ProducerFrame` values: a small tree of
//! payloads, transforms, and groups that the mixer flattens once per
//! tick. Images are reference-counted and immutable after creation, so
//! a composite can share its constituents until they are blitted.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::types::{PixelFormat, Rational};

/// Reference-counted immutable pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Arc<Vec<u8>>,
}

impl ImageBuffer {
    /// Allocate a zeroed buffer (transparent black for BGRA).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: Arc::new(vec![0u8; size]),
        }
    }

    /// Wrap an existing pixel vector.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not match the geometry.
    pub fn from_vec(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "pixel data does not match geometry"
        );
        Self {
            width,
            height,
            format,
            data: Arc::new(data),
        }
    }

    /// A BGRA buffer filled with one color.
    pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width as usize * height as usize {
            data.extend_from_slice(&bgra);
        }
        Self::from_vec(width, height, PixelFormat::Bgra, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        &self.data[y as usize * stride..(y as usize + 1) * stride]
    }

    /// Pixel bytes at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride() + x as usize * bpp;
        &self.data[offset..offset + bpp]
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

/// Interleaved signed 32-bit audio samples.
pub type AudioBuffer = Vec<i32>;

/// Image + audio payload emitted by a producer for one tick.
#[derive(Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub image: ImageBuffer,
    pub audio: AudioBuffer,
    /// Display picture number from the source, for diagnostics and
    /// timecode-aware sinks.
    pub picture_number: i64,
}

impl DataFrame {
    pub fn new(image: ImageBuffer) -> Self {
        Self {
            image,
            audio: AudioBuffer::new(),
            picture_number: 0,
        }
    }
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("image", &self.image)
            .field("audio_samples", &self.audio.len())
            .field("picture_number", &self.picture_number)
            .finish()
    }
}

/// Alpha / translation / texture-window / volume transform attached to
/// a frame by a transition or the control surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameTransform {
    /// Opacity multiplier, 0.0..=1.0.
    pub alpha: f64,
    /// Translation in screen units (1.0 = full frame width/height).
    pub translate: (f64, f64),
    /// Texture window (left, bottom, right, top) in texture units.
    pub texcoord: (f64, f64, f64, f64),
    /// Audio volume, 0..=255.
    pub volume: u8,
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            translate: (0.0, 0.0),
            texcoord: (0.0, 1.0, 1.0, 0.0),
            volume: 255,
        }
    }
}

impl FrameTransform {
    /// Combine with an inner transform (self applied outside `inner`).
    pub fn combine(&self, inner: &FrameTransform) -> FrameTransform {
        let (ol, ob, or, ot) = self.texcoord;
        let (il, ib, ir, it) = inner.texcoord;
        FrameTransform {
            alpha: self.alpha * inner.alpha,
            translate: (
                self.translate.0 + inner.translate.0,
                self.translate.1 + inner.translate.1,
            ),
            // Map the inner window through the outer one.
            texcoord: (
                ol + il * (or - ol),
                ot + ib * (ob - ot),
                ol + ir * (or - ol),
                ot + it * (ob - ot),
            ),
            volume: ((self.volume as u16 * inner.volume as u16) / 255) as u8,
        }
    }
}

/// What a producer yields each tick: a payload, a transformed or
/// composited subtree, the compositing identity, or end-of-stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ProducerFrame {
    Data(Arc<DataFrame>),
    Transformed(FrameTransform, Box<ProducerFrame>),
    /// Back-to-front composite.
    Group(Vec<ProducerFrame>),
    /// Contributes nothing when composited.
    Empty,
    /// Terminal sentinel; never composited.
    Eof,
}

impl ProducerFrame {
    pub fn is_eof(&self) -> bool {
        matches!(self, ProducerFrame::Eof)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ProducerFrame::Empty)
    }

    pub fn with_transform(self, transform: FrameTransform) -> ProducerFrame {
        ProducerFrame::Transformed(transform, Box::new(self))
    }
}

/// Decoded source frame on its way into the frame muxer.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    pub image: ImageBuffer,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub sample_aspect_ratio: Rational,
    pub picture_number: i64,
}

impl DecodedFrame {
    pub fn progressive(image: ImageBuffer, picture_number: i64) -> Self {
        Self {
            image,
            interlaced: false,
            top_field_first: false,
            sample_aspect_ratio: Rational::ONE,
            picture_number,
        }
    }
}

/// Final mixed frame delivered to consumers.
#[derive(Clone, Debug)]
pub struct OutputFrame {
    pub image: ImageBuffer,
    pub audio: Arc<AudioBuffer>,
    /// Monotonic tick number.
    pub number: u64,
    created: Instant,
}

impl OutputFrame {
    pub fn new(image: ImageBuffer, audio: Arc<AudioBuffer>, number: u64) -> Self {
        Self {
            image,
            audio,
            number,
            created: Instant::now(),
        }
    }

    /// Milliseconds since this frame was mixed; consumers report it as
    /// their presentation delay.
    pub fn age_millis(&self) -> i64 {
        self.created.elapsed().as_millis() as i64
    }
}
