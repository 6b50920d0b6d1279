//! Captured frame container.
//!
//! - `Frame`: Immutable pixel buffer produced by a frame source. Bytes are private.
//! - `PixelFormat`: Memory layout of the pixel bytes.
//!
//! A frame is built once by the ingestion layer, stamped with its stream position by the
//! capture thread, then moved through the queue into the detection loop. There is no mutable
//! access to the pixels after construction.

use anyhow::{anyhow, Result};

use crate::ingest::normalize::normalize_to_luma;
use crate::vision::GrayImage;
use crate::StreamPosition;

/// Pixel layouts accepted from frame sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Gray8,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit B, G, R (the usual camera/OpenCV order).
    Bgr24,
    /// Y plane followed by interleaved UV at quarter resolution.
    Nv12,
    /// Packed Y0 U Y1 V.
    Yuyv,
}

impl PixelFormat {
    /// Expected buffer length for a `width` x `height` frame.
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Gray8 => Some(pixels),
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
            PixelFormat::Yuyv => pixels.checked_mul(2),
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A single decoded video frame.
///
/// No `Clone`: a frame has exactly one owner at a time.
#[derive(Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    position: StreamPosition,
}

impl Frame {
    /// Build a frame, validating the buffer length against the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
            return Err(anyhow!("NV12 frames require even dimensions"));
        }
        if format == PixelFormat::Yuyv && width % 2 != 0 {
            return Err(anyhow!("YUYV frames require an even width"));
        }
        let expected = format
            .buffer_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            position: StreamPosition::ZERO,
        })
    }

    /// Uniform gray frame, mostly useful for synthetic scenes and tests.
    pub fn filled_gray(width: u32, height: u32, value: u8) -> Result<Self> {
        let len = PixelFormat::Gray8
            .buffer_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        Self::new(vec![value; len], width, height, PixelFormat::Gray8)
    }

    /// Stamp the frame with the stream position it was read at.
    pub fn at_position(mut self, position: StreamPosition) -> Self {
        self.position = position;
        self
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

    pub fn position(&self) -> StreamPosition {
        self.position
    }

    /// Read-only pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// BT.601 luma image of this frame.
    pub fn luma(&self) -> Result<GrayImage> {
        normalize_to_luma(&self.data, self.width, self.height, self.format)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
