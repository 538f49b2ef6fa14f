use std::sync::Arc;

use crate::foundation::error::{PlayerError, PlayerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0: full-size Y, then quarter-size U and V (chroma rounds up on odd sizes).
    I420,
    /// Packed straight-alpha RGBA8.
    Rgba8,
}

impl PixelFormat {
    pub fn byte_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::I420 => {
                let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
                w * h + 2 * cw * ch
            }
            Self::Rgba8 => w * h * 4,
        }
    }
}

/// Decoded picture planes. Cloning shares the pixel storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameImage {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl FrameImage {
    pub fn new(format: PixelFormat, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> PlayerResult<Self> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(PlayerError::decoder("frame width/height must be non-zero"));
        }
        let expected = format.byte_len(width, height);
        if data.len() != expected {
            return Err(PlayerError::decoder(format!(
                "{format:?} frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// `(y, u, v)` planes of an I420 image.
    pub fn planes(&self) -> Option<(&[u8], &[u8], &[u8])> {
        if self.format != PixelFormat::I420 {
            return None;
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        let (y, rest) = self.data.split_at(w * h);
        let (u, v) = rest.split_at(chroma);
        Some((y, u, v))
    }
}

/// One decoded picture with its presentation window.
///
/// Clones share the underlying planes; `close` drops this handle's share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub image: FrameImage,
    pub timestamp_us: i64,
    pub duration_us: i64,
}

impl DecodedFrame {
    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us
    }

    /// Release this handle. The frame must not be used afterwards (enforced by move).
    pub fn close(self) {}
}
