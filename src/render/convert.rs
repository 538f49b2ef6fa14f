//! Decoded frame to premultiplied `vello_cpu::Pixmap` conversion.
//!
//! Conversion runs on the rayon pool; [`FrameConverter`] hands results back over a channel so the
//! owner can discard the ones that were superseded while in flight.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use rayon::prelude::*;

use crate::decode::frame::{FrameImage, PixelFormat};
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::foundation::math::mul_div255_u8;

/// Convert a decoded image into a premultiplied pixmap of the same size.
pub fn frame_to_pixmap(image: &FrameImage) -> PlayerResult<vello_cpu::Pixmap> {
    let w: u16 = image
        .width
        .try_into()
        .map_err(|_| PlayerError::render("frame width exceeds u16"))?;
    let h: u16 = image
        .height
        .try_into()
        .map_err(|_| PlayerError::render("frame height exceeds u16"))?;
    let rgba = match image.format {
        PixelFormat::I420 => i420_to_rgba8(image)?,
        PixelFormat::Rgba8 => premultiply_rgba8(&image.data),
    };
    pixmap_from_premul_bytes(&rgba, w, h)
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u16,
    height: u16,
) -> PlayerResult<vello_cpu::Pixmap> {
    if bytes.len() != usize::from(width) * usize::from(height) * 4 {
        return Err(PlayerError::render("pixmap byte len mismatch"));
    }
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, width, height, true,
    ))
}

pub(crate) fn pixmap_to_image(pixmap: vello_cpu::Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    }
}

pub(crate) fn premultiply_rgba8(straight: &[u8]) -> Vec<u8> {
    let mut out = straight.to_vec();
    out.par_chunks_mut(4).for_each(|px| {
        let a = u16::from(px[3]);
        for c in &mut px[..3] {
            *c = mul_div255_u8(u16::from(*c), a);
        }
    });
    out
}

/// BT.601 limited-range YUV to opaque RGBA8, one rayon task per output row.
fn i420_to_rgba8(image: &FrameImage) -> PlayerResult<Vec<u8>> {
    let (y_plane, u_plane, v_plane) = image
        .planes()
        .ok_or_else(|| PlayerError::render("frame is not I420"))?;
    let w = image.width as usize;
    let cw = w.div_ceil(2);

    let mut out = vec![0u8; w * image.height as usize * 4];
    out.par_chunks_mut(w * 4).enumerate().for_each(|(row, dst)| {
        let y_row = &y_plane[row * w..(row + 1) * w];
        let c_off = (row / 2) * cw;
        let u_row = &u_plane[c_off..c_off + cw];
        let v_row = &v_plane[c_off..c_off + cw];
        for (x, px) in dst.chunks_exact_mut(4).enumerate() {
            let [r, g, b] = yuv_to_rgb(y_row[x], u_row[x / 2], v_row[x / 2]);
            px.copy_from_slice(&[r, g, b, 255]);
        }
    });
    Ok(out)
}

#[inline]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

pub(crate) type Converted = (u64, PlayerResult<vello_cpu::Pixmap>);

/// Runs conversions off-thread; each job is tagged with the caller's token.
pub struct FrameConverter {
    tx: Sender<Converted>,
    rx: Receiver<Converted>,
    in_flight: usize,
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameConverter {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn submit(&mut self, token: u64, image: FrameImage) {
        self.in_flight += 1;
        let tx = self.tx.clone();
        rayon::spawn(move || {
            let _ = tx.send((token, frame_to_pixmap(&image)));
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// A finished job, if any, without blocking.
    pub fn try_next(&mut self) -> Option<Converted> {
        match self.rx.try_recv() {
            Ok(done) => {
                self.in_flight -= 1;
                Some(done)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block for the next finished job. `None` when nothing is in flight.
    pub fn next_blocking(&mut self) -> Option<Converted> {
        if self.in_flight == 0 {
            return None;
        }
        let done = self.rx.recv().ok()?;
        self.in_flight -= 1;
        Some(done)
    }
}

impl std::fmt::Debug for FrameConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameConverter")
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/convert.rs"]
mod tests;
