use crate::foundation::core::Affine;
use crate::foundation::error::{PlayerError, PlayerResult};

/// Backing store sized in device pixels for a logical (CSS-pixel) area.
pub struct Surface {
    width: f64,
    height: f64,
    device_pixel_ratio: f64,
    base_transform: Affine,
    pixmap: vello_cpu::Pixmap,
}

impl Surface {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> PlayerResult<Self> {
        if !device_pixel_ratio.is_finite() || device_pixel_ratio <= 0.0 {
            return Err(PlayerError::validation(
                "device pixel ratio must be finite and > 0",
            ));
        }
        let (pw, ph) = backing_size(width, height, device_pixel_ratio)?;
        Ok(Self {
            width,
            height,
            device_pixel_ratio,
            base_transform: Affine::scale(device_pixel_ratio),
            pixmap: vello_cpu::Pixmap::new(pw, ph),
        })
    }

    /// Reallocate for a new logical size. The base transform is reassigned, never multiplied.
    pub fn resize(&mut self, width: f64, height: f64) -> PlayerResult<()> {
        let (pw, ph) = backing_size(width, height, self.device_pixel_ratio)?;
        if pw != self.pixmap.width() || ph != self.pixmap.height() {
            self.pixmap = vello_cpu::Pixmap::new(pw, ph);
        }
        self.width = width;
        self.height = height;
        self.base_transform = Affine::scale(self.device_pixel_ratio);
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Logical-to-device transform.
    pub fn base_transform(&self) -> Affine {
        self.base_transform
    }

    pub fn pixel_width(&self) -> u16 {
        self.pixmap.width()
    }

    pub fn pixel_height(&self) -> u16 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &vello_cpu::Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut vello_cpu::Pixmap {
        &mut self.pixmap
    }

    /// Premultiplied RGBA8, row-major, `pixel_width * pixel_height * 4` bytes.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("pixel_width", &self.pixmap.width())
            .field("pixel_height", &self.pixmap.height())
            .finish()
    }
}

/// Device-pixel size for a logical size: `round(css * dpr)`, clamped to `1..=u16::MAX`.
pub fn backing_size(width: f64, height: f64, device_pixel_ratio: f64) -> PlayerResult<(u16, u16)> {
    fn dim(v: f64) -> PlayerResult<u16> {
        if !v.is_finite() || v < 0.0 {
            return Err(PlayerError::validation(format!(
                "surface dimension must be finite and >= 0, got {v}"
            )));
        }
        Ok(v.round().clamp(1.0, f64::from(u16::MAX)) as u16)
    }
    Ok((
        dim(width * device_pixel_ratio)?,
        dim(height * device_pixel_ratio)?,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
