use crate::foundation::error::{PlayerError, PlayerResult};
use crate::foundation::math::mul_div255_u8;

pub use kurbo::{Affine, Rect, Size};

/// Microseconds per millisecond.
pub const US_PER_MS: i64 = 1_000;
/// Microseconds per second.
pub const US_PER_SEC: i64 = 1_000_000;

/// Convert milliseconds to microseconds, rounding to the nearest tick.
pub fn ms_to_us(ms: f64) -> i64 {
    if !ms.is_finite() {
        return 0;
    }
    (ms * US_PER_MS as f64).round() as i64
}

/// Convert microseconds to (fractional) milliseconds.
pub fn us_to_ms(us: i64) -> f64 {
    us as f64 / US_PER_MS as f64
}

/// Convert a media-timescale tick count to microseconds.
///
/// A zero timescale maps everything to 0.
pub fn ticks_to_us(ticks: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    ((i128::from(ticks) * i128::from(US_PER_SEC)) / i128::from(timescale)) as i64
}

/// Convert microseconds to media-timescale ticks (floor).
pub fn us_to_ticks(us: i64, timescale: u32) -> i64 {
    ((i128::from(us) * i128::from(timescale)).div_euclid(i128::from(US_PER_SEC))) as i64
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(s: &str) -> PlayerResult<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(PlayerError::validation(format!(
                "color '{s}' must be #rrggbb or #rrggbbaa"
            )));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| PlayerError::validation(format!("color '{s}' is not valid hex")))
        };
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Self::new(byte(0)?, byte(2)?, byte(4)?, a))
    }

    /// Premultiplied components, rounded the same way everywhere in the crate.
    pub fn premultiplied(self) -> [u8; 4] {
        let a = u16::from(self.a);
        let premul = |c: u8| mul_div255_u8(u16::from(c), a);
        [premul(self.r), premul(self.g), premul(self.b), self.a]
    }
}

impl Default for Rgba8 {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
