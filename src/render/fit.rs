use crate::foundation::core::{Rect, Size};

/// How a frame is scaled into the target area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Letterbox: the whole frame is visible, aspect ratio preserved.
    #[default]
    Contain,
    /// Fill the target, aspect ratio preserved, overflow cropped.
    Cover,
    /// Stretch to the target, aspect ratio ignored.
    Fill,
}

/// Rectangle (in `dst` space) that a `src`-sized frame occupies, centered in `dst`.
///
/// A degenerate `src` or `dst` yields `dst` unchanged.
pub fn fit_rect(src: Size, dst: Rect, mode: FitMode) -> Rect {
    let (dw, dh) = (dst.width(), dst.height());
    if !(src.width > 0.0 && src.height > 0.0 && dw > 0.0 && dh > 0.0) {
        return dst;
    }
    let sx = dw / src.width;
    let sy = dh / src.height;
    let scale = match mode {
        FitMode::Fill => return dst,
        FitMode::Contain => sx.min(sy),
        FitMode::Cover => sx.max(sy),
    };
    let w = src.width * scale;
    let h = src.height * scale;
    let center = dst.center();
    Rect::new(
        center.x - w / 2.0,
        center.y - h / 2.0,
        center.x + w / 2.0,
        center.y + h / 2.0,
    )
}

#[cfg(test)]
#[path = "../../tests/unit/render/fit.rs"]
mod tests;
