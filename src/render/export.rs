use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::foundation::core::Rgba8;
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::foundation::math::flatten_premul_over;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Encode premultiplied RGBA8 pixels as a `data:` URI.
///
/// `quality` (0..=1) only affects JPEG, which is flattened over `background` first.
pub fn encode_data_uri(
    premul: &[u8],
    width: u32,
    height: u32,
    format: ExportFormat,
    quality: f32,
    background: Rgba8,
) -> PlayerResult<String> {
    let bytes = encode(premul, width, height, format, quality, background)?;
    Ok(format!(
        "data:{};base64,{}",
        format.mime(),
        BASE64.encode(bytes)
    ))
}

pub fn encode(
    premul: &[u8],
    width: u32,
    height: u32,
    format: ExportFormat,
    quality: f32,
    background: Rgba8,
) -> PlayerResult<Vec<u8>> {
    let expected = (width as usize) * (height as usize) * 4;
    if premul.len() != expected {
        return Err(PlayerError::render(format!(
            "export expects {expected} bytes for {width}x{height}, got {}",
            premul.len()
        )));
    }

    let mut out = Vec::new();
    match format {
        ExportFormat::Png => {
            let mut straight = premul.to_vec();
            unpremultiply_in_place(&mut straight);
            let img = image::RgbaImage::from_raw(width, height, straight)
                .ok_or_else(|| PlayerError::render("invalid rgba buffer size"))?;
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                .map_err(|e| PlayerError::render(format!("png encode failed: {e}")))?;
        }
        ExportFormat::Jpeg => {
            let mut opaque = vec![0u8; premul.len()];
            flatten_premul_over(&mut opaque, premul, background)?;
            let rgb = opaque
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect::<Vec<_>>();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality));
            image::ImageEncoder::write_image(
                encoder,
                &rgb,
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| PlayerError::render(format!("jpeg encode failed: {e}")))?;
        }
    }
    Ok(out)
}

fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality } else { 0.92 };
    ((q.clamp(0.0, 1.0) * 100.0).round() as u8).max(1)
}

pub(crate) fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/export.rs"]
mod tests;
