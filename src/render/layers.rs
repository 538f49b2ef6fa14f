//! Host-supplied overlays drawn above the video frame.

use std::sync::Arc;

use crate::foundation::core::{Affine, Rect};
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::render::convert::{pixmap_from_premul_bytes, pixmap_to_image, premultiply_rgba8};

/// What a layer draws into during a composite pass.
///
/// The context transform is preset to the logical-to-device scale, so layers draw in logical
/// units within `width` x `height`.
pub struct LayerContext<'a> {
    pub ctx: &'a mut vello_cpu::RenderContext,
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

impl LayerContext<'_> {
    pub fn base_transform(&self) -> Affine {
        Affine::scale(self.device_pixel_ratio)
    }
}

pub trait LayerRenderer: Send {
    fn render(&mut self, target: &mut LayerContext<'_>) -> PlayerResult<()>;
}

impl<F> LayerRenderer for F
where
    F: FnMut(&mut LayerContext<'_>) -> PlayerResult<()> + Send,
{
    fn render(&mut self, target: &mut LayerContext<'_>) -> PlayerResult<()> {
        self(target)
    }
}

pub struct Layer {
    pub id: String,
    pub z_index: i32,
    pub visible: bool,
    renderer: Box<dyn LayerRenderer>,
}

impl Layer {
    pub fn new(id: impl Into<String>, z_index: i32, renderer: impl LayerRenderer + 'static) -> Self {
        Self {
            id: id.into(),
            z_index,
            visible: true,
            renderer: Box::new(renderer),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub(crate) fn render(&mut self, target: &mut LayerContext<'_>) -> PlayerResult<()> {
        self.renderer.render(target)
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("z_index", &self.z_index)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

/// A PNG/JPEG placed at a logical rectangle.
pub struct ImageLayer {
    paint: vello_cpu::Image,
    width: u32,
    height: u32,
    rect: Rect,
    opacity: f32,
}

impl ImageLayer {
    pub fn from_encoded(bytes: &[u8], rect: Rect) -> PlayerResult<Self> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|e| PlayerError::render(format!("decode overlay image: {e}")))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let w: u16 = width
            .try_into()
            .map_err(|_| PlayerError::render("overlay image width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| PlayerError::render("overlay image height exceeds u16"))?;
        let premul = premultiply_rgba8(rgba.as_raw());
        Ok(Self {
            paint: pixmap_to_image(pixmap_from_premul_bytes(&premul, w, h)?),
            width,
            height,
            rect,
            opacity: 1.0,
        })
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

impl LayerRenderer for ImageLayer {
    fn render(&mut self, target: &mut LayerContext<'_>) -> PlayerResult<()> {
        if self.opacity <= 0.0 || self.rect.width() <= 0.0 || self.rect.height() <= 0.0 {
            return Ok(());
        }
        let tr = target.base_transform()
            * Affine::translate((self.rect.x0, self.rect.y0))
            * Affine::scale_non_uniform(
                self.rect.width() / f64::from(self.width),
                self.rect.height() / f64::from(self.height),
            );
        draw_image(
            target.ctx,
            &self.paint,
            tr,
            f64::from(self.width),
            f64::from(self.height),
            self.opacity,
        );
        Ok(())
    }
}

/// An SVG document (typically a text overlay) rasterized at device resolution.
pub struct SvgLayer {
    tree: Arc<usvg::Tree>,
    rect: Rect,
    raster: Option<(u32, u32, vello_cpu::Image)>,
}

impl SvgLayer {
    pub fn from_data(bytes: &[u8], rect: Rect) -> PlayerResult<Self> {
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
            .map_err(|e| PlayerError::render(format!("parse overlay svg: {e}")))?;
        Ok(Self {
            tree: Arc::new(tree),
            rect,
            raster: None,
        })
    }

    fn paint_for(&mut self, width: u32, height: u32) -> PlayerResult<vello_cpu::Image> {
        if let Some((w, h, img)) = &self.raster
            && *w == width
            && *h == height
        {
            return Ok(img.clone());
        }
        let premul = rasterize_svg_to_premul_rgba8(&self.tree, width, height)?;
        let w: u16 = width
            .try_into()
            .map_err(|_| PlayerError::render("svg raster width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| PlayerError::render("svg raster height exceeds u16"))?;
        let img = pixmap_to_image(pixmap_from_premul_bytes(&premul, w, h)?);
        self.raster = Some((width, height, img.clone()));
        Ok(img)
    }
}

impl LayerRenderer for SvgLayer {
    fn render(&mut self, target: &mut LayerContext<'_>) -> PlayerResult<()> {
        if self.rect.width() <= 0.0 || self.rect.height() <= 0.0 {
            return Ok(());
        }
        let dpr = target.device_pixel_ratio;
        let pw = svg_raster_dim(self.rect.width() * dpr)?;
        let ph = svg_raster_dim(self.rect.height() * dpr)?;
        let paint = self.paint_for(pw, ph)?;
        // Raster pixels map 1:1 to device pixels.
        let tr = Affine::translate((self.rect.x0 * dpr, self.rect.y0 * dpr))
            * Affine::scale_non_uniform(
                self.rect.width() * dpr / f64::from(pw),
                self.rect.height() * dpr / f64::from(ph),
            );
        draw_image(target.ctx, &paint, tr, f64::from(pw), f64::from(ph), 1.0);
        Ok(())
    }
}

fn svg_raster_dim(v: f64) -> PlayerResult<u32> {
    const MAX_DIM: f64 = 16_384.0;
    if !v.is_finite() || v <= 0.0 {
        return Err(PlayerError::render("svg layer has invalid width/height"));
    }
    if v > MAX_DIM {
        return Err(PlayerError::render(format!(
            "svg raster size too large: {v} (max {MAX_DIM})"
        )));
    }
    Ok((v.ceil() as u32).max(1))
}

pub(crate) fn rasterize_svg_to_premul_rgba8(
    tree: &usvg::Tree,
    width: u32,
    height: u32,
) -> PlayerResult<Vec<u8>> {
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| PlayerError::render("failed to allocate svg pixmap"))?;
    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);
    resvg::render(tree, xform, &mut pixmap.as_mut());
    Ok(pixmap.data().to_vec())
}

/// Fill `(0, 0, w, h)` in image space with `paint` under `transform`.
pub(crate) fn draw_image(
    ctx: &mut vello_cpu::RenderContext,
    paint: &vello_cpu::Image,
    transform: Affine,
    w: f64,
    h: f64,
    opacity: f32,
) {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(affine_to_cpu(transform));
    ctx.set_paint(paint.clone());
    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
    if opacity < 1.0 {
        ctx.pop_layer();
    }
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

#[cfg(test)]
#[path = "../../tests/unit/render/layers.rs"]
mod tests;
