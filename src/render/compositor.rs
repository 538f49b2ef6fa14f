use tracing::{debug, trace, warn};

use crate::decode::frame::DecodedFrame;
use crate::foundation::core::{Affine, Rect, Rgba8, Size};
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::render::convert::{FrameConverter, pixmap_to_image};
use crate::render::export::{ExportFormat, encode_data_uri};
use crate::render::fit::{FitMode, fit_rect};
use crate::render::layers::{Layer, LayerContext, affine_to_cpu, draw_image};
use crate::render::surface::Surface;

#[derive(Clone, Debug, PartialEq)]
pub struct CompositorOptions {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
    pub background: Rgba8,
    pub fit_mode: FitMode,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 360.0,
            device_pixel_ratio: 1.0,
            background: Rgba8::BLACK,
            fit_mode: FitMode::Contain,
        }
    }
}

struct Bitmap {
    paint: vello_cpu::Image,
    width: u32,
    height: u32,
}

/// Paints the current video frame and the overlay layers onto a [`Surface`].
pub struct CanvasCompositor {
    surface: Surface,
    ctx: Option<vello_cpu::RenderContext>,
    background: Rgba8,
    fit_mode: FitMode,
    video_size: Option<Size>,
    frame: Option<DecodedFrame>,
    bitmap: Option<Bitmap>,
    token: u64,
    converter: FrameConverter,
    layers: Vec<Layer>,
    disposed: bool,
}

impl CanvasCompositor {
    pub fn new(opts: CompositorOptions) -> PlayerResult<Self> {
        let surface = Surface::new(opts.width, opts.height, opts.device_pixel_ratio)?;
        let mut out = Self {
            surface,
            ctx: None,
            background: opts.background,
            fit_mode: opts.fit_mode,
            video_size: None,
            frame: None,
            bitmap: None,
            token: 0,
            converter: FrameConverter::new(),
            layers: Vec::new(),
            disposed: false,
        };
        out.render()?;
        Ok(out)
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Premultiplied RGBA8 backing store.
    pub fn pixels(&self) -> &[u8] {
        self.surface.pixels()
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn set_fit_mode(&mut self, mode: FitMode) -> PlayerResult<()> {
        self.fit_mode = mode;
        self.render()
    }

    pub fn set_background(&mut self, color: Rgba8) -> PlayerResult<()> {
        self.background = color;
        self.render()
    }

    /// Authoritative source size used for aspect-ratio fitting.
    pub fn set_video_dimensions(&mut self, width: u32, height: u32) {
        self.video_size = (width > 0 && height > 0)
            .then(|| Size::new(f64::from(width), f64::from(height)));
    }

    pub fn video_dimensions(&self) -> Option<Size> {
        self.video_size
    }

    /// Timestamp of the frame most recently handed to `draw_frame`.
    pub fn current_frame_timestamp(&self) -> Option<i64> {
        self.frame.as_ref().map(|f| f.timestamp_us)
    }

    /// Conversions submitted and not yet admitted or discarded.
    pub fn pending_conversions(&self) -> usize {
        self.converter.in_flight()
    }

    pub fn resize(&mut self, width: f64, height: f64) -> PlayerResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.surface.resize(width, height)?;
        debug!(
            width,
            height,
            pixel_width = self.surface.pixel_width(),
            pixel_height = self.surface.pixel_height(),
            "surface resized"
        );
        self.render()
    }

    /// Take a copy of `frame` and start converting it; the previous copy is released.
    pub fn draw_frame(&mut self, frame: &DecodedFrame) -> PlayerResult<()> {
        if self.disposed {
            return Ok(());
        }
        if let Some(old) = self.frame.replace(frame.clone()) {
            old.close();
        }
        self.token += 1;
        self.converter.submit(self.token, frame.image.clone());
        self.render()
    }

    /// Admit finished conversions without blocking. Returns `true` when the surface was repainted.
    pub fn poll(&mut self) -> PlayerResult<bool> {
        let mut admitted = false;
        while let Some((token, result)) = self.converter.try_next() {
            admitted |= self.admit(token, result);
        }
        if admitted {
            self.render()?;
        }
        Ok(admitted)
    }

    /// Block until every in-flight conversion is in, then repaint if the current one arrived.
    pub fn flush_pending(&mut self) -> PlayerResult<bool> {
        let mut admitted = false;
        while let Some((token, result)) = self.converter.next_blocking() {
            admitted |= self.admit(token, result);
        }
        if admitted {
            self.render()?;
        }
        Ok(admitted)
    }

    fn admit(&mut self, token: u64, result: PlayerResult<vello_cpu::Pixmap>) -> bool {
        if token != self.token || self.disposed {
            trace!(token, current = self.token, "discarding stale bitmap");
            return false;
        }
        match result {
            Ok(pixmap) => {
                let (width, height) = (u32::from(pixmap.width()), u32::from(pixmap.height()));
                self.bitmap = Some(Bitmap {
                    paint: pixmap_to_image(pixmap),
                    width,
                    height,
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "frame conversion failed");
                false
            }
        }
    }

    /// Repaint: background, current frame, then visible layers by ascending z-index.
    pub fn render(&mut self) -> PlayerResult<()> {
        if self.disposed {
            return Ok(());
        }
        let (pw, ph) = (self.surface.pixel_width(), self.surface.pixel_height());
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == pw && ctx.height() == ph => ctx,
            _ => vello_cpu::RenderContext::new(pw, ph),
        };
        ctx.reset();

        let (w, h) = (self.surface.width(), self.surface.height());
        let base = self.surface.base_transform();
        let bg = self.background;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(pw),
            f64::from(ph),
        ));

        if let Some(bitmap) = &self.bitmap {
            let (bw, bh) = (f64::from(bitmap.width), f64::from(bitmap.height));
            let src = self.video_size.unwrap_or(Size::new(bw, bh));
            let dst = fit_rect(src, Rect::new(0.0, 0.0, w, h), self.fit_mode);
            let tr = base
                * Affine::translate((dst.x0, dst.y0))
                * Affine::scale_non_uniform(dst.width() / bw, dst.height() / bh);
            draw_image(&mut ctx, &bitmap.paint, tr, bw, bh, 1.0);
        }

        // Stable sort: equal z-index keeps insertion order.
        let mut order: Vec<usize> = (0..self.layers.len()).collect();
        order.sort_by_key(|&i| self.layers[i].z_index);
        let dpr = self.surface.device_pixel_ratio();
        for i in order {
            let layer = &mut self.layers[i];
            if !layer.visible {
                continue;
            }
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_transform(affine_to_cpu(base));
            let mut target = LayerContext {
                ctx: &mut ctx,
                width: w,
                height: h,
                device_pixel_ratio: dpr,
            };
            if let Err(e) = layer.render(&mut target) {
                warn!(layer = %layer.id, error = %e, "layer render failed");
            }
        }

        ctx.flush();
        let pixmap = self.surface.pixmap_mut();
        pixmap.data_as_u8_slice_mut().fill(0);
        ctx.render_to_pixmap(pixmap);
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Insert `layer`, replacing any layer with the same id.
    pub fn add_layer(&mut self, layer: Layer) -> PlayerResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.layers.retain(|l| l.id != layer.id);
        self.layers.push(layer);
        self.render()
    }

    pub fn remove_layer(&mut self, id: &str) -> PlayerResult<bool> {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        let removed = self.layers.len() != before;
        if removed {
            self.render()?;
        }
        Ok(removed)
    }

    pub fn set_layer_visibility(&mut self, id: &str, visible: bool) -> PlayerResult<bool> {
        let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) else {
            return Ok(false);
        };
        if layer.visible != visible {
            layer.visible = visible;
            self.render()?;
        }
        Ok(true)
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.id.as_str())
    }

    /// Snapshot of the surface as a `data:` URI.
    pub fn export_frame(&self, format: ExportFormat, quality: f32) -> PlayerResult<String> {
        if self.disposed {
            return Err(PlayerError::state("compositor is disposed"));
        }
        encode_data_uri(
            self.surface.pixels(),
            u32::from(self.surface.pixel_width()),
            u32::from(self.surface.pixel_height()),
            format,
            quality,
            self.background,
        )
    }

    /// Release the held frame and drop every layer.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(frame) = self.frame.take() {
            frame.close();
        }
        self.bitmap = None;
        self.layers.clear();
        self.ctx = None;
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl std::fmt::Debug for CanvasCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasCompositor")
            .field("surface", &self.surface)
            .field("fit_mode", &self.fit_mode)
            .field("video_size", &self.video_size)
            .field("token", &self.token)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
