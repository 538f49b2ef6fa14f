pub mod compositor;
pub mod convert;
pub mod export;
pub mod fit;
pub mod layers;
pub mod surface;

pub use compositor::{CanvasCompositor, CompositorOptions};
pub use convert::{FrameConverter, frame_to_pixmap};
pub use export::ExportFormat;
pub use fit::{FitMode, fit_rect};
pub use layers::{ImageLayer, Layer, LayerContext, LayerRenderer, SvgLayer};
pub use surface::Surface;
