pub mod coords;
pub mod engine;
pub mod export;
pub mod input;
pub mod sampler;
pub mod stroke;

pub use coords::{map_to_raster, ClientPoint, RasterPoint, RasterSize, SurfaceRect};
pub use engine::{CanvasOutcome, MaskCanvasEngine, ToolMode};
pub use export::{export_mask, MaskExportError, MaskPng};
pub use input::{PointerEvent, PointerSource};
pub use sampler::{InvalidHexColor, SampledColor};
pub use stroke::Stroke;
