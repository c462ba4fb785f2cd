use image::{DynamicImage, GrayImage};
use tracing::debug;

use super::coords::{map_to_raster, RasterPoint, RasterSize, SurfaceRect};
use super::input::PointerEvent;
use super::sampler::{SampledColor, SamplingRaster};
use super::stroke::{effective_width, rasterize_segment, rasterize_stroke, Stroke};
use crate::settings::BrushSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToolMode {
    #[default]
    Paint,
    Sample,
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    Drawing(Stroke),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasOutcome {
    Ignored,
    StrokeStarted,
    StrokeExtended,
    StrokeEnded,
    Sampled(SampledColor),
}

#[derive(Debug, Clone)]
struct MaskTarget {
    layer: GrayImage,
    sampler: SamplingRaster,
}

#[derive(Debug, Clone)]
pub struct MaskCanvasEngine {
    brush: BrushSettings,
    brush_size: f32,
    mode: ToolMode,
    gesture: Gesture,
    target: Option<MaskTarget>,
    strokes: Vec<Stroke>,
    sampled_color: Option<SampledColor>,
}

impl Default for MaskCanvasEngine {
    fn default() -> Self {
        Self::new(BrushSettings::default())
    }
}

impl MaskCanvasEngine {
    pub fn new(brush: BrushSettings) -> Self {
        Self {
            brush_size: brush.clamp_size(brush.default_size),
            brush,
            mode: ToolMode::Paint,
            gesture: Gesture::Idle,
            target: None,
            strokes: Vec::new(),
            sampled_color: None,
        }
    }

    pub fn load_target(&mut self, image: &DynamicImage) {
        let sampler = SamplingRaster::capture(image);
        let size = sampler.size();
        self.target = Some(MaskTarget {
            layer: GrayImage::new(size.width, size.height),
            sampler,
        });
        self.strokes.clear();
        self.gesture = Gesture::Idle;
        debug!(
            width = size.width,
            height = size.height,
            "mask canvas target loaded"
        );
    }

    pub fn unload_target(&mut self) {
        self.target = None;
        self.strokes.clear();
        self.gesture = Gesture::Idle;
    }

    pub fn size(&self) -> Option<RasterSize> {
        self.target.as_ref().map(|t| t.sampler.size())
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        if self.mode == mode {
            return;
        }
        self.end_stroke();
        self.mode = mode;
    }

    pub fn toggle_sample_mode(&mut self) -> ToolMode {
        let next = match self.mode {
            ToolMode::Paint => ToolMode::Sample,
            ToolMode::Sample => ToolMode::Paint,
        };
        self.set_mode(next);
        next
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: f32) -> f32 {
        self.brush_size = self.brush.clamp_size(size);
        self.brush_size
    }

    pub fn stroke_width(&self) -> Option<f32> {
        self.size().map(|size| {
            effective_width(self.brush_size, size.width, self.brush.reference_width)
        })
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.gesture, Gesture::Drawing(_))
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn has_strokes(&self) -> bool {
        !self.strokes.is_empty() || self.is_drawing()
    }

    pub fn sampled_color(&self) -> Option<SampledColor> {
        self.sampled_color
    }

    pub fn set_sampled_color(&mut self, color: SampledColor) {
        self.sampled_color = Some(color);
    }

    pub fn clear_sampled_color(&mut self) {
        self.sampled_color = None;
    }

    pub fn layer(&self) -> Option<&GrayImage> {
        self.target.as_ref().map(|t| &t.layer)
    }

    pub fn begin_stroke(&mut self, point: RasterPoint) -> bool {
        if self.mode != ToolMode::Paint {
            return false;
        }
        let Some(width) = self.stroke_width() else {
            return false;
        };
        let Some(target) = self.target.as_mut() else {
            return false;
        };
        if let Gesture::Drawing(previous) =
            std::mem::replace(&mut self.gesture, Gesture::Idle)
        {
            self.strokes.push(previous);
        }
        rasterize_segment(&mut target.layer, point, point, width);
        self.gesture = Gesture::Drawing(Stroke::new(point, width));
        true
    }

    pub fn extend_stroke(&mut self, point: RasterPoint) -> bool {
        let Gesture::Drawing(stroke) = &mut self.gesture else {
            return false;
        };
        let Some(target) = self.target.as_mut() else {
            return false;
        };
        if let Some(last) = stroke.last_point() {
            rasterize_segment(&mut target.layer, last, point, stroke.width());
        }
        stroke.push(point);
        true
    }

    pub fn end_stroke(&mut self) -> bool {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Drawing(stroke) => {
                debug!(
                    points = stroke.points().len(),
                    width = stroke.width(),
                    "mask stroke finished"
                );
                self.strokes.push(stroke);
                true
            }
            Gesture::Idle => false,
        }
    }

    pub fn paint_path(&mut self, points: &[RasterPoint]) -> bool {
        if self.mode != ToolMode::Paint || points.is_empty() {
            return false;
        }
        let Some(width) = self.stroke_width() else {
            return false;
        };
        self.end_stroke();
        let Some(target) = self.target.as_mut() else {
            return false;
        };
        let mut stroke = Stroke::new(points[0], width);
        for point in &points[1..] {
            stroke.push(*point);
        }
        rasterize_stroke(&mut target.layer, &stroke);
        self.strokes.push(stroke);
        true
    }

    pub fn sample(&mut self, point: RasterPoint) -> Option<SampledColor> {
        if self.mode != ToolMode::Sample {
            return None;
        }
        let color = self.target.as_ref()?.sampler.sample(point)?;
        self.sampled_color = Some(color);
        self.mode = ToolMode::Paint;
        debug!(color = %color, x = point.x, y = point.y, "color sampled");
        Some(color)
    }

    pub fn clear(&mut self) {
        if let Some(target) = self.target.as_mut() {
            let (w, h) = target.layer.dimensions();
            target.layer = GrayImage::new(w, h);
        }
        self.strokes.clear();
        self.gesture = Gesture::Idle;
    }

    pub fn handle(&mut self, event: &PointerEvent, rect: SurfaceRect) -> CanvasOutcome {
        if event.ends_gesture() {
            return if self.end_stroke() {
                CanvasOutcome::StrokeEnded
            } else {
                CanvasOutcome::Ignored
            };
        }
        let Some(point) = self.map_event(event, rect) else {
            return CanvasOutcome::Ignored;
        };
        match (event, self.mode) {
            (PointerEvent::Down(_), ToolMode::Sample) => self
                .sample(point)
                .map(CanvasOutcome::Sampled)
                .unwrap_or(CanvasOutcome::Ignored),
            (PointerEvent::Down(_), ToolMode::Paint) => {
                if self.begin_stroke(point) {
                    CanvasOutcome::StrokeStarted
                } else {
                    CanvasOutcome::Ignored
                }
            }
            (PointerEvent::Move(_), ToolMode::Paint) => {
                if self.extend_stroke(point) {
                    CanvasOutcome::StrokeExtended
                } else {
                    CanvasOutcome::Ignored
                }
            }
            _ => CanvasOutcome::Ignored,
        }
    }

    fn map_event(&self, event: &PointerEvent, rect: SurfaceRect) -> Option<RasterPoint> {
        map_to_raster(event.position()?, rect, self.size()?)
    }
}
