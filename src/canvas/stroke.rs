use image::{GrayImage, Luma};

use super::coords::RasterPoint;

pub fn effective_width(requested_size: f32, raster_width: u32, reference_width: f32) -> f32 {
    if reference_width <= 0.0 || !reference_width.is_finite() {
        return requested_size.max(0.0);
    }
    (requested_size * (raster_width as f32 / reference_width)).max(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    points: Vec<RasterPoint>,
    width: f32,
}

impl Stroke {
    pub fn new(seed: RasterPoint, width: f32) -> Self {
        Self {
            points: vec![seed],
            width,
        }
    }

    pub fn push(&mut self, point: RasterPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[RasterPoint] {
        &self.points
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn last_point(&self) -> Option<RasterPoint> {
        self.points.last().copied()
    }
}

pub(crate) fn rasterize_stroke(layer: &mut GrayImage, stroke: &Stroke) {
    let points = stroke.points();
    match points {
        [] => {}
        [only] => rasterize_segment(layer, *only, *only, stroke.width()),
        _ => {
            for pair in points.windows(2) {
                rasterize_segment(layer, pair[0], pair[1], stroke.width());
            }
        }
    }
}

pub(crate) fn rasterize_segment(layer: &mut GrayImage, a: RasterPoint, b: RasterPoint, width: f32) {
    let (w, h) = layer.dimensions();
    if w == 0 || h == 0 || !width.is_finite() || width <= 0.0 {
        return;
    }
    let radius = width / 2.0;
    let pad = radius + 1.0;

    let min_x = (a.x.min(b.x) - pad).floor();
    let max_x = (a.x.max(b.x) + pad).ceil();
    let min_y = (a.y.min(b.y) - pad).floor();
    let max_y = (a.y.max(b.y) + pad).ceil();
    if max_x < 0.0 || max_y < 0.0 || min_x >= w as f32 || min_y >= h as f32 {
        return;
    }
    let x0 = min_x.max(0.0) as u32;
    let y0 = min_y.max(0.0) as u32;
    let x1 = max_x.min((w - 1) as f32) as u32;
    let y1 = max_y.min((h - 1) as f32) as u32;

    for py in y0..=y1 {
        for px in x0..=x1 {
            let d = distance_to_segment(px as f32 + 0.5, py as f32 + 0.5, a, b);
            let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let value = (coverage * 255.0).round() as u8;
            let pixel = layer.get_pixel_mut(px, py);
            // Max blend: overlapping stamps never lower coverage.
            if value > pixel[0] {
                *pixel = Luma([value]);
            }
        }
    }
}

fn distance_to_segment(px: f32, py: f32, a: RasterPoint, b: RasterPoint) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - a.x) * dx + (py - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
