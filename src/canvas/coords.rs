use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientPoint {
    pub x: f32,
    pub y: f32,
}

impl ClientPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterPoint {
    pub x: f32,
    pub y: f32,
}

impl RasterPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn pixel_in(self, size: RasterSize) -> Option<(u32, u32)> {
        if !self.x.is_finite() || !self.y.is_finite() || self.x < 0.0 || self.y < 0.0 {
            return None;
        }
        let px = self.x.floor() as u64;
        let py = self.y.floor() as u64;
        if px >= u64::from(size.width) || py >= u64::from(size.height) {
            return None;
        }
        Some((px as u32, py as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterSize {
    pub width: u32,
    pub height: u32,
}

impl RasterSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_laid_out(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

pub fn map_to_raster(
    point: ClientPoint,
    rect: SurfaceRect,
    raster: RasterSize,
) -> Option<RasterPoint> {
    if !rect.is_laid_out() || raster.is_empty() {
        return None;
    }
    if !point.x.is_finite() || !point.y.is_finite() {
        return None;
    }
    let scale_x = raster.width as f32 / rect.width;
    let scale_y = raster.height as f32 / rect.height;
    Some(RasterPoint {
        x: (point.x - rect.left) * scale_x,
        y: (point.y - rect.top) * scale_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_resolution_surface_scales_by_two() {
        let rect = SurfaceRect::new(0.0, 0.0, 400.0, 300.0);
        let mapped = map_to_raster(
            ClientPoint::new(50.0, 50.0),
            rect,
            RasterSize::new(800, 600),
        )
        .expect("laid out surface should map");
        assert_eq!(mapped, RasterPoint::new(100.0, 100.0));
    }

    #[test]
    fn subtracts_surface_origin_before_scaling() {
        let rect = SurfaceRect::new(20.0, 10.0, 100.0, 50.0);
        let mapped = map_to_raster(
            ClientPoint::new(70.0, 35.0),
            rect,
            RasterSize::new(1000, 500),
        )
        .expect("laid out surface should map");
        assert_eq!(mapped, RasterPoint::new(500.0, 250.0));
    }

    #[test]
    fn non_uniform_scale_is_applied_per_axis() {
        let rect = SurfaceRect::new(0.0, 0.0, 200.0, 200.0);
        let mapped = map_to_raster(
            ClientPoint::new(100.0, 100.0),
            rect,
            RasterSize::new(400, 100),
        )
        .expect("laid out surface should map");
        assert_eq!(mapped, RasterPoint::new(200.0, 50.0));
    }

    #[test]
    fn declines_zero_sized_surface() {
        let raster = RasterSize::new(800, 600);
        assert_eq!(
            map_to_raster(
                ClientPoint::new(1.0, 1.0),
                SurfaceRect::new(0.0, 0.0, 0.0, 300.0),
                raster
            ),
            None
        );
        assert_eq!(
            map_to_raster(
                ClientPoint::new(1.0, 1.0),
                SurfaceRect::new(0.0, 0.0, 300.0, 0.0),
                raster
            ),
            None
        );
    }

    #[test]
    fn declines_empty_raster() {
        assert_eq!(
            map_to_raster(
                ClientPoint::new(1.0, 1.0),
                SurfaceRect::new(0.0, 0.0, 100.0, 100.0),
                RasterSize::new(0, 0)
            ),
            None
        );
    }

    #[test]
    fn pixel_lookup_rejects_points_outside_raster() {
        let size = RasterSize::new(10, 10);
        assert_eq!(RasterPoint::new(9.99, 0.0).pixel_in(size), Some((9, 0)));
        assert_eq!(RasterPoint::new(10.0, 0.0).pixel_in(size), None);
        assert_eq!(RasterPoint::new(-0.5, 3.0).pixel_in(size), None);
    }
}
