use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use thiserror::Error;

use super::coords::RasterSize;
use super::engine::MaskCanvasEngine;

pub const MASK_FILE_NAME: &str = "mask.png";
pub const MASK_MEDIA_TYPE: &str = "image/png";

const MASK_ON: Luma<u8> = Luma([255]);
const MASK_OFF: Luma<u8> = Luma([0]);

#[derive(Debug, Error)]
pub enum MaskExportError {
    #[error("no target image is loaded on the mask canvas")]
    NoTarget,
    #[error("mask PNG encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskPng {
    pub size: RasterSize,
    pub painted_pixels: u64,
    pub bytes: Vec<u8>,
}

impl MaskPng {
    pub fn is_blank(&self) -> bool {
        self.painted_pixels == 0
    }
}

pub fn binarize(layer: &GrayImage) -> GrayImage {
    let (width, height) = layer.dimensions();
    let mut mask = GrayImage::from_pixel(width, height, MASK_OFF);
    for (x, y, pixel) in layer.enumerate_pixels() {
        // Anti-aliased edge pixels count as painted.
        if pixel[0] > 0 {
            mask.put_pixel(x, y, MASK_ON);
        }
    }
    mask
}

pub fn export_mask(engine: &MaskCanvasEngine) -> Result<MaskPng, MaskExportError> {
    let layer = engine.layer().ok_or(MaskExportError::NoTarget)?;
    encode_mask(&binarize(layer))
}

pub fn encode_mask(mask: &GrayImage) -> Result<MaskPng, MaskExportError> {
    let (width, height) = mask.dimensions();
    let painted_pixels = mask.pixels().filter(|p| p[0] == MASK_ON[0]).count() as u64;
    let mut bytes = Vec::new();
    mask.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(MaskExportError::Encode)?;
    Ok(MaskPng {
        size: RasterSize::new(width, height),
        painted_pixels,
        bytes,
    })
}
