use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::coords::{RasterPoint, RasterSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SampledColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SampledColor {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for SampledColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_hex().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hex color '{0}'. Expected #rrggbb")]
pub struct InvalidHexColor(pub String);

impl FromStr for SampledColor {
    type Err = InvalidHexColor;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(InvalidHexColor(raw.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| InvalidHexColor(raw.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for SampledColor {
    type Error = InvalidHexColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SampledColor> for String {
    fn from(value: SampledColor) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone)]
pub struct SamplingRaster {
    pixels: RgbaImage,
}

impl SamplingRaster {
    pub fn capture(image: &DynamicImage) -> Self {
        Self {
            pixels: image.to_rgba8(),
        }
    }

    pub fn size(&self) -> RasterSize {
        let (width, height) = self.pixels.dimensions();
        RasterSize::new(width, height)
    }

    pub fn sample(&self, point: RasterPoint) -> Option<SampledColor> {
        let (x, y) = point.pixel_in(self.size())?;
        let [r, g, b, _] = self.pixels.get_pixel(x, y).0;
        Some(SampledColor { r, g, b })
    }
}
