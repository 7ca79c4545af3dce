//! Color space conversion utilities
//!
//! Provides per-pixel conversions used throughout grading:
//! - sRGB (0-255) to CIE Lab (D65)
//! - sRGB to HSV with hue in degrees
//! - Rec. 601 luma
//! - ΔE76 color difference

use image::{GrayImage, Luma, RgbImage};
use palette::{FromColor, Hsv, Lab, Srgb};

/// HSV sample with hue in degrees [0, 360) and saturation/value in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvSample {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

fn to_srgb(r: u8, g: u8, b: u8) -> Srgb {
    Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}

/// Convert RGB (0-255) to Lab color space (D65)
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> Lab {
    Lab::from_color(to_srgb(r, g, b))
}

/// Convert RGB (0-255) to HSV
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> HsvSample {
    let hsv: Hsv = Hsv::from_color(to_srgb(r, g, b));
    HsvSample {
        hue: hsv.hue.into_positive_degrees(),
        saturation: hsv.saturation,
        value: hsv.value,
    }
}

/// Rec. 601 luma in [0, 255]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Grayscale copy of an RGB image using [`luma`]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let p = image.get_pixel(x, y).0;
        Luma([luma(p[0], p[1], p[2]).round().clamp(0.0, 255.0) as u8])
    })
}

/// Compute Delta E (color difference) between two Lab colors
///
/// Uses simple Euclidean distance (ΔE76), adequate for background matching.
pub fn delta_e(lab1: Lab, lab2: Lab) -> f32 {
    let dl = lab1.l - lab2.l;
    let da = lab1.a - lab2.a;
    let db = lab1.b - lab2.b;
    (dl * dl + da * da + db * db).sqrt()
}
