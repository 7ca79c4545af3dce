//! Per-pixel Lab and HSV planes
//!
//! Converting a rectified card once and sharing the planes lets the four
//! analyzers read lightness, saturation and hue without repeating the
//! conversion. Planes are immutable once built.

use super::conversion::{rgb_to_hsv, rgb_to_lab};
use image::RgbImage;
use palette::Lab;
use rayon::prelude::*;

/// Planar Lab + HSV representation of an RGB image
#[derive(Debug, Clone)]
pub struct ColorPlanes {
    width: u32,
    height: u32,
    /// L* in [0, 100]
    pub lightness: Vec<f32>,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    /// Hue in degrees
    pub hue: Vec<f32>,
    pub saturation: Vec<f32>,
    pub value: Vec<f32>,
}

#[derive(Clone, Copy)]
struct PixelColor {
    l: f32,
    a: f32,
    b: f32,
    h: f32,
    s: f32,
    v: f32,
}

impl ColorPlanes {
    /// Convert every pixel of `image`
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels: Vec<PixelColor> = image
            .as_raw()
            .par_chunks_exact(3)
            .map(|p| {
                let lab = rgb_to_lab(p[0], p[1], p[2]);
                let hsv = rgb_to_hsv(p[0], p[1], p[2]);
                PixelColor {
                    l: lab.l,
                    a: lab.a,
                    b: lab.b,
                    h: hsv.hue,
                    s: hsv.saturation,
                    v: hsv.value,
                }
            })
            .collect();

        let n = pixels.len();
        let mut planes = Self {
            width,
            height,
            lightness: Vec::with_capacity(n),
            a: Vec::with_capacity(n),
            b: Vec::with_capacity(n),
            hue: Vec::with_capacity(n),
            saturation: Vec::with_capacity(n),
            value: Vec::with_capacity(n),
        };
        for p in pixels {
            planes.lightness.push(p.l);
            planes.a.push(p.a);
            planes.b.push(p.b);
            planes.hue.push(p.h);
            planes.saturation.push(p.s);
            planes.value.push(p.v);
        }
        planes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn lab(&self, x: u32, y: u32) -> Lab {
        let i = self.index(x, y);
        Lab::new(self.lightness[i], self.a[i], self.b[i])
    }
}
