//! Binary per-pixel masks
//!
//! Backed by a `GrayImage` holding 0 or 255 so imageproc morphology and
//! labelling can run on it directly.

use crate::error::{GradingError, Result};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::rect::Rect;

const ON: u8 = 255;

/// Binary membership grid with the dimensions of its source image
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// All-false mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        Self {
            image: GrayImage::from_fn(width, height, |x, y| Luma([if f(x, y) { ON } else { 0 }])),
        }
    }

    /// Any non-zero pixel is a member
    pub fn from_gray(gray: GrayImage) -> Self {
        let mut image = gray;
        for p in image.pixels_mut() {
            p.0[0] = if p.0[0] > 0 { ON } else { 0 };
        }
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] > 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.image.put_pixel(x, y, Luma([if value { ON } else { 0 }]));
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    /// Number of member pixels
    pub fn count(&self) -> usize {
        self.image.as_raw().iter().filter(|&&v| v > 0).count()
    }

    /// Member fraction of the whole grid
    pub fn fraction(&self) -> f32 {
        let total = self.image.width() as usize * self.image.height() as usize;
        if total == 0 {
            return 0.0;
        }
        self.count() as f32 / total as f32
    }

    /// Member count inside `rect`, clipped to the grid
    pub fn count_in(&self, rect: Rect) -> usize {
        let (x0, y0, x1, y1) = clip(rect, self.width(), self.height());
        let mut n = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                if self.get(x, y) {
                    n += 1;
                }
            }
        }
        n
    }

    pub fn union(&self, other: &Mask) -> Result<Mask> {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn intersect(&self, other: &Mask) -> Result<Mask> {
        self.zip_with(other, |a, b| a && b)
    }

    /// Members of `self` that are not in `other`
    pub fn subtract(&self, other: &Mask) -> Result<Mask> {
        self.zip_with(other, |a, b| a && !b)
    }

    pub fn invert(&self) -> Mask {
        let mut image = self.image.clone();
        for p in image.pixels_mut() {
            p.0[0] = if p.0[0] > 0 { 0 } else { ON };
        }
        Mask { image }
    }

    fn zip_with(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> Result<Mask> {
        if self.dimensions() != other.dimensions() {
            return Err(GradingError::invariant(format!(
                "mask dimensions differ: {:?} vs {:?}",
                self.dimensions(),
                other.dimensions()
            )));
        }
        let mut image = self.image.clone();
        for (p, q) in image.pixels_mut().zip(other.image.pixels()) {
            p.0[0] = if op(p.0[0] > 0, q.0[0] > 0) { ON } else { 0 };
        }
        Ok(Mask { image })
    }

    /// Square (L-infinity) dilation, repeated `iterations` times
    pub fn dilate(&self, radius: u8, iterations: u32) -> Mask {
        let mut image = self.image.clone();
        for _ in 0..iterations {
            image = morphology::dilate(&image, Norm::LInf, radius);
        }
        Mask { image }
    }

    pub fn erode(&self, radius: u8, iterations: u32) -> Mask {
        let mut image = self.image.clone();
        for _ in 0..iterations {
            image = morphology::erode(&image, Norm::LInf, radius);
        }
        Mask { image }
    }

    pub fn close(&self, radius: u8) -> Mask {
        Mask {
            image: morphology::close(&self.image, Norm::LInf, radius),
        }
    }

    pub fn open(&self, radius: u8) -> Mask {
        Mask {
            image: morphology::open(&self.image, Norm::LInf, radius),
        }
    }
}

/// Clip a rectangle to `[0, width) × [0, height)` as half-open bounds
pub fn clip(rect: Rect, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x0 = rect.left().clamp(0, width as i32) as u32;
    let y0 = rect.top().clamp(0, height as i32) as u32;
    let x1 = (rect.left() + rect.width() as i32).clamp(0, width as i32) as u32;
    let y1 = (rect.top() + rect.height() as i32).clamp(0, height as i32) as u32;
    (x0, y0, x1.max(x0), y1.max(y0))
}
