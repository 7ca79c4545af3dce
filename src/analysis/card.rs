//! Rectified card shared by the analyzers
//!
//! Bundles the canonical-frame image with its derived planes and the
//! card-interior mask. Built once per side; analyzers only read it.

use crate::color::conversion::{delta_e, to_gray};
use crate::color::ColorPlanes;
use crate::config::RectificationConfig;
use crate::error::{GradingError, Result};
use crate::imaging::Mask;
use image::{GrayImage, RgbImage};
use palette::Lab;
use tracing::debug;

/// Smallest side accepted for analysis
const MIN_SIDE: u32 = 32;

/// Upright card in the canonical frame
#[derive(Debug, Clone)]
pub struct RectifiedCard {
    image: RgbImage,
    gray: GrayImage,
    planes: ColorPlanes,
    interior: Mask,
    guard: u32,
}

impl RectifiedCard {
    /// Card whose full frame is known to be card
    ///
    /// Used for pre-cropped scans and synthetic images.
    pub fn new(image: RgbImage, config: &RectificationConfig) -> Result<Self> {
        Self::with_context(image, None, None, config)
    }

    /// Card with knowledge of the original photo
    ///
    /// `coverage` marks pixels that came from inside the photo; `background`
    /// is the colour sampled just outside the detected boundary. Pixels in
    /// the outer strip that match the background leave the interior mask.
    pub fn with_context(
        image: RgbImage,
        coverage: Option<Mask>,
        background: Option<Lab>,
        config: &RectificationConfig,
    ) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(GradingError::invariant(format!(
                "rectified card too small: {}x{}",
                width, height
            )));
        }

        let planes = ColorPlanes::from_rgb(&image);
        let gray = to_gray(&image);
        let short = width.min(height) as f32;
        let guard = ((config.guard_fraction * short).round() as u32).max(1);

        let mut interior = Mask::from_fn(width, height, |x, y| {
            x >= guard && y >= guard && x + guard < width && y + guard < height
        });
        if let Some(coverage) = coverage {
            interior = interior.intersect(&coverage)?;
        }
        if let Some(background) = background {
            let strip = ((config.background_strip_fraction * short).round() as u32).max(guard);
            let threshold = config.background_delta_e;
            let mut dropped = 0usize;
            for y in 0..height {
                for x in 0..width {
                    let in_strip =
                        x < strip || y < strip || x + strip >= width || y + strip >= height;
                    if in_strip
                        && interior.get(x, y)
                        && delta_e(planes.lab(x, y), background) < threshold
                    {
                        interior.set(x, y, false);
                        dropped += 1;
                    }
                }
            }
            debug!(dropped, "background pixels removed from card mask");
        }

        Ok(Self {
            image,
            gray,
            planes,
            interior,
            guard,
        })
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn planes(&self) -> &ColorPlanes {
        &self.planes
    }

    /// Pixels confidently inside the card
    pub fn interior(&self) -> &Mask {
        &self.interior
    }

    /// Inset in pixels kept out of the interior mask
    pub fn guard(&self) -> u32 {
        self.guard
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn short_side(&self) -> u32 {
        self.width().min(self.height())
    }

    pub fn area(&self) -> u32 {
        self.width() * self.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::conversion::rgb_to_lab;
    use image::Rgb;

    #[test]
    fn test_guard_inset() {
        let image = RgbImage::from_pixel(500, 700, Rgb([30, 60, 200]));
        let card = RectifiedCard::new(image, &RectificationConfig::default()).unwrap();
        assert_eq!(card.guard(), 3);
        assert!(!card.interior().get(2, 100));
        assert!(card.interior().get(3, 100));
        assert!(!card.interior().get(497, 100));
        assert_eq!(card.interior().count(), 494 * 694);
    }

    #[test]
    fn test_background_pixels_leave_mask() {
        let mut image = RgbImage::from_pixel(500, 700, Rgb([30, 60, 200]));
        // Background wedge bleeding into the top-left corner
        for y in 0..12 {
            for x in 0..12 {
                image.put_pixel(x, y, Rgb([40, 140, 40]));
            }
        }
        let background = rgb_to_lab(40, 140, 40);
        let card = RectifiedCard::with_context(
            image,
            None,
            Some(background),
            &RectificationConfig::default(),
        )
        .unwrap();
        assert!(!card.interior().get(8, 8));
        assert!(card.interior().get(14, 8));
    }

    #[test]
    fn test_coverage_limits_mask() {
        let image = RgbImage::from_pixel(100, 140, Rgb([200, 10, 10]));
        let coverage = Mask::from_fn(100, 140, |x, _| x >= 50);
        let card =
            RectifiedCard::with_context(image, Some(coverage), None, &RectificationConfig::default())
                .unwrap();
        assert!(!card.interior().get(20, 70));
        assert!(card.interior().get(60, 70));
    }

    #[test]
    fn test_rejects_tiny_image() {
        let image = RgbImage::new(10, 10);
        assert!(matches!(
            RectifiedCard::new(image, &RectificationConfig::default()),
            Err(GradingError::InvariantViolation { .. })
        ));
    }
}
