//! Centering analysis
//!
//! Measures the four border widths around the inner artwork frame and
//! scores their symmetry. Three measurement methods are tried in order:
//! artwork-box contours, gradient scan lines, saturation scan lines. A
//! measurement with a side ratio below `min_valid_ratio` is treated as a
//! misdetection and the next method runs.

use crate::analysis::card::RectifiedCard;
use crate::analysis::SubScore;
use crate::config::CenteringConfig;
use crate::error::Result;
use crate::imaging::Mask;
use image::{ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

/// Closing radius joining the artwork frame's edge fragments
const ARTWORK_CLOSE_RADIUS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CenteringMethod {
    ArtworkBox,
    Gradient,
    Saturation,
    /// Every method failed; moderate default score
    Fallback,
}

impl fmt::Display for CenteringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CenteringMethod::ArtworkBox => "artwork_box",
            CenteringMethod::Gradient => "gradient",
            CenteringMethod::Saturation => "saturation",
            CenteringMethod::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Border widths in rectified pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderWidths {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl BorderWidths {
    /// Smaller over larger width per axis; `None` when an axis has no border
    pub fn ratios(&self) -> Option<(f32, f32)> {
        Some((ratio(self.left, self.right)?, ratio(self.top, self.bottom)?))
    }
}

fn ratio(a: u32, b: u32) -> Option<f32> {
    let larger = a.max(b);
    if larger == 0 {
        return None;
    }
    Some(a.min(b) as f32 / larger as f32)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenteringReport {
    pub sub_score: SubScore,
    pub method: CenteringMethod,
    pub borders: Option<BorderWidths>,
    pub left_right_ratio: Option<f32>,
    pub top_bottom_ratio: Option<f32>,
    pub average_ratio: Option<f32>,
}

impl CenteringReport {
    /// Report used when the card could not be measured at all
    pub fn conservative(score: f32, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            sub_score: SubScore::new(score, confidence).with_note(reason),
            method: CenteringMethod::Fallback,
            borders: None,
            left_right_ratio: None,
            top_bottom_ratio: None,
            average_ratio: None,
        }
    }
}

pub struct CenteringAnalyzer {
    config: CenteringConfig,
}

impl Default for CenteringAnalyzer {
    fn default() -> Self {
        Self::new(CenteringConfig::default())
    }
}

impl CenteringAnalyzer {
    pub fn new(config: CenteringConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(width = card.width(), height = card.height()))]
    pub fn analyze(&self, card: &RectifiedCard) -> Result<CenteringReport> {
        let cfg = &self.config;
        for method in [
            CenteringMethod::ArtworkBox,
            CenteringMethod::Gradient,
            CenteringMethod::Saturation,
        ] {
            let measured = match method {
                CenteringMethod::ArtworkBox => self.artwork_box(card),
                CenteringMethod::Gradient => self.gradient_borders(card),
                _ => self.saturation_borders(card),
            };
            let Some(borders) = measured else {
                debug!(%method, "no border measurement");
                continue;
            };
            let Some((lr, tb)) = borders.ratios() else {
                debug!(%method, ?borders, "border missing on one axis");
                continue;
            };
            if lr < cfg.min_valid_ratio || tb < cfg.min_valid_ratio {
                debug!(%method, lr, tb, "implausible asymmetry, trying next method");
                continue;
            }

            let average = (lr + tb) / 2.0;
            let confidence = match method {
                CenteringMethod::ArtworkBox => cfg.confidence_artwork,
                CenteringMethod::Gradient => cfg.confidence_gradient,
                _ => cfg.confidence_saturation,
            };
            let sub_score = SubScore::new(self.score_ratio(average), confidence)
                .with_note(format!("{} method, left/right {:.3}, top/bottom {:.3}", method, lr, tb));
            debug!(%method, ?borders, average, score = sub_score.score, "centering measured");
            return Ok(CenteringReport {
                sub_score,
                method,
                borders: Some(borders),
                left_right_ratio: Some(lr),
                top_bottom_ratio: Some(tb),
                average_ratio: Some(average),
            });
        }

        warn!("no plausible centering measurement, using default score");
        Ok(CenteringReport::conservative(
            cfg.fallback_score,
            cfg.confidence_fallback,
            "borders could not be measured reliably",
        ))
    }

    /// Average side ratio → score
    pub fn score_ratio(&self, average: f32) -> f32 {
        let cfg = &self.config;
        match cfg.curve.points.first() {
            Some(first) if average < first.x => (average * cfg.below_curve_slope).max(1.0),
            _ => cfg.curve.evaluate(average),
        }
    }

    /// Largest plausible inner frame found among edge contours
    fn artwork_box(&self, card: &RectifiedCard) -> Option<BorderWidths> {
        let cfg = &self.config;
        let (width, height) = (card.width(), card.height());
        let blurred = gaussian_blur_f32(card.gray(), cfg.artwork_blur_sigma);
        let edges = Mask::from_gray(canny(&blurred, cfg.artwork_canny_low, cfg.artwork_canny_high))
            .close(ARTWORK_CLOSE_RADIUS);

        let card_area = width as f64 * height as f64;
        let min_x = cfg.artwork_min_margin * width as f64;
        let min_y = cfg.artwork_min_margin * height as f64;
        let mut best: Option<(u64, BorderWidths)> = None;

        for contour in find_contours::<i32>(edges.as_gray()) {
            if contour.border_type != BorderType::Outer || contour.points.is_empty() {
                continue;
            }
            let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
            for p in &contour.points {
                x0 = x0.min(p.x);
                y0 = y0.min(p.y);
                x1 = x1.max(p.x);
                y1 = y1.max(p.y);
            }
            let box_w = (x1 - x0 + 1) as f64;
            let box_h = (y1 - y0 + 1) as f64;
            let area = box_w * box_h;
            let fraction = area / card_area;
            if fraction < cfg.artwork_min_area || fraction > cfg.artwork_max_area {
                continue;
            }
            if (x0 as f64) < min_x || (y0 as f64) < min_y {
                continue;
            }
            let aspect = box_w / box_h;
            if aspect < cfg.artwork_min_aspect || aspect > cfg.artwork_max_aspect {
                continue;
            }
            let borders = BorderWidths {
                left: x0 as u32,
                right: (width as i32 - 1 - x1).max(0) as u32,
                top: y0 as u32,
                bottom: (height as i32 - 1 - y1).max(0) as u32,
            };
            if best.map_or(true, |(a, _)| area as u64 > a) {
                best = Some((area as u64, borders));
            }
        }
        best.map(|(_, borders)| borders)
    }

    /// First scan line from each edge whose gradient density reaches the threshold
    fn gradient_borders(&self, card: &RectifiedCard) -> Option<BorderWidths> {
        let cfg = &self.config;
        let gx = horizontal_sobel(card.gray());
        let gy = vertical_sobel(card.gray());
        let (width, height) = (card.width(), card.height());
        let strong = |g: &ImageBuffer<Luma<i16>, Vec<i16>>, x: u32, y: u32| {
            (g.get_pixel(x, y).0[0] as f32).abs() > cfg.gradient_threshold
        };

        let column_density = |x: u32| {
            (0..height).filter(|&y| strong(&gx, x, y)).count() as f32 / height as f32
        };
        let row_density = |y: u32| {
            (0..width).filter(|&x| strong(&gy, x, y)).count() as f32 / width as f32
        };

        let depth_x = ((width as f32 * cfg.max_scan_fraction) as u32).max(1);
        let depth_y = ((height as f32 * cfg.max_scan_fraction) as u32).max(1);
        let hit = |density: f32| density >= cfg.gradient_density;

        let left = (0..depth_x).find(|&x| hit(column_density(x)))?;
        let right = (0..depth_x).find(|&d| hit(column_density(width - 1 - d)))?;
        let top = (0..depth_y).find(|&y| hit(row_density(y)))?;
        let bottom = (0..depth_y).find(|&d| hit(row_density(height - 1 - d)))?;

        Some(BorderWidths {
            left,
            right,
            top,
            bottom,
        })
    }

    /// First scan line from each edge where the saturated share drops
    fn saturation_borders(&self, card: &RectifiedCard) -> Option<BorderWidths> {
        let cfg = &self.config;
        let planes = card.planes();
        let (width, height) = (card.width(), card.height());
        let saturated = |x: u32, y: u32| planes.saturation[planes.index(x, y)] > cfg.saturation_threshold;

        let column_fraction = |x: u32| {
            (0..height).filter(|&y| saturated(x, y)).count() as f32 / height as f32
        };
        let row_fraction = |y: u32| {
            (0..width).filter(|&x| saturated(x, y)).count() as f32 / width as f32
        };

        let depth_x = ((width as f32 * cfg.max_scan_fraction) as u32).max(1);
        let depth_y = ((height as f32 * cfg.max_scan_fraction) as u32).max(1);
        let ends = |fraction: f32| fraction < cfg.saturated_line_fraction;

        let borders = BorderWidths {
            left: (0..depth_x).find(|&x| ends(column_fraction(x)))?,
            right: (0..depth_x).find(|&d| ends(column_fraction(width - 1 - d)))?,
            top: (0..depth_y).find(|&y| ends(row_fraction(y)))?,
            bottom: (0..depth_y).find(|&d| ends(row_fraction(height - 1 - d)))?,
        };
        // An unsaturated first line means there is no coloured border to measure
        if borders.left == 0 || borders.right == 0 || borders.top == 0 || borders.bottom == 0 {
            return None;
        }
        Some(borders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RectificationConfig;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn card(image: RgbImage) -> RectifiedCard {
        RectifiedCard::new(image, &RectificationConfig::default()).unwrap()
    }

    fn boxed(x: i32, y: i32, w: u32, h: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(500, 700, Rgb([220, 220, 220]));
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), Rgb([40, 40, 40]));
        image
    }

    #[test]
    fn test_centered_artwork_scores_high() {
        let report = CenteringAnalyzer::default()
            .analyze(&card(boxed(100, 150, 300, 400)))
            .unwrap();
        assert_eq!(report.method, CenteringMethod::ArtworkBox);
        assert!(report.sub_score.score >= 9.5, "score {}", report.sub_score.score);
        assert!((report.sub_score.confidence - 0.9).abs() < 1e-6);
        let borders = report.borders.unwrap();
        assert!((borders.left as i32 - 100).abs() <= 2);
        assert!((borders.top as i32 - 150).abs() <= 2);
    }

    #[test]
    fn test_off_center_artwork_scores_lower() {
        // Left 60, right 140: ratio 0.43
        let report = CenteringAnalyzer::default()
            .analyze(&card(boxed(60, 150, 300, 400)))
            .unwrap();
        assert_eq!(report.method, CenteringMethod::ArtworkBox);
        assert!(report.left_right_ratio.unwrap() < 0.5);
        assert!(report.sub_score.score < 6.0);
    }

    #[test]
    fn test_gradient_method_on_thin_border() {
        // Inner region covers 93% of the card: too large for the artwork filter
        let mut image = RgbImage::from_pixel(500, 700, Rgb([255, 215, 0]));
        draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(480, 680), Rgb([30, 60, 200]));
        let report = CenteringAnalyzer::default().analyze(&card(image)).unwrap();
        assert_eq!(report.method, CenteringMethod::Gradient);
        let borders = report.borders.unwrap();
        assert_eq!(borders.left, borders.right);
        assert_eq!(borders.top, borders.bottom);
        assert_eq!(report.sub_score.score, 10.0);
    }

    #[test]
    fn test_uniform_card_falls_back() {
        let image = RgbImage::from_pixel(500, 700, Rgb([120, 120, 120]));
        let report = CenteringAnalyzer::default().analyze(&card(image)).unwrap();
        assert_eq!(report.method, CenteringMethod::Fallback);
        assert_eq!(report.sub_score.score, 7.0);
        assert_eq!(report.sub_score.confidence, 0.5);
        assert!(report.borders.is_none());
    }

    #[test]
    fn test_score_ratio_curve() {
        let analyzer = CenteringAnalyzer::default();
        assert_eq!(analyzer.score_ratio(1.0), 10.0);
        assert_eq!(analyzer.score_ratio(0.975), 10.0);
        assert!((analyzer.score_ratio(0.925) - 8.5).abs() < 1e-4);
        assert_eq!(analyzer.score_ratio(0.70), 4.0);
        assert!((analyzer.score_ratio(0.5) - 2.5).abs() < 1e-6);
        assert_eq!(analyzer.score_ratio(0.1), 1.0);
    }

    #[test]
    fn test_ratios() {
        let borders = BorderWidths {
            left: 10,
            right: 20,
            top: 5,
            bottom: 5,
        };
        assert_eq!(borders.ratios(), Some((0.5, 1.0)));
        let missing = BorderWidths {
            left: 0,
            right: 0,
            top: 5,
            bottom: 5,
        };
        assert_eq!(missing.ratios(), None);
    }
}
