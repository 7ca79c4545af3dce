//! Capture-quality assessment
//!
//! Cheap whole-photo checks run before detection: sharpness (variance of the
//! Laplacian), exposure (mean gray), contrast (gray standard deviation) and
//! resolution. Problems are reported, never corrected.

use crate::color::to_gray;
use crate::config::QualityConfig;
use image::{GrayImage, RgbImage};
use imageproc::filter::filter3x3;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

const LAPLACIAN: [i16; 9] = [0, 1, 0, 1, -4, 1, 0, 1, 0];

/// Overall capture quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Fair => "fair",
            QualityLevel::Poor => "poor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub width: u32,
    pub height: u32,
    /// Variance of the Laplacian; higher is sharper
    pub blur_score: f64,
    /// Mean gray level, 0-255
    pub brightness: f64,
    /// Gray standard deviation
    pub contrast: f64,
    pub level: QualityLevel,
    /// False when any hard issue was found
    pub is_gradeable: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl QualityReport {
    /// Issues followed by warnings, as grade warnings
    pub fn messages(&self) -> impl Iterator<Item = &String> {
        self.issues.iter().chain(&self.warnings)
    }
}

/// Measure the capture quality of a photo
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn assess_quality(image: &RgbImage, config: &QualityConfig) -> QualityReport {
    let gray = to_gray(image);
    let blur_score = laplacian_variance(&gray);
    let (brightness, contrast) = mean_and_std(&gray);
    let (width, height) = image.dimensions();

    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if width.min(height) < config.min_resolution {
        warnings.push(format!(
            "Low resolution: {}x{} (minimum {}px)",
            width, height, config.min_resolution
        ));
    }

    if blur_score < config.blur_issue {
        issues.push(format!("Image too blurry (score: {:.1})", blur_score));
    } else if blur_score < config.blur_warning {
        warnings.push(format!("Image slightly blurry (score: {:.1})", blur_score));
    }

    if brightness < config.dark_issue {
        issues.push(format!("Image too dark (brightness: {:.1})", brightness));
    } else if brightness > config.bright_issue {
        issues.push(format!("Image overexposed (brightness: {:.1})", brightness));
    } else if brightness < config.dark_warning || brightness > config.bright_warning {
        warnings.push(format!("Suboptimal lighting (brightness: {:.1})", brightness));
    }

    if contrast < config.contrast_issue {
        issues.push(format!("Low contrast (score: {:.1})", contrast));
    } else if contrast < config.contrast_warning {
        warnings.push(format!("Low contrast (score: {:.1})", contrast));
    }

    let level = if !issues.is_empty() {
        QualityLevel::Poor
    } else if warnings.len() > 2 {
        QualityLevel::Fair
    } else if !warnings.is_empty() {
        QualityLevel::Good
    } else {
        QualityLevel::Excellent
    };

    debug!(blur_score, brightness, contrast, %level, "capture quality assessed");

    QualityReport {
        width,
        height,
        blur_score,
        brightness,
        contrast,
        level,
        is_gradeable: issues.is_empty(),
        issues,
        warnings,
    }
}

/// Variance of the 4-neighbour Laplacian response
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let response = filter3x3::<_, i16, i16>(gray, &LAPLACIAN);
    let n = response.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let (sum, sum_sq) = response.pixels().fold((0f64, 0f64), |(s, sq), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn mean_and_std(gray: &GrayImage) -> (f64, f64) {
    let n = gray.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = gray.pixels().fold((0f64, 0f64), |(s, sq), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (mean, (sum_sq / n - mean * mean).max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(size: u32, cell: u32, dark: u8, light: u8) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let v = if ((x / cell) + (y / cell)) % 2 == 0 { dark } else { light };
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_sharp_checkerboard_is_excellent() {
        let report = assess_quality(&checkerboard(800, 8, 40, 215), &QualityConfig::default());
        assert!(report.blur_score > 200.0, "blur score {}", report.blur_score);
        assert!(report.contrast > 40.0);
        assert_eq!(report.level, QualityLevel::Excellent);
        assert!(report.is_gradeable);
        assert_eq!(report.messages().count(), 0);
    }

    #[test]
    fn test_flat_image_is_poor() {
        let image = RgbImage::from_pixel(800, 800, Rgb([128, 128, 128]));
        let report = assess_quality(&image, &QualityConfig::default());
        assert_eq!(report.blur_score, 0.0);
        assert_eq!(report.contrast, 0.0);
        assert_eq!(report.level, QualityLevel::Poor);
        assert!(!report.is_gradeable);
        assert!(report.issues.iter().any(|i| i.contains("blurry")));
        assert!(report.issues.iter().any(|i| i.contains("contrast")));
    }

    #[test]
    fn test_dark_image() {
        let report = assess_quality(&checkerboard(800, 8, 0, 50), &QualityConfig::default());
        assert!(report.issues.iter().any(|i| i.contains("too dark")));
    }

    #[test]
    fn test_small_image_warns_on_resolution() {
        let report = assess_quality(&checkerboard(300, 8, 40, 215), &QualityConfig::default());
        assert!(report.warnings.iter().any(|w| w.starts_with("Low resolution")));
        assert!(report.is_gradeable);
        assert_eq!(report.level, QualityLevel::Good);
    }
}
