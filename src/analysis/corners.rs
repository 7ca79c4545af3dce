//! Corner wear analysis
//!
//! Each corner ROI sits just inside the card boundary. Whitening is judged
//! against a calibration window anchored at the same corner: a pixel is
//! whitened when it is clearly lighter and clearly less saturated than the
//! window's median. Light or yellow borders therefore do not read as wear.

use crate::analysis::card::RectifiedCard;
use crate::analysis::SubScore;
use crate::color::stats::{median, std_dev};
use crate::config::CornerConfig;
use crate::error::{GradingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Confidence attached to a corner that could not be inspected
const SKIPPED_CORNER_CONFIDENCE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CornerPosition {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl CornerPosition {
    pub const ALL: [CornerPosition; 4] = [
        CornerPosition::TopLeft,
        CornerPosition::TopRight,
        CornerPosition::BottomRight,
        CornerPosition::BottomLeft,
    ];
}

impl fmt::Display for CornerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CornerPosition::TopLeft => "top-left",
            CornerPosition::TopRight => "top-right",
            CornerPosition::BottomRight => "bottom-right",
            CornerPosition::BottomLeft => "bottom-left",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerScore {
    pub position: CornerPosition,
    pub score: f32,
    /// Whitened share of the ROI in percent, after coverage scaling
    pub whitened_percent: f32,
    /// Share of the ROI inside the card
    pub coverage: f32,
    pub confidence: f32,
    /// Too little of the ROI was card to judge
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerReport {
    pub sub_score: SubScore,
    pub corners: Vec<CornerScore>,
    pub average: f32,
    pub worst: f32,
    pub worst_corner_penalty: f32,
}

impl CornerReport {
    pub fn conservative(score: f32, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            sub_score: SubScore::new(score, confidence).with_note(reason),
            corners: Vec::new(),
            average: score,
            worst: score,
            worst_corner_penalty: 0.0,
        }
    }

    /// Lowest individual corner, falling back to the aggregate
    pub fn worst_corner(&self) -> f32 {
        self.corners
            .iter()
            .map(|c| c.score)
            .reduce(f32::min)
            .unwrap_or(self.sub_score.score)
    }
}

pub struct CornerAnalyzer {
    config: CornerConfig,
}

impl Default for CornerAnalyzer {
    fn default() -> Self {
        Self::new(CornerConfig::default())
    }
}

impl CornerAnalyzer {
    pub fn new(config: CornerConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(width = card.width(), height = card.height()))]
    pub fn analyze(&self, card: &RectifiedCard) -> Result<CornerReport> {
        let roi = ((self.config.roi_fraction * card.short_side() as f32).round() as u32).max(1);
        let guard = card.guard();
        if roi + guard >= card.short_side() / 2 {
            return Err(GradingError::analysis("corners", "corner ROI does not fit the card"));
        }

        let corners: Vec<CornerScore> = CornerPosition::ALL
            .iter()
            .map(|&position| self.score_corner(card, position, roi))
            .collect();
        Ok(self.aggregate(corners))
    }

    /// Combine corner scores with the worst-corner penalty
    pub fn aggregate(&self, corners: Vec<CornerScore>) -> CornerReport {
        let cfg = &self.config;
        if corners.is_empty() {
            return CornerReport::conservative(cfg.skipped_score, cfg.min_confidence, "no corners scored");
        }
        let scores: Vec<f32> = corners.iter().map(|c| c.score).collect();
        let average = scores.iter().sum::<f32>() / scores.len() as f32;
        let worst = scores.iter().copied().fold(f32::INFINITY, f32::min);

        let penalty = if worst < cfg.penalty_severe {
            cfg.penalty_factor * (cfg.penalty_severe - worst)
        } else if worst < cfg.penalty_upper {
            cfg.penalty_factor * (cfg.penalty_upper - worst)
        } else {
            0.0
        };
        let score = (average - penalty).max(worst);

        let skipped = corners.iter().filter(|c| c.skipped).count();
        let mut confidence = cfg.base_confidence - cfg.confidence_step * skipped as f32;
        if std_dev(&scores).unwrap_or(0.0) > cfg.spread_threshold {
            confidence -= cfg.confidence_step;
        }
        let confidence = confidence.clamp(cfg.min_confidence, 1.0);

        let mut sub_score = SubScore::new(score, confidence);
        if let Some(worst_corner) = corners.iter().min_by(|a, b| a.score.total_cmp(&b.score)) {
            if worst_corner.score < cfg.penalty_upper {
                sub_score = sub_score.with_note(format!(
                    "worst corner {} at {:.1}",
                    worst_corner.position, worst_corner.score
                ));
            }
        }
        if skipped > 0 {
            sub_score = sub_score.with_note(format!("{} corner(s) outside the card mask", skipped));
        }

        CornerReport {
            sub_score,
            corners,
            average,
            worst,
            worst_corner_penalty: penalty,
        }
    }

    /// Whitened percentage → score
    pub fn score_percent(&self, percent: f32) -> f32 {
        self.config.curve.evaluate(percent)
    }

    fn score_corner(&self, card: &RectifiedCard, position: CornerPosition, roi: u32) -> CornerScore {
        let cfg = &self.config;
        let guard = card.guard();
        let window = ((roi as f32 * cfg.calibration_scale).round() as u32).max(roi);
        let (roi_x, roi_y) = anchor(card, position, roi, guard);
        let (win_x, win_y) = anchor(card, position, window, guard);

        let planes = card.planes();
        let interior = card.interior();

        // Local reference from the calibration window
        let mut lightness = Vec::with_capacity((window * window) as usize);
        let mut saturation = Vec::with_capacity((window * window) as usize);
        for y in win_y..win_y + window {
            for x in win_x..win_x + window {
                if interior.get(x, y) {
                    let i = planes.index(x, y);
                    lightness.push(planes.lightness[i]);
                    saturation.push(planes.saturation[i]);
                }
            }
        }

        let roi_area = (roi * roi) as f32;
        let mut inside = 0usize;
        let mut whitened = 0usize;
        if let (Some(median_l), Some(median_s)) = (median(&lightness), median(&saturation)) {
            let l_threshold = median_l + cfg.lightness_offset;
            let s_threshold = (median_s - cfg.saturation_drop).max(cfg.min_saturation_threshold);
            for y in roi_y..roi_y + roi {
                for x in roi_x..roi_x + roi {
                    if !interior.get(x, y) {
                        continue;
                    }
                    inside += 1;
                    let i = planes.index(x, y);
                    if planes.lightness[i] > l_threshold && planes.saturation[i] < s_threshold {
                        whitened += 1;
                    }
                }
            }
        }

        let coverage = inside as f32 / roi_area;
        if coverage < cfg.min_coverage {
            debug!(%position, coverage, "corner skipped");
            return CornerScore {
                position,
                score: cfg.skipped_score,
                whitened_percent: 0.0,
                coverage,
                confidence: SKIPPED_CORNER_CONFIDENCE,
                skipped: true,
            };
        }

        let mut percent = whitened as f32 / inside as f32 * 100.0;
        if coverage < cfg.coverage_scale_below {
            percent *= coverage;
        }
        let score = self.score_percent(percent);
        debug!(%position, percent, coverage, score, "corner scored");

        CornerScore {
            position,
            score,
            whitened_percent: percent,
            coverage,
            confidence: cfg.base_confidence,
            skipped: false,
        }
    }
}

/// Top-left pixel of a `size`-square box tucked into `position` at the guard inset
fn anchor(card: &RectifiedCard, position: CornerPosition, size: u32, guard: u32) -> (u32, u32) {
    let size = size.min(card.width() - 2 * guard).min(card.height() - 2 * guard);
    let right = card.width() - guard - size;
    let bottom = card.height() - guard - size;
    match position {
        CornerPosition::TopLeft => (guard, guard),
        CornerPosition::TopRight => (right, guard),
        CornerPosition::BottomRight => (right, bottom),
        CornerPosition::BottomLeft => (guard, bottom),
    }
}
