//! Edge wear analysis
//!
//! Whitening along the four border bands. Backs share one known border
//! colour, so a fixed lightness threshold applies to pixels of that colour.
//! Fronts vary, so each band is judged against its own mean lightness.

use crate::analysis::card::RectifiedCard;
use crate::analysis::side::{classify_side, hue_in, CardSide, SideClassification};
use crate::analysis::SubScore;
use crate::config::EdgeConfig;
use crate::error::{GradingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgePosition {
    Top,
    Right,
    Bottom,
    Left,
}

impl EdgePosition {
    pub const ALL: [EdgePosition; 4] = [
        EdgePosition::Top,
        EdgePosition::Right,
        EdgePosition::Bottom,
        EdgePosition::Left,
    ];
}

impl fmt::Display for EdgePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgePosition::Top => "top",
            EdgePosition::Right => "right",
            EdgePosition::Bottom => "bottom",
            EdgePosition::Left => "left",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeScore {
    pub position: EdgePosition,
    pub score: f32,
    pub whitened_percent: f32,
    /// Band pixels the whitening rule was applied to
    pub inspected_pixels: usize,
    pub worn: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub sub_score: SubScore,
    pub side: Option<SideClassification>,
    pub edges: Vec<EdgeScore>,
    /// Whitened percentage over all four bands
    pub overall_percent: f32,
    pub worn_edges: Vec<EdgePosition>,
}

impl EdgeReport {
    pub fn conservative(score: f32, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            sub_score: SubScore::new(score, confidence).with_note(reason),
            side: None,
            edges: Vec::new(),
            overall_percent: 0.0,
            worn_edges: Vec::new(),
        }
    }

    /// Individual edge scores, or the aggregate four times when none were measured
    pub fn edge_scores(&self) -> Vec<f32> {
        if self.edges.is_empty() {
            vec![self.sub_score.score; 4]
        } else {
            self.edges.iter().map(|e| e.score).collect()
        }
    }
}

/// Pixel tallies for one band
#[derive(Debug, Default, Clone, Copy)]
struct BandCount {
    inspected: usize,
    whitened: usize,
}

impl BandCount {
    fn percent(&self) -> f32 {
        if self.inspected == 0 {
            0.0
        } else {
            self.whitened as f32 / self.inspected as f32 * 100.0
        }
    }
}

pub struct EdgeAnalyzer {
    config: EdgeConfig,
}

impl Default for EdgeAnalyzer {
    fn default() -> Self {
        Self::new(EdgeConfig::default())
    }
}

impl EdgeAnalyzer {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(width = card.width(), height = card.height()))]
    pub fn analyze(&self, card: &RectifiedCard) -> Result<EdgeReport> {
        let cfg = &self.config;
        let band = ((cfg.band_fraction * card.short_side() as f32).round() as u32).max(1);
        if 2 * band >= card.short_side() {
            return Err(GradingError::analysis("edges", "border band wider than the card"));
        }

        let side = classify_side(card, cfg);
        let counts: Vec<(EdgePosition, BandCount)> = EdgePosition::ALL
            .iter()
            .map(|&position| {
                let count = match side.side {
                    CardSide::Back => self.count_back(card, position, band),
                    CardSide::Front => self.count_front(card, position, band),
                };
                (position, count)
            })
            .collect();

        let total_inspected: usize = counts.iter().map(|(_, c)| c.inspected).sum();
        if total_inspected == 0 {
            return Err(GradingError::analysis("edges", "no border pixels inside the card mask"));
        }
        let total_whitened: usize = counts.iter().map(|(_, c)| c.whitened).sum();
        let overall_percent = total_whitened as f32 / total_inspected as f32 * 100.0;

        let edges: Vec<EdgeScore> = counts
            .iter()
            .map(|&(position, count)| {
                let percent = count.percent();
                let score = self.score_percent(percent);
                debug!(%position, percent, score, "edge scored");
                EdgeScore {
                    position,
                    score,
                    whitened_percent: percent,
                    inspected_pixels: count.inspected,
                    worn: score < cfg.worn_below,
                }
            })
            .collect();

        let worst = edges.iter().map(|e| e.score).fold(f32::INFINITY, f32::min);
        let score = self.score_percent(overall_percent).min(worst);
        let worn_edges: Vec<EdgePosition> =
            edges.iter().filter(|e| e.worn).map(|e| e.position).collect();

        let confidence = match side.side {
            CardSide::Back => cfg.confidence_back,
            CardSide::Front => cfg.confidence_front,
        };
        let mut sub_score = SubScore::new(score, confidence)
            .with_note(format!("{} side, {:.2}% whitened overall", side.side, overall_percent));
        if !worn_edges.is_empty() {
            let names: Vec<String> = worn_edges.iter().map(|e| e.to_string()).collect();
            sub_score = sub_score.with_note(format!("worn edges: {}", names.join(", ")));
        }

        Ok(EdgeReport {
            sub_score,
            side: Some(side),
            edges,
            overall_percent,
            worn_edges,
        })
    }

    /// Whitened percentage → score
    pub fn score_percent(&self, percent: f32) -> f32 {
        let cfg = &self.config;
        for band in &cfg.bands {
            if percent < band.below {
                return band.score;
            }
        }
        (cfg.tail_base - (percent - cfg.tail_start) / cfg.tail_divisor).max(1.0)
    }

    /// Back: fixed lightness threshold over border-coloured or washed-out pixels
    fn count_back(&self, card: &RectifiedCard, position: EdgePosition, band: u32) -> BandCount {
        let cfg = &self.config;
        let planes = card.planes();
        let mut count = BandCount::default();
        for_band_pixel(card, position, band, |x, y| {
            let i = planes.index(x, y);
            let (h, s, v) = (planes.hue[i], planes.saturation[i], planes.value[i]);
            let border_colour = hue_in(h, s, v, cfg.blue_hue_min, cfg.blue_hue_max, cfg);
            if border_colour || s < cfg.back_low_saturation {
                count.inspected += 1;
                if planes.lightness[i] > cfg.back_whitening_lightness {
                    count.whitened += 1;
                }
            }
        });
        count
    }

    /// Front: threshold relative to the band's own mean lightness
    fn count_front(&self, card: &RectifiedCard, position: EdgePosition, band: u32) -> BandCount {
        let cfg = &self.config;
        let planes = card.planes();

        let mut sum = 0f64;
        let mut n = 0usize;
        for_band_pixel(card, position, band, |x, y| {
            sum += planes.lightness[planes.index(x, y)] as f64;
            n += 1;
        });
        if n == 0 {
            return BandCount::default();
        }
        let mean = (sum / n as f64) as f32;
        let threshold = (mean + cfg.front_offset)
            .min(cfg.front_cap)
            .max(mean + cfg.front_min_margin);

        let mut count = BandCount::default();
        for_band_pixel(card, position, band, |x, y| {
            count.inspected += 1;
            if planes.lightness[planes.index(x, y)] > threshold {
                count.whitened += 1;
            }
        });
        count
    }
}

/// Visit interior pixels of one border band
///
/// Top and bottom bands span the full width; left and right bands stop at
/// the top and bottom bands so corners are not counted twice.
fn for_band_pixel(card: &RectifiedCard, position: EdgePosition, band: u32, mut f: impl FnMut(u32, u32)) {
    let (width, height) = (card.width(), card.height());
    let (x0, y0, x1, y1) = match position {
        EdgePosition::Top => (0, 0, width, band),
        EdgePosition::Bottom => (0, height - band, width, height),
        EdgePosition::Left => (0, band, band, height - band),
        EdgePosition::Right => (width - band, band, width, height - band),
    };
    let interior = card.interior();
    for y in y0..y1 {
        for x in x0..x1 {
            if interior.get(x, y) {
                f(x, y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RectificationConfig;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn back_card() -> RgbImage {
        let mut image = RgbImage::from_pixel(500, 700, Rgb([255, 215, 0]));
        draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(480, 680), Rgb([30, 60, 200]));
        image
    }

    fn card(image: RgbImage) -> RectifiedCard {
        RectifiedCard::new(image, &RectificationConfig::default()).unwrap()
    }

    fn edge(report: &EdgeReport, position: EdgePosition) -> EdgeScore {
        *report.edges.iter().find(|e| e.position == position).unwrap()
    }

    #[test]
    fn test_pristine_back() {
        let report = EdgeAnalyzer::default().analyze(&card(back_card())).unwrap();
        assert_eq!(report.side.unwrap().side, CardSide::Back);
        assert_eq!(report.sub_score.score, 10.0);
        assert!((report.sub_score.confidence - 0.85).abs() < 1e-6);
        assert!(report.worn_edges.is_empty());
    }

    #[test]
    fn test_flooded_corner_wears_two_edges() {
        let mut image = back_card();
        draw_filled_rect_mut(&mut image, Rect::at(0, 0).of_size(25, 25), Rgb([255, 255, 255]));
        let report = EdgeAnalyzer::default().analyze(&card(image)).unwrap();

        let top = edge(&report, EdgePosition::Top);
        let left = edge(&report, EdgePosition::Left);
        assert!(top.whitened_percent > 8.0 && top.whitened_percent < 12.0);
        assert_eq!(top.score, 4.0);
        assert_eq!(left.score, 7.0);
        assert_eq!(edge(&report, EdgePosition::Bottom).score, 10.0);
        assert_eq!(report.sub_score.score, 4.0);
        assert_eq!(report.worn_edges, vec![EdgePosition::Top, EdgePosition::Left]);
    }

    #[test]
    fn test_worst_edge_dominates() {
        // Gray front with a bright strip along the outer right edge only
        let mut image = RgbImage::from_pixel(500, 700, Rgb([110, 90, 80]));
        draw_filled_rect_mut(&mut image, Rect::at(492, 15).of_size(8, 670), Rgb([250, 250, 250]));
        let report = EdgeAnalyzer::default().analyze(&card(image)).unwrap();
        assert_eq!(report.side.unwrap().side, CardSide::Front);

        let right = edge(&report, EdgePosition::Right);
        assert!(right.score < 8.0);
        assert!(report.sub_score.score <= right.score);
        assert_eq!(edge(&report, EdgePosition::Top).score, 10.0);
        assert!((report.sub_score.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_clean_light_border_front() {
        // Near-white border lighter than the front cap, red artwork inside
        let mut image = RgbImage::from_pixel(500, 700, Rgb([250, 250, 248]));
        draw_filled_rect_mut(&mut image, Rect::at(25, 25).of_size(450, 650), Rgb([200, 30, 30]));
        let report = EdgeAnalyzer::default().analyze(&card(image)).unwrap();
        assert_eq!(report.side.unwrap().side, CardSide::Front);

        for e in &report.edges {
            assert_eq!(e.whitened_percent, 0.0, "{} whitened {}", e.position, e.whitened_percent);
            assert_eq!(e.score, 10.0);
        }
        assert_eq!(report.sub_score.score, 10.0);
        assert!(report.worn_edges.is_empty());
    }

    #[test]
    fn test_score_percent_bands() {
        let analyzer = EdgeAnalyzer::default();
        assert_eq!(analyzer.score_percent(0.0), 10.0);
        assert_eq!(analyzer.score_percent(0.3), 9.5);
        assert_eq!(analyzer.score_percent(3.0), 7.0);
        assert_eq!(analyzer.score_percent(17.9), 3.0);
        assert!((analyzer.score_percent(28.0) - 2.0).abs() < 1e-6);
        assert_eq!(analyzer.score_percent(90.0), 1.0);
    }
}
