//! Surface damage analysis
//!
//! Counts scratches and flags major damage (creases, dents, stains) while
//! keeping glare and holographic foil out of both counts.
//!
//! # Pipeline
//!
//! 1. Exclusion: glare (bright, unsaturated, dilated) ∪ foil (high local L*
//!    variance where Canny edges are dense) ∪ the outer margin
//! 2. Scratches: CLAHE, Canny, directional line openings, minus exclusion,
//!    bridged and labelled; components above a resolution-scaled area count
//! 3. Major damage: dark components above a larger area threshold

use crate::analysis::card::RectifiedCard;
use crate::analysis::SubScore;
use crate::config::SurfaceConfig;
use crate::error::Result;
use crate::imaging::{clahe, local_mean, local_variance, open_line, LineOrientation, Mask};
use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceReport {
    pub sub_score: SubScore,
    pub scratch_count: usize,
    pub major_damage: bool,
    /// Dark regions large enough to count as major damage
    pub damage_regions: usize,
    /// Share of the inspected surface under glare
    pub glare_fraction: f32,
    /// Share of the inspected surface under foil texture
    pub holo_fraction: f32,
    /// Share of the inspected surface excluded from inspection
    pub obscured_fraction: f32,
}

impl SurfaceReport {
    pub fn conservative(score: f32, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            sub_score: SubScore::new(score, confidence).with_note(reason),
            scratch_count: 0,
            major_damage: false,
            damage_regions: 0,
            glare_fraction: 0.0,
            holo_fraction: 0.0,
            obscured_fraction: 0.0,
        }
    }
}

pub struct SurfaceAnalyzer {
    config: SurfaceConfig,
}

impl Default for SurfaceAnalyzer {
    fn default() -> Self {
        Self::new(SurfaceConfig::default())
    }
}

impl SurfaceAnalyzer {
    pub fn new(config: SurfaceConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(width = card.width(), height = card.height()))]
    pub fn analyze(&self, card: &RectifiedCard) -> Result<SurfaceReport> {
        let cfg = &self.config;
        let (width, height) = (card.width(), card.height());
        let card_area = card.area() as f32;

        // Region actually inspected: card interior minus the outer margin
        let margin = ((cfg.margin_fraction * card.short_side() as f32).round() as u32).max(1);
        let inner = Mask::from_fn(width, height, |x, y| {
            x >= margin && y >= margin && x + margin < width && y + margin < height
        });
        let inspected = card.interior().intersect(&inner)?;

        let enhanced = clahe(card.gray(), cfg.clahe_clip_limit, cfg.clahe_tiles);
        let edges = canny(&enhanced, cfg.canny_low, cfg.canny_high);

        let glare = self.glare_mask(card);
        let holo = self.holo_mask(card, &edges);
        let obscured = glare.union(&holo)?;
        let exclusion = obscured.union(&inspected.invert())?;

        let inspected_count = inspected.count().max(1) as f32;
        let glare_fraction = glare.intersect(&inspected)?.count() as f32 / inspected_count;
        let holo_fraction = holo.intersect(&inspected)?.count() as f32 / inspected_count;
        let obscured_fraction = obscured.intersect(&inspected)?.count() as f32 / inspected_count;

        // Scratches: elongated edge structures outside the exclusion
        let horizontal = open_line(&edges, cfg.line_length, LineOrientation::Horizontal);
        let vertical = open_line(&edges, cfg.line_length, LineOrientation::Vertical);
        let lines = Mask::from_gray(horizontal)
            .union(&Mask::from_gray(vertical))?
            .subtract(&exclusion)?
            .dilate(cfg.scratch_bridge_radius, 1);
        let min_scratch_area = (cfg.min_scratch_area_fraction * card_area).ceil().max(1.0) as usize;
        let scratch_count = count_components(lines.as_gray(), min_scratch_area);

        // Major damage: large dark regions
        let dark = Mask::from_fn(width, height, |x, y| {
            card.gray().get_pixel(x, y).0[0] < cfg.dark_threshold
        })
        .subtract(&exclusion)?;
        let min_damage_area = (cfg.major_damage_area_fraction * card_area).ceil().max(1.0) as usize;
        let damage_regions = count_components(dark.as_gray(), min_damage_area);
        let major_damage = damage_regions > 0;

        let mut score = self.score_scratches(scratch_count);
        if major_damage {
            score = score.min(cfg.major_damage_cap);
        }
        let confidence = self.confidence_for(obscured_fraction);

        debug!(
            scratch_count,
            damage_regions,
            glare_fraction,
            holo_fraction,
            score,
            "surface analysed"
        );

        let mut sub_score = SubScore::new(score, confidence)
            .with_note(format!("{} scratch(es) detected", scratch_count));
        if major_damage {
            sub_score = sub_score.with_note("major damage detected");
        }
        if obscured_fraction > 0.0 {
            sub_score = sub_score.with_note(format!(
                "{:.0}% of surface obscured by glare or foil",
                obscured_fraction * 100.0
            ));
        }

        Ok(SurfaceReport {
            sub_score,
            scratch_count,
            major_damage,
            damage_regions,
            glare_fraction,
            holo_fraction,
            obscured_fraction,
        })
    }

    /// Scratch count → score
    pub fn score_scratches(&self, count: usize) -> f32 {
        self.config
            .scratch_bands
            .iter()
            .find(|band| count <= band.max_count as usize)
            .map_or(self.config.scratch_floor_score, |band| band.score)
    }

    fn confidence_for(&self, obscured: f32) -> f32 {
        self.config
            .obscured_bands
            .iter()
            .find(|band| obscured > band.above)
            .map_or(self.config.clear_confidence, |band| band.confidence)
    }

    /// Bright, unsaturated pixels grown to cover their halo
    fn glare_mask(&self, card: &RectifiedCard) -> Mask {
        let cfg = &self.config;
        let planes = card.planes();
        Mask::from_fn(card.width(), card.height(), |x, y| {
            let i = planes.index(x, y);
            planes.value[i] >= cfg.glare_min_value && planes.saturation[i] <= cfg.glare_max_saturation
        })
        .dilate(cfg.glare_dilate_radius, cfg.glare_dilate_iterations)
    }

    /// Textured regions: high lightness variance with dense edges
    ///
    /// The edge-density condition keeps an isolated scratch, which also has
    /// high local variance, out of the mask.
    fn holo_mask(&self, card: &RectifiedCard, edges: &GrayImage) -> Mask {
        let cfg = &self.config;
        let (width, height) = (card.width(), card.height());
        let variance = local_variance(&card.planes().lightness, width, height, cfg.holo_window_radius);
        let indicator: Vec<f32> = edges
            .pixels()
            .map(|p| if p.0[0] > 0 { 1.0 } else { 0.0 })
            .collect();
        let density = local_mean(&indicator, width, height, cfg.holo_window_radius);
        if variance.len() != (width * height) as usize || density.len() != variance.len() {
            return Mask::new(width, height);
        }

        Mask::from_fn(width, height, |x, y| {
            let i = (y * width + x) as usize;
            variance[i] > cfg.holo_variance && density[i] >= cfg.holo_edge_density
        })
        .close(cfg.holo_morph_radius)
        .open(cfg.holo_morph_radius)
    }
}

/// 8-connected foreground components with at least `min_area` pixels
fn count_components(binary: &GrayImage, min_area: usize) -> usize {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<usize> = Vec::new();
    for p in labels.pixels() {
        let label = p.0[0] as usize;
        if label == 0 {
            continue;
        }
        if areas.len() <= label {
            areas.resize(label + 1, 0);
        }
        areas[label] += 1;
    }
    areas.iter().filter(|&&a| a >= min_area).count()
}
