//! Configuration structures for the card_grader pipeline.
//!
//! Every threshold used by detection, the four analyzers and the grading
//! engine is a named field here, grouped by stage. Calibration against
//! professionally graded cards means editing a JSON file, not code.
//!
//! # Configuration Loading
//!
//! ```no_run
//! use card_grader::GradingConfig;
//! use std::path::Path;
//!
//! // Load from file
//! let config = GradingConfig::from_json_file(Path::new("grading.json"))?;
//!
//! // Or use the built-in calibration
//! let config = GradingConfig::default_calibration();
//! # Ok::<(), card_grader::GradingError>(())
//! ```
//!
//! # Configuration Sections
//!
//! - [`DetectionConfig`]: card-likeness filter, ensemble strategies
//! - [`RectificationConfig`]: canonical frame and card-interior mask
//! - [`FallbackConfig`]: vision fallback trigger, concurrency and refinement
//! - [`CenteringConfig`], [`CornerConfig`], [`EdgeConfig`], [`SurfaceConfig`]: analyzers
//! - [`ScoringConfig`]: weights, penalties, grade brackets, explanations
//! - [`QualityConfig`]: capture-quality checks

use crate::error::{GradingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete grading configuration.
///
/// Serializable to and from JSON for reproducible calibration runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub detection: DetectionConfig,
    pub rectification: RectificationConfig,
    pub fallback: FallbackConfig,
    pub centering: CenteringConfig,
    pub corners: CornerConfig,
    pub edges: EdgeConfig,
    pub surface: SurfaceConfig,
    pub scoring: ScoringConfig,
    pub quality: QualityConfig,
}

/// One calibration point of a piecewise-linear curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f32,
    pub score: f32,
}

/// Piecewise-linear curve over sorted calibration points.
///
/// Inputs outside the covered range take the nearest endpoint's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new(points: &[(f32, f32)]) -> Self {
        Self {
            points: points
                .iter()
                .map(|&(x, score)| CurvePoint { x, score })
                .collect(),
        }
    }

    /// Evaluate the curve at `x`
    pub fn evaluate(&self, x: f32) -> f32 {
        let points = &self.points;
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return crate::constants::scale::MIN_SCORE,
        };
        if x <= first.x {
            return first.score;
        }
        if x >= last.x {
            return last.score;
        }
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if x >= a.x && x <= b.x {
                let span = b.x - a.x;
                if span <= f32::EPSILON {
                    return a.score.min(b.score);
                }
                let t = (x - a.x) / span;
                return a.score + t * (b.score - a.score);
            }
        }
        last.score
    }

    fn is_sorted(&self) -> bool {
        self.points.windows(2).all(|p| p[0].x <= p[1].x)
    }
}

/// Step band: values strictly below `below` score `score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepBand {
    pub below: f32,
    pub score: f32,
}

/// Scratch-count band: counts up to and including `max_count` score `score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountBand {
    pub max_count: u32,
    pub score: f32,
}

/// Penalty applied when a value is at most `at_most`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBand {
    pub at_most: f32,
    pub penalty: f32,
}

/// Penalty applied when at least `count` items qualify.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountPenalty {
    pub count: usize,
    pub penalty: f32,
}

/// Confidence assigned when at least `above` of the surface is obscured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObscuredBand {
    pub above: f32,
    pub confidence: f32,
}

/// Discrete grade bracket: scores at or above `min_score` get `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBracket {
    pub min_score: f32,
    pub label: String,
}

/// Boundary detection parameters.
///
/// Controls the strategy ensemble and the card-likeness filter applied
/// to every raw contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longer-side limit in pixels; larger photos are downscaled for detection
    pub max_side: u32,

    /// Minimum contour area as fraction of the image
    pub min_area_ratio: f64,

    /// Maximum contour area as fraction of the image
    pub max_area_ratio: f64,

    /// Minimum short/long side ratio of the rotated bounding rectangle
    pub min_aspect: f64,

    /// Maximum short/long side ratio of the rotated bounding rectangle
    pub max_aspect: f64,

    /// Physical card ratio used for the aspect score
    pub ideal_aspect: f64,

    /// Minimum contour area over rotated-rectangle area
    pub min_rectangularity: f64,

    /// Minimum contour area over convex-hull area
    pub min_solidity: f64,

    pub weight_aspect: f64,
    pub weight_rectangularity: f64,
    pub weight_solidity: f64,
    pub weight_area: f64,

    /// Lower end of the preferred frame occupancy
    pub preferred_area_min: f64,

    /// Upper end of the preferred frame occupancy
    pub preferred_area_max: f64,

    /// Stop running strategies once a candidate scores above this
    pub early_exit_confidence: f64,

    /// Spread of the adaptive Canny thresholds around the median intensity
    pub canny_sigma: f32,

    /// CLAHE clip limit (multiples of the uniform bin height)
    pub clahe_clip_limit: f32,

    /// CLAHE tiles per axis
    pub clahe_tiles: u32,

    /// Median filter radius for edge-preserving denoise
    pub denoise_radius: u32,

    /// Closing radius (L-infinity) bridging edge gaps
    pub close_radius: u8,

    /// Number of closing passes
    pub close_iterations: u32,

    /// Polygon simplification epsilon as fraction of perimeter
    pub poly_epsilon_fraction: f64,

    /// Run the colour-segmentation strategy
    pub color_segmentation: bool,

    /// Number of Lab clusters
    pub kmeans_clusters: usize,

    /// Lloyd iterations
    pub kmeans_iterations: usize,

    /// Subsampling step used to fit the cluster centres
    pub kmeans_sample_step: u32,

    /// Closing/opening radius applied to each cluster mask
    pub segmentation_morph_radius: u8,

    /// Accept the whole frame as a pre-cropped card
    pub full_frame_fallback: bool,

    /// Confidence reported for the full-frame fallback
    pub full_frame_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_side: crate::constants::performance::DETECTION_MAX_SIDE,
            min_area_ratio: 0.20,
            max_area_ratio: 0.95,
            min_aspect: 0.60,
            max_aspect: 0.85,
            ideal_aspect: 0.714,
            min_rectangularity: 0.85,
            min_solidity: 0.90,
            weight_aspect: 0.40,
            weight_rectangularity: 0.25,
            weight_solidity: 0.20,
            weight_area: 0.15,
            preferred_area_min: 0.40,
            preferred_area_max: 0.80,
            early_exit_confidence: 0.85,
            canny_sigma: 0.33,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            denoise_radius: 2,
            close_radius: 2,
            close_iterations: 2,
            poly_epsilon_fraction: 0.02,
            color_segmentation: true,
            kmeans_clusters: 3,
            kmeans_iterations: 20,
            kmeans_sample_step: 4,
            segmentation_morph_radius: 7,
            full_frame_fallback: true,
            full_frame_confidence: 0.30,
        }
    }
}

/// Perspective rectification and card-interior mask parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectificationConfig {
    /// Canonical width in pixels
    pub width: u32,

    /// Canonical height in pixels
    pub height: u32,

    /// Inset kept out of the card-interior mask, as fraction of the short side
    pub guard_fraction: f32,

    /// Pixels closer than this ΔE to the sampled background leave the mask
    pub background_delta_e: f32,

    /// Distance outside the quadrilateral at which background is sampled
    pub background_sample_offset: f32,

    /// Outer strip, as fraction of the short side, where background-coloured
    /// pixels are dropped from the mask
    pub background_strip_fraction: f32,
}

impl Default for RectificationConfig {
    fn default() -> Self {
        Self {
            width: crate::constants::canonical::WIDTH,
            height: crate::constants::canonical::HEIGHT,
            guard_fraction: 0.005,
            background_delta_e: 12.0,
            background_sample_offset: 6.0,
            background_strip_fraction: 0.05,
        }
    }
}

/// Vision fallback trigger and call limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Invoke the fallback when the best classical confidence is below this
    pub confidence_threshold: f64,

    /// Maximum simultaneous fallback calls; extra calls queue
    pub max_concurrent: usize,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Snap fallback corners to nearby edge pixels
    pub refine_corners: bool,

    /// Half-size of the square search window in pixels
    pub refine_search_radius: u32,

    pub refine_canny_low: f32,
    pub refine_canny_high: f32,

    /// Confidence multiplier applied when at least one corner was refined
    pub refined_confidence_boost: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.70,
            max_concurrent: 5,
            timeout_ms: 30_000,
            refine_corners: true,
            refine_search_radius: 30,
            refine_canny_low: 50.0,
            refine_canny_high: 150.0,
            refined_confidence_boost: 1.1,
        }
    }
}

/// Centering analyzer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteringConfig {
    pub artwork_blur_sigma: f32,
    pub artwork_canny_low: f32,
    pub artwork_canny_high: f32,

    /// Artwork box area bounds as fraction of the card
    pub artwork_min_area: f64,
    pub artwork_max_area: f64,

    /// Minimum distance of the box from the top-left edges, as fraction of the side
    pub artwork_min_margin: f64,

    pub artwork_min_aspect: f64,
    pub artwork_max_aspect: f64,

    /// Sobel magnitude counted as an edge pixel
    pub gradient_threshold: f32,

    /// Fraction of edge pixels that marks the end of the border in a scan line
    pub gradient_density: f32,

    /// Deepest scan position as fraction of the dimension
    pub max_scan_fraction: f32,

    /// HSV saturation counted as a coloured border pixel
    pub saturation_threshold: f32,

    /// A scan line stops being border once its saturated fraction drops below this
    pub saturated_line_fraction: f32,

    /// Ratios below this are treated as misdetection
    pub min_valid_ratio: f32,

    /// Average ratio → score
    pub curve: Curve,

    /// Below the curve: score = max(1, ratio × slope)
    pub below_curve_slope: f32,

    /// Score when every method produced an implausible ratio
    pub fallback_score: f32,

    pub confidence_artwork: f32,
    pub confidence_gradient: f32,
    pub confidence_saturation: f32,
    pub confidence_fallback: f32,
}

impl Default for CenteringConfig {
    fn default() -> Self {
        Self {
            artwork_blur_sigma: 1.0,
            artwork_canny_low: 50.0,
            artwork_canny_high: 150.0,
            artwork_min_area: 0.15,
            artwork_max_area: 0.70,
            artwork_min_margin: 0.02,
            artwork_min_aspect: 0.5,
            artwork_max_aspect: 2.0,
            gradient_threshold: 60.0,
            gradient_density: 0.5,
            max_scan_fraction: 0.25,
            saturation_threshold: 0.35,
            saturated_line_fraction: 0.60,
            min_valid_ratio: 0.3,
            curve: Curve::new(&[
                (0.70, 4.0),
                (0.75, 5.0),
                (0.80, 6.0),
                (0.85, 7.0),
                (0.90, 8.0),
                (0.95, 9.0),
                (0.975, 10.0),
            ]),
            below_curve_slope: 5.0,
            fallback_score: 7.0,
            confidence_artwork: 0.9,
            confidence_gradient: 0.8,
            confidence_saturation: 0.7,
            confidence_fallback: 0.5,
        }
    }
}

/// Corner analyzer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    /// ROI side as fraction of the short card side
    pub roi_fraction: f32,

    /// Calibration window side in multiples of the ROI side
    pub calibration_scale: f32,

    /// L* above the local median that counts as lighter
    pub lightness_offset: f32,

    /// Saturation below the local median that counts as washed out
    pub saturation_drop: f32,

    /// Lower bound of the saturation threshold
    pub min_saturation_threshold: f32,

    /// Skip the corner when less of the ROI than this lies inside the card
    pub min_coverage: f32,

    /// Scale the whitening percentage by coverage below this
    pub coverage_scale_below: f32,

    /// Score assigned to skipped corners
    pub skipped_score: f32,

    /// Whitened percentage → score
    pub curve: Curve,

    pub penalty_factor: f32,

    /// Worst corner below this starts the aggregate penalty
    pub penalty_upper: f32,

    /// Worst corner below this switches to the severe penalty
    pub penalty_severe: f32,

    pub base_confidence: f32,
    pub confidence_step: f32,
    pub spread_threshold: f32,
    pub min_confidence: f32,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            roi_fraction: 0.04,
            calibration_scale: 3.0,
            lightness_offset: 20.0,
            saturation_drop: 0.15,
            min_saturation_threshold: 0.08,
            min_coverage: 0.17,
            coverage_scale_below: 0.5,
            skipped_score: 7.0,
            curve: Curve::new(&[
                (0.0, 10.0),
                (1.0, 9.5),
                (3.0, 9.0),
                (6.0, 8.0),
                (10.0, 7.0),
                (15.0, 6.0),
                (20.0, 5.0),
                (27.0, 4.0),
                (35.0, 3.0),
            ]),
            penalty_factor: 0.5,
            penalty_upper: 8.0,
            penalty_severe: 6.0,
            base_confidence: 0.9,
            confidence_step: 0.1,
            spread_threshold: 2.0,
            min_confidence: 0.5,
        }
    }
}

/// Edge analyzer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Border band thickness as fraction of the short card side
    pub band_fraction: f32,

    /// Minimum blue fraction for a card back
    pub back_blue_fraction: f32,

    /// Maximum yellow fraction for a card back
    pub back_max_yellow: f32,

    /// Blue hue range in degrees
    pub blue_hue_min: f32,
    pub blue_hue_max: f32,

    /// Yellow hue range in degrees
    pub yellow_hue_min: f32,
    pub yellow_hue_max: f32,

    /// Minimum saturation and value for a hue to count
    pub hue_min_saturation: f32,
    pub hue_min_value: f32,

    /// Absolute L* above which back-border pixels are whitened
    pub back_whitening_lightness: f32,

    /// Saturation below which a back-border pixel is worn stock rather than ink
    pub back_low_saturation: f32,

    /// L* above the band mean that counts as whitened on fronts
    pub front_offset: f32,

    /// Upper bound of the front threshold
    pub front_cap: f32,

    /// The front threshold never falls closer than this to the band mean,
    /// so a uniformly light border is not read as whitened
    pub front_min_margin: f32,

    /// Edges scoring below this are reported as worn
    pub worn_below: f32,

    /// Whitened percentage → score steps
    pub bands: Vec<StepBand>,

    /// Beyond the last band: score = max(1, tail_base − (p − tail_start) / tail_divisor)
    pub tail_start: f32,
    pub tail_base: f32,
    pub tail_divisor: f32,

    pub confidence_back: f32,
    pub confidence_front: f32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        let bands = [
            (0.2, 10.0),
            (0.5, 9.5),
            (1.0, 9.0),
            (1.5, 8.5),
            (2.5, 8.0),
            (4.0, 7.0),
            (6.0, 6.0),
            (8.0, 5.0),
            (12.0, 4.0),
            (18.0, 3.0),
        ]
        .iter()
        .map(|&(below, score)| StepBand { below, score })
        .collect();

        Self {
            band_fraction: 0.03,
            back_blue_fraction: 0.35,
            back_max_yellow: 0.12,
            blue_hue_min: 180.0,
            blue_hue_max: 280.0,
            yellow_hue_min: 40.0,
            yellow_hue_max: 70.0,
            hue_min_saturation: 0.16,
            hue_min_value: 0.08,
            back_whitening_lightness: 60.0,
            back_low_saturation: 0.25,
            front_offset: 15.0,
            front_cap: 92.0,
            front_min_margin: 5.0,
            worn_below: 8.0,
            bands,
            tail_start: 18.0,
            tail_base: 3.0,
            tail_divisor: 10.0,
            confidence_back: 0.85,
            confidence_front: 0.75,
        }
    }
}

/// Surface analyzer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// HSV value at or above which a pixel may be glare
    pub glare_min_value: f32,

    /// HSV saturation at or below which a bright pixel is glare
    pub glare_max_saturation: f32,

    pub glare_dilate_radius: u8,
    pub glare_dilate_iterations: u32,

    /// Half-size of the local-variance window
    pub holo_window_radius: u32,

    /// Local L* variance above which texture is treated as foil
    pub holo_variance: f32,

    /// Minimum local Canny-edge density for foil; isolated lines stay below it
    pub holo_edge_density: f32,

    /// Close/open radius cleaning the foil mask
    pub holo_morph_radius: u8,

    /// Outer margin always excluded, as fraction of the short side
    pub margin_fraction: f32,

    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
    pub canny_low: f32,
    pub canny_high: f32,

    /// Length of the directional opening elements
    pub line_length: u32,

    /// Dilation joining the two edge lines of one scratch before labelling
    pub scratch_bridge_radius: u8,

    /// Minimum scratch component area as fraction of the card
    pub min_scratch_area_fraction: f32,

    /// Gray level below which a pixel is dark (crease shadow, stain)
    pub dark_threshold: u8,

    /// Minimum dark component area as fraction of the card
    pub major_damage_area_fraction: f32,

    /// Scratch count → score
    pub scratch_bands: Vec<CountBand>,

    /// Score beyond the last scratch band
    pub scratch_floor_score: f32,

    /// Ceiling applied when major damage is present
    pub major_damage_cap: f32,

    /// Obscured fraction → confidence, checked in order
    pub obscured_bands: Vec<ObscuredBand>,

    /// Confidence with little of the surface obscured
    pub clear_confidence: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            glare_min_value: 0.90,
            glare_max_saturation: 0.12,
            glare_dilate_radius: 2,
            glare_dilate_iterations: 2,
            holo_window_radius: 7,
            holo_variance: 30.0,
            holo_edge_density: 0.2,
            holo_morph_radius: 3,
            margin_fraction: 0.03,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            canny_low: 100.0,
            canny_high: 200.0,
            line_length: 5,
            scratch_bridge_radius: 2,
            min_scratch_area_fraction: 0.0001,
            dark_threshold: 40,
            major_damage_area_fraction: 0.0015,
            scratch_bands: vec![
                CountBand { max_count: 0, score: 10.0 },
                CountBand { max_count: 3, score: 9.5 },
                CountBand { max_count: 7, score: 9.0 },
                CountBand { max_count: 12, score: 8.0 },
                CountBand { max_count: 20, score: 7.0 },
            ],
            scratch_floor_score: 6.5,
            major_damage_cap: 7.0,
            obscured_bands: vec![
                ObscuredBand { above: 0.40, confidence: 0.6 },
                ObscuredBand { above: 0.25, confidence: 0.7 },
                ObscuredBand { above: 0.15, confidence: 0.85 },
            ],
            clear_confidence: 0.95,
        }
    }
}

/// Sub-score weights; must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScoreWeights {
    pub centering: f32,
    pub corners: f32,
    pub edges: f32,
    pub surface: f32,
}

impl SubScoreWeights {
    pub fn sum(&self) -> f32 {
        self.centering + self.corners + self.edges + self.surface
    }
}

/// Score thresholds for the qualitative explanation tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTiers {
    pub excellent: f32,
    pub centering_acceptable: f32,
    pub good: f32,
    pub fair: f32,
}

/// Grading engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SubScoreWeights,

    /// Worst-corner penalties, first matching band wins
    pub corner_penalties: Vec<PenaltyBand>,

    /// Edges scoring below this count toward the wear penalty
    pub edge_wear_threshold: f32,

    /// Worn-edge-count penalties, first matching entry wins
    pub edge_penalties: Vec<CountPenalty>,

    pub major_damage_penalty: f32,

    /// Surface scores below this get the mild penalty
    pub mild_surface_below: f32,
    pub mild_surface_penalty: f32,

    /// Ordered highest first
    pub brackets: Vec<GradeBracket>,

    pub tiers: ExplanationTiers,

    /// Overall confidence below this adds a warning
    pub low_confidence_warning: f32,

    /// Overall confidence below this triggers recommendations
    pub recommendation_confidence: f32,

    pub high_confidence: f32,
    pub medium_confidence: f32,

    /// Sub-score used when an analyzer could not run
    pub default_score: f32,

    /// Confidence attached to a default sub-score
    pub default_confidence: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let brackets = [
            (9.5, "10"),
            (9.0, "9"),
            (8.0, "8"),
            (7.0, "7"),
            (6.0, "6"),
            (5.0, "5"),
            (4.0, "4"),
            (3.0, "3"),
            (2.0, "2"),
            (1.0, "1"),
            (0.0, "0"),
        ]
        .iter()
        .map(|&(min_score, label)| GradeBracket {
            min_score,
            label: label.to_string(),
        })
        .collect();

        Self {
            weights: SubScoreWeights {
                centering: 0.20,
                corners: 0.30,
                edges: 0.30,
                surface: 0.20,
            },
            corner_penalties: vec![
                PenaltyBand { at_most: 5.0, penalty: 2.0 },
                PenaltyBand { at_most: 6.5, penalty: 1.0 },
                PenaltyBand { at_most: 7.5, penalty: 0.5 },
            ],
            edge_wear_threshold: 7.0,
            edge_penalties: vec![
                CountPenalty { count: 4, penalty: 1.5 },
                CountPenalty { count: 3, penalty: 1.0 },
                CountPenalty { count: 2, penalty: 0.5 },
            ],
            major_damage_penalty: 2.0,
            mild_surface_below: 7.0,
            mild_surface_penalty: 0.5,
            brackets,
            tiers: ExplanationTiers {
                excellent: 9.5,
                centering_acceptable: 8.5,
                good: 8.0,
                fair: 6.0,
            },
            low_confidence_warning: 0.6,
            recommendation_confidence: 0.7,
            high_confidence: 0.8,
            medium_confidence: 0.6,
            default_score: 7.0,
            default_confidence: 0.3,
        }
    }
}

/// Capture-quality thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Laplacian variance below this is a blur issue
    pub blur_issue: f64,
    pub blur_warning: f64,

    /// Mean gray level bounds
    pub dark_issue: f64,
    pub bright_issue: f64,
    pub dark_warning: f64,
    pub bright_warning: f64,

    /// Gray standard deviation bounds
    pub contrast_issue: f64,
    pub contrast_warning: f64,

    /// Short side below this is a warning
    pub min_resolution: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_issue: 100.0,
            blur_warning: 200.0,
            dark_issue: 40.0,
            bright_issue: 230.0,
            dark_warning: 80.0,
            bright_warning: 180.0,
            contrast_issue: 20.0,
            contrast_warning: 40.0,
            min_resolution: 600,
        }
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self::default_calibration()
    }
}

impl GradingConfig {
    /// Built-in calibration
    pub fn default_calibration() -> Self {
        Self {
            detection: DetectionConfig::default(),
            rectification: RectificationConfig::default(),
            fallback: FallbackConfig::default(),
            centering: CenteringConfig::default(),
            corners: CornerConfig::default(),
            edges: EdgeConfig::default(),
            surface: SurfaceConfig::default(),
            scoring: ScoringConfig::default(),
            quality: QualityConfig::default(),
        }
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GradingError::config(format!("Failed to read {}", path.display()), e)
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| GradingError::config("Invalid configuration JSON", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GradingError::config("Failed to serialize configuration", e))?;
        std::fs::write(path, json).map_err(|e| {
            GradingError::config(format!("Failed to write {}", path.display()), e)
        })?;
        Ok(())
    }

    /// Reject values no calibration could mean
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        check_fraction("detection.min_area_ratio", d.min_area_ratio)?;
        check_fraction("detection.max_area_ratio", d.max_area_ratio)?;
        check_order("detection.min_area_ratio", d.min_area_ratio, d.max_area_ratio)?;
        check_fraction("detection.min_aspect", d.min_aspect)?;
        check_order("detection.min_aspect", d.min_aspect, d.max_aspect)?;
        if d.max_aspect > 1.0 {
            return Err(GradingError::invalid_parameter("detection.max_aspect", d.max_aspect));
        }
        let detection_weights =
            d.weight_aspect + d.weight_rectangularity + d.weight_solidity + d.weight_area;
        if (detection_weights - 1.0).abs() > 0.01 {
            return Err(GradingError::invalid_parameter(
                "detection.weights",
                detection_weights,
            ));
        }
        if d.kmeans_clusters < 2 {
            return Err(GradingError::invalid_parameter(
                "detection.kmeans_clusters",
                d.kmeans_clusters,
            ));
        }
        if d.max_side < 64 {
            return Err(GradingError::invalid_parameter("detection.max_side", d.max_side));
        }

        let r = &self.rectification;
        if r.width < 50 || r.height < 50 {
            return Err(GradingError::invalid_parameter(
                "rectification.size",
                format!("{}x{}", r.width, r.height),
            ));
        }

        if self.fallback.max_concurrent == 0 {
            return Err(GradingError::invalid_parameter("fallback.max_concurrent", 0));
        }
        if self.fallback.timeout_ms == 0 {
            return Err(GradingError::invalid_parameter("fallback.timeout_ms", 0));
        }

        check_fraction("rectification.guard_fraction", r.guard_fraction as f64)?;
        check_fraction(
            "rectification.background_strip_fraction",
            r.background_strip_fraction as f64,
        )?;
        check_fraction("corners.roi_fraction", self.corners.roi_fraction as f64)?;
        check_fraction("edges.band_fraction", self.edges.band_fraction as f64)?;
        check_fraction("surface.margin_fraction", self.surface.margin_fraction as f64)?;

        for (name, curve) in [
            ("centering.curve", &self.centering.curve),
            ("corners.curve", &self.corners.curve),
        ] {
            if curve.points.is_empty() || !curve.is_sorted() {
                return Err(GradingError::invalid_parameter(name, "empty or unsorted"));
            }
        }
        if self.edges.bands.is_empty() {
            return Err(GradingError::invalid_parameter("edges.bands", "empty"));
        }
        if !(self.edges.front_min_margin >= 0.0) {
            return Err(GradingError::invalid_parameter(
                "edges.front_min_margin",
                self.edges.front_min_margin,
            ));
        }

        let s = &self.scoring;
        let weight_sum = s.weights.sum();
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(GradingError::invalid_parameter("scoring.weights", weight_sum));
        }
        if s.brackets.is_empty() {
            return Err(GradingError::invalid_parameter("scoring.brackets", "empty"));
        }
        if s.brackets.windows(2).any(|b| b[0].min_score < b[1].min_score) {
            return Err(GradingError::invalid_parameter(
                "scoring.brackets",
                "not ordered highest first",
            ));
        }
        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(GradingError::invalid_parameter(name, value))
    }
}

fn check_order(name: &str, low: f64, high: f64) -> Result<()> {
    if low < high {
        Ok(())
    } else {
        Err(GradingError::invalid_parameter(name, format!("{} >= {}", low, high)))
    }
}
