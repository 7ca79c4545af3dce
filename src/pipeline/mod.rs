//! End-to-end grading
//!
//! [`CardGrader`] runs the synchronous path: quality check, classical
//! detection, rectification, the four analyzers in parallel, and grade
//! aggregation. [`HybridGrader`] wraps it for async callers and consults a
//! vision fallback when classical detection is not confident.
//!
//! Only a failure to load or accept the input is returned as an error.
//! Detection and analyzer failures become conservative scores with warnings.

pub mod hybrid;

pub use hybrid::HybridGrader;

use crate::analysis::{
    CenteringAnalyzer, CenteringReport, CornerAnalyzer, CornerReport, EdgeAnalyzer, EdgeReport,
    RectifiedCard, SurfaceAnalyzer, SurfaceReport,
};
use crate::config::GradingConfig;
use crate::constants::performance::{DOWNSCALE_TARGET_PIXELS, MAX_PROCESSING_PIXELS};
use crate::detection::rectify::sample_background;
use crate::detection::{
    BoundaryDetector, DetectionCandidate, DetectionMethod, PerspectiveRectifier, QualityTags, Quadrilateral,
};
use crate::error::{GradingError, Result};
use crate::grading::{combine_sides, GradeResult, GradingEngine, SideAnalysis};
use crate::metrics::{DetectionMetrics, DetectionOutcome, DetectionSource};
use crate::quality::{assess_quality, QualityReport};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const NOT_DETECTED_WARNING: &str = "Card boundary not detected - conservative grade";

/// How the card was located on one face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// `None` when no boundary was found
    pub method: Option<DetectionMethod>,
    pub confidence: f64,
    /// In the coordinates of the processed photo
    pub quadrilateral: Option<Quadrilateral>,
    /// Processed size over original size; 1 unless the photo was downscaled
    pub processing_scale: f64,
    pub fallback_attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_quality: Option<QualityTags>,
    pub elapsed_ms: f64,
}

impl DetectionSummary {
    pub(crate) fn new(candidate: Option<&DetectionCandidate>, processing_scale: f64, elapsed: Duration) -> Self {
        Self {
            method: candidate.map(|c| c.method),
            confidence: candidate.map_or(0.0, |c| c.confidence),
            quadrilateral: candidate.map(|c| c.quadrilateral),
            processing_scale,
            fallback_attempted: false,
            fallback_quality: None,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    fn outcome(&self) -> DetectionOutcome {
        DetectionOutcome {
            source: DetectionSource::from_method(self.method),
            fallback_attempted: self.fallback_attempted,
            elapsed: Duration::from_secs_f64(self.elapsed_ms.max(0.0) / 1000.0),
        }
    }
}

/// Everything measured on one face of the card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideReport {
    pub detection: DetectionSummary,
    pub quality: QualityReport,
    pub analysis: SideAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Grade of a card with the per-face measurements behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub grade: GradeResult,
    pub front: SideReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back: Option<SideReport>,
}

/// Synchronous grading pipeline
pub struct CardGrader {
    config: GradingConfig,
    detector: BoundaryDetector,
    rectifier: PerspectiveRectifier,
    centering: CenteringAnalyzer,
    corners: CornerAnalyzer,
    edges: EdgeAnalyzer,
    surface: SurfaceAnalyzer,
    engine: GradingEngine,
    metrics: Option<Arc<DetectionMetrics>>,
}

impl CardGrader {
    /// Build a grader; the configuration is validated first
    pub fn new(config: GradingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: BoundaryDetector::new(config.detection.clone()),
            rectifier: PerspectiveRectifier::new(&config.rectification),
            centering: CenteringAnalyzer::new(config.centering.clone()),
            corners: CornerAnalyzer::new(config.corners.clone()),
            edges: EdgeAnalyzer::new(config.edges.clone()),
            surface: SurfaceAnalyzer::new(config.surface.clone()),
            engine: GradingEngine::new(config.scoring.clone()),
            metrics: None,
            config,
        })
    }

    /// Record every detection into a caller-owned collector
    pub fn with_metrics(mut self, metrics: Arc<DetectionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<DetectionMetrics>> {
        self.metrics.as_ref()
    }

    /// Grade a card from photos of its front and optionally its back
    #[instrument(skip_all, fields(has_back = back.is_some()))]
    pub fn grade_image(&self, front: &RgbImage, back: Option<&RgbImage>) -> Result<GradeReport> {
        let front = self.grade_side(front)?;
        let back = back.map(|image| self.grade_side(image)).transpose()?;
        Ok(self.assemble(front, back))
    }

    /// Grade already rectified faces
    pub fn grade_rectified(&self, front: &RectifiedCard, back: Option<&RectifiedCard>) -> GradeResult {
        let (front, mut warnings) = self.analyze_side(front);
        let back = back.map(|card| {
            let (analysis, back_warnings) = self.analyze_side(card);
            warnings.extend(back_warnings.into_iter().map(|w| format!("Back: {}", w)));
            analysis
        });
        let mut grade = combine_sides(&self.engine, &self.corners, &front, back.as_ref());
        for warning in warnings {
            grade.add_warning(warning);
        }
        grade
    }

    /// Locate the card in a photo already reduced to processing size
    pub fn detect(&self, image: &RgbImage) -> Option<DetectionCandidate> {
        self.detector.detect(image)
    }

    /// Warp the detected card to the canonical frame
    ///
    /// The interior mask drops pixels warped from outside the photo and
    /// background-coloured pixels near the border.
    pub fn rectify(&self, image: &RgbImage, quad: &Quadrilateral) -> Result<RectifiedCard> {
        let cfg = &self.config.rectification;
        let warped = self.rectifier.rectify(image, quad)?;
        let coverage = self.rectifier.coverage_mask(quad, image.width(), image.height())?;
        let background = sample_background(image, quad, cfg.background_sample_offset);
        RectifiedCard::with_context(warped, Some(coverage), background, cfg)
    }

    /// Detect and rectify in one step
    ///
    /// `Ok(None)` means no boundary was found. Rectification errors are
    /// returned for the caller to absorb.
    pub fn detect_and_rectify(&self, image: &RgbImage) -> Result<Option<(DetectionCandidate, RectifiedCard)>> {
        let processed = self.prepare(image);
        let Some(candidate) = self.detect(&processed) else {
            return Ok(None);
        };
        let card = self.rectify(&processed, &candidate.quadrilateral)?;
        Ok(Some((candidate, card)))
    }

    /// Run the four analyzers in parallel
    ///
    /// An analyzer that fails contributes its conservative default and a
    /// warning; the others are unaffected.
    pub fn analyze_side(&self, card: &RectifiedCard) -> (SideAnalysis, Vec<String>) {
        let ((centering, corners), (edges, surface)) = rayon::join(
            || rayon::join(|| self.centering.analyze(card), || self.corners.analyze(card)),
            || rayon::join(|| self.edges.analyze(card), || self.surface.analyze(card)),
        );

        let scoring = &self.config.scoring;
        let (score, confidence) = (scoring.default_score, scoring.default_confidence);
        let mut warnings = Vec::new();
        let mut recover = |analyzer: &str, error: GradingError| {
            warn!(analyzer, error = %error, "analyzer failed, using conservative score");
            warnings.push(error.to_string());
            error.to_string()
        };

        let centering = centering.unwrap_or_else(|e| {
            CenteringReport::conservative(score, confidence, recover("centering", e))
        });
        let corners =
            corners.unwrap_or_else(|e| CornerReport::conservative(score, confidence, recover("corners", e)));
        let edges = edges.unwrap_or_else(|e| EdgeReport::conservative(score, confidence, recover("edges", e)));
        let surface =
            surface.unwrap_or_else(|e| SurfaceReport::conservative(score, confidence, recover("surface", e)));

        (
            SideAnalysis {
                centering,
                corners,
                edges,
                surface,
            },
            warnings,
        )
    }

    /// Reduce oversize photos before any processing
    pub fn prepare<'a>(&self, image: &'a RgbImage) -> Cow<'a, RgbImage> {
        let pixels = image.width() as u64 * image.height() as u64;
        if pixels <= MAX_PROCESSING_PIXELS as u64 {
            return Cow::Borrowed(image);
        }
        let scale = (DOWNSCALE_TARGET_PIXELS as f64 / pixels as f64).sqrt();
        let width = ((image.width() as f64 * scale).round() as u32).max(1);
        let height = ((image.height() as f64 * scale).round() as u32).max(1);
        info!(from = pixels, width, height, "downscaling oversize photo");
        Cow::Owned(imageops::resize(image, width, height, FilterType::Triangle))
    }

    /// Quality check, detection and analysis of one face
    fn grade_side(&self, image: &RgbImage) -> Result<SideReport> {
        if image.width() == 0 || image.height() == 0 {
            return Err(GradingError::ImageLoadError {
                message: "image has a zero dimension".to_string(),
                source: None,
            });
        }
        let processed = self.prepare(image);
        let scale = processed.width() as f64 / image.width() as f64;
        let quality = assess_quality(&processed, &self.config.quality);

        let started = std::time::Instant::now();
        let candidate = self.detect(&processed);
        let detection = DetectionSummary::new(candidate.as_ref(), scale, started.elapsed());

        Ok(self.finish_side(&processed, quality, candidate.as_ref(), detection))
    }

    /// Rectify and analyze, or fall back to conservative scores
    pub(crate) fn finish_side(
        &self,
        image: &RgbImage,
        quality: QualityReport,
        candidate: Option<&DetectionCandidate>,
        detection: DetectionSummary,
    ) -> SideReport {
        if let Some(metrics) = &self.metrics {
            metrics.record(&detection.outcome());
        }

        let mut warnings: Vec<String> = quality.messages().cloned().collect();
        let rectified = match candidate {
            Some(candidate) => match self.rectify(image, &candidate.quadrilateral) {
                Ok(card) => Some(card),
                Err(e) => {
                    warn!(error = %e, "rectification failed");
                    warnings.push(e.to_string());
                    None
                }
            },
            None => None,
        };

        let analysis = match rectified {
            Some(card) => {
                info!(
                    method = ?detection.method,
                    confidence = detection.confidence,
                    "card rectified"
                );
                let (analysis, analyzer_warnings) = self.analyze_side(&card);
                warnings.extend(analyzer_warnings);
                analysis
            }
            None => {
                warn!("card boundary not detected, grading conservatively");
                warnings.push(NOT_DETECTED_WARNING.to_string());
                let scoring = &self.config.scoring;
                SideAnalysis::conservative(scoring.default_score, scoring.default_confidence, NOT_DETECTED_WARNING)
            }
        };

        SideReport {
            detection,
            quality,
            analysis,
            warnings,
        }
    }

    pub(crate) fn assemble(&self, front: SideReport, back: Option<SideReport>) -> GradeReport {
        let mut grade = combine_sides(
            &self.engine,
            &self.corners,
            &front.analysis,
            back.as_ref().map(|b| &b.analysis),
        );
        for warning in &front.warnings {
            grade.add_warning(warning.clone());
        }
        if let Some(back) = &back {
            for warning in &back.warnings {
                grade.add_warning(format!("Back: {}", warning));
            }
        }
        info!(grade = %grade.grade_label, score = grade.final_score, "card graded");
        GradeReport { grade, front, back }
    }
}
