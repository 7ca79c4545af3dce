//! Async grading with the vision fallback
//!
//! CPU-bound stages run on the blocking pool; only the fallback call runs on
//! the async runtime, behind a [`FallbackGate`]. Cancelling the token aborts a
//! queued or in-flight fallback call and returns before the next stage. A
//! blocking stage already started runs to completion in the background and
//! its result is dropped.

use crate::color::to_gray;
use crate::detection::fallback::to_candidate;
use crate::detection::{FallbackGate, VisionFallback};
use crate::error::{GradingError, Result};
use crate::pipeline::{CardGrader, DetectionSummary, GradeReport, SideReport};
use crate::quality::assess_quality;
use image::RgbImage;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Grader that asks a vision service for the boundary when classical
/// detection is unsure
pub struct HybridGrader<F> {
    grader: Arc<CardGrader>,
    fallback: Arc<F>,
    gate: FallbackGate,
}

impl<F: VisionFallback + 'static> HybridGrader<F> {
    pub fn new(grader: CardGrader, fallback: F) -> Self {
        let gate = FallbackGate::new(&grader.config().fallback);
        Self {
            grader: Arc::new(grader),
            fallback: Arc::new(fallback),
            gate,
        }
    }

    /// Share one permit pool between several graders
    pub fn with_gate(mut self, gate: FallbackGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn grader(&self) -> &CardGrader {
        &self.grader
    }

    pub fn gate(&self) -> &FallbackGate {
        &self.gate
    }

    /// Grade a card from photos of its front and optionally its back
    ///
    /// # Errors
    ///
    /// `Cancelled` when `cancel` fires; `ImageLoadError` for an empty image.
    /// Fallback failures are logged and graded around.
    #[instrument(skip_all, fields(service = self.fallback.name(), has_back = back.is_some()))]
    pub async fn grade_image(
        &self,
        front: RgbImage,
        back: Option<RgbImage>,
        cancel: &CancellationToken,
    ) -> Result<GradeReport> {
        let front = self.grade_side(front, cancel).await?;
        let back = match back {
            Some(image) => Some(self.grade_side(image, cancel).await?),
            None => None,
        };
        Ok(self.grader.assemble(front, back))
    }

    async fn grade_side(&self, image: RgbImage, cancel: &CancellationToken) -> Result<SideReport> {
        if cancel.is_cancelled() {
            return Err(GradingError::Cancelled);
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(GradingError::ImageLoadError {
                message: "image has a zero dimension".to_string(),
                source: None,
            });
        }

        let started = Instant::now();
        let grader = Arc::clone(&self.grader);
        let (image, scale, quality, classical) = run_blocking(cancel, move || {
            let original_width = image.width();
            let downscaled = match grader.prepare(&image) {
                Cow::Owned(resized) => Some(resized),
                Cow::Borrowed(_) => None,
            };
            let processed = downscaled.unwrap_or(image);
            let scale = processed.width() as f64 / original_width as f64;
            let quality = assess_quality(&processed, &grader.config().quality);
            let candidate = grader.detect(&processed);
            (Arc::new(processed), scale, quality, candidate)
        })
        .await?;

        let mut candidate = classical;
        let mut warnings = Vec::new();
        let mut fallback_quality = None;
        let threshold = self.grader.config().fallback.confidence_threshold;
        let fallback_attempted = candidate.as_ref().map_or(true, |c| c.confidence < threshold);

        if fallback_attempted {
            info!(
                classical = candidate.as_ref().map_or(0.0, |c| c.confidence),
                threshold, "consulting vision fallback"
            );
            match self.gate.run(self.fallback.as_ref(), &image, cancel).await {
                Ok(detection) => {
                    fallback_quality = Some(detection.quality.clone());
                    let grader = Arc::clone(&self.grader);
                    let photo = Arc::clone(&image);
                    let proposed = run_blocking(cancel, move || {
                        let gray = to_gray(&photo);
                        to_candidate(&detection, Some(&gray), &grader.config().fallback)
                    })
                    .await?;
                    if let Some(proposed) = proposed {
                        if candidate.as_ref().map_or(true, |c| proposed.confidence > c.confidence) {
                            info!(confidence = proposed.confidence, "using vision fallback boundary");
                            candidate = Some(proposed);
                        }
                    }
                }
                Err(GradingError::Cancelled) => return Err(GradingError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "vision fallback unavailable, keeping classical result");
                    warnings.push(format!("Vision fallback unavailable: {}", e));
                }
            }
        }

        let mut detection = DetectionSummary::new(candidate.as_ref(), scale, started.elapsed());
        detection.fallback_attempted = fallback_attempted;
        detection.fallback_quality = fallback_quality;

        let grader = Arc::clone(&self.grader);
        let mut report = run_blocking(cancel, move || {
            grader.finish_side(&image, quality, candidate.as_ref(), detection)
        })
        .await?;
        report.warnings.extend(warnings);
        Ok(report)
    }
}

/// Run CPU-bound work on the blocking pool, racing the cancellation token
async fn run_blocking<T, W>(cancel: &CancellationToken, work: W) -> Result<T>
where
    W: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GradingError::Cancelled),
        joined = handle => joined.map_err(|e| GradingError::ProcessingError {
            message: format!("grading worker failed: {}", e),
        }),
    }
}
