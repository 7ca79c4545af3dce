//! Vision fallback collaborator
//!
//! When the classical detector is not confident, an external image
//! understanding service may be asked for the card corners. This module
//! defines the trait such a service implements, a gate that bounds
//! concurrent calls and enforces timeouts and cancellation, and the edge
//! snapping applied to whatever corners come back.

use crate::config::FallbackConfig;
use crate::detection::boundary::{DetectionCandidate, DetectionMethod};
use crate::detection::geometry::{Point, Quadrilateral};
use crate::error::{GradingError, Result};
use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Capture conditions reported by the service, free-form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTags {
    pub lighting: Option<String>,
    pub blur: Option<String>,
    pub angle: Option<String>,
    pub background: Option<String>,
}

/// Answer of a vision fallback call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionDetection {
    /// `None` when the service saw no card
    pub quadrilateral: Option<Quadrilateral>,
    pub confidence: f64,
    #[serde(default)]
    pub quality: QualityTags,
}

impl VisionDetection {
    pub fn not_found() -> Self {
        Self {
            quadrilateral: None,
            confidence: 0.0,
            quality: QualityTags::default(),
        }
    }
}

/// External card localisation service
///
/// Implementations are non-deterministic and may be slow; they are only
/// ever invoked through a [`FallbackGate`].
#[async_trait]
pub trait VisionFallback: Send + Sync {
    /// Service name used in logs and errors
    fn name(&self) -> &'static str;

    async fn detect(&self, image: &RgbImage) -> Result<VisionDetection>;
}

#[async_trait]
impl<F: VisionFallback + ?Sized> VisionFallback for Arc<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn detect(&self, image: &RgbImage) -> Result<VisionDetection> {
        (**self).detect(image).await
    }
}

/// Bounds simultaneous fallback calls and applies the per-call timeout
///
/// Clones share the same permit pool.
#[derive(Debug, Clone)]
pub struct FallbackGate {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl FallbackGate {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Call the fallback once a permit is free
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires while queued or in flight
    /// - `FallbackTimeout` when the call outlives the timeout
    /// - `ExternalServiceFailure` for any error the service reports
    #[instrument(skip_all, fields(service = fallback.name()))]
    pub async fn run<F>(
        &self,
        fallback: &F,
        image: &RgbImage,
        cancel: &CancellationToken,
    ) -> Result<VisionDetection>
    where
        F: VisionFallback + ?Sized,
    {
        let service = fallback.name();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GradingError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| GradingError::ExternalServiceFailure {
                service: service.to_string(),
                reason: "fallback gate closed".to_string(),
            })?,
        };
        debug!(available = self.semaphore.available_permits(), "fallback permit acquired");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GradingError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, fallback.detect(image)) => outcome,
        };

        let detection = match outcome {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "vision fallback timed out");
                return Err(GradingError::FallbackTimeout {
                    service: service.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                warn!(error = %e, "vision fallback failed");
                return Err(match e {
                    GradingError::Cancelled
                    | GradingError::ExternalServiceFailure { .. }
                    | GradingError::FallbackTimeout { .. } => e,
                    other => GradingError::ExternalServiceFailure {
                        service: service.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
            Ok(Ok(detection)) => detection,
        };

        Ok(sanitize(detection))
    }
}

/// Treat malformed answers as "no card" instead of trusting them
fn sanitize(mut detection: VisionDetection) -> VisionDetection {
    if !detection.confidence.is_finite() {
        warn!("vision fallback returned a non-finite confidence");
        return VisionDetection {
            quality: detection.quality,
            ..VisionDetection::not_found()
        };
    }
    detection.confidence = detection.confidence.clamp(0.0, 1.0);

    // Deserialized quadrilaterals bypass construction checks
    if let Some(quad) = detection.quadrilateral {
        if Quadrilateral::from_points(quad.points()).is_err() {
            warn!("vision fallback returned a degenerate quadrilateral");
            detection.quadrilateral = None;
            detection.confidence = 0.0;
        }
    }
    detection
}

/// Snap each corner to the nearest edge pixel within the search window
///
/// Returns the refined quadrilateral and how many corners moved. Corners
/// with no edge nearby stay put; if the snapped corners no longer form a
/// valid quadrilateral the input is returned unchanged.
pub fn refine_corners(
    gray: &GrayImage,
    quad: &Quadrilateral,
    config: &FallbackConfig,
) -> (Quadrilateral, usize) {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return (*quad, 0);
    }
    let edges = canny(gray, config.refine_canny_low, config.refine_canny_high);
    let radius = config.refine_search_radius as i64;

    let mut moved = 0;
    let refined = quad.points().map(|corner| {
        let cx = corner.x.round() as i64;
        let cy = corner.y.round() as i64;
        let mut best: Option<(f64, Point)> = None;
        for y in (cy - radius).max(0)..=(cy + radius).min(height as i64 - 1) {
            for x in (cx - radius).max(0)..=(cx + radius).min(width as i64 - 1) {
                if edges.get_pixel(x as u32, y as u32).0[0] == 0 {
                    continue;
                }
                let candidate = Point::new(x as f64, y as f64);
                let d = candidate.distance(&corner);
                if best.map_or(true, |(nearest, _)| d < nearest) {
                    best = Some((d, candidate));
                }
            }
        }
        match best {
            Some((d, point)) => {
                if d > 0.0 {
                    moved += 1;
                }
                point
            }
            None => corner,
        }
    });

    match Quadrilateral::from_points(refined) {
        Ok(q) => (q, moved),
        Err(e) => {
            debug!(error = %e, "refined corners rejected");
            (*quad, 0)
        }
    }
}

/// Turn a fallback answer into a detection candidate
///
/// When `gray` is given and refinement is enabled, corners are snapped to
/// edges and the confidence is boosted if any corner moved.
pub fn to_candidate(
    detection: &VisionDetection,
    gray: Option<&GrayImage>,
    config: &FallbackConfig,
) -> Option<DetectionCandidate> {
    let quad = detection.quadrilateral?;
    let mut confidence = detection.confidence;
    let mut quadrilateral = quad;

    if let (true, Some(gray)) = (config.refine_corners, gray) {
        let (refined, moved) = refine_corners(gray, &quad, config);
        if moved > 0 {
            quadrilateral = refined;
            confidence = (confidence * config.refined_confidence_boost).min(1.0);
        }
        info!(moved, confidence, "fallback corners refined");
    }

    Some(DetectionCandidate {
        quadrilateral,
        confidence,
        method: DetectionMethod::VisionFallback,
        metrics: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn card_quad() -> Quadrilateral {
        Quadrilateral::from_points([
            Point::new(100.0, 100.0),
            Point::new(300.0, 100.0),
            Point::new(300.0, 380.0),
            Point::new(100.0, 380.0),
        ])
        .unwrap()
    }

    struct Fixed(VisionDetection);

    #[async_trait]
    impl VisionFallback for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn detect(&self, _image: &RgbImage) -> Result<VisionDetection> {
            Ok(self.0.clone())
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl VisionFallback for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn detect(&self, _image: &RgbImage) -> Result<VisionDetection> {
            tokio::time::sleep(self.0).await;
            Ok(VisionDetection::not_found())
        }
    }

    struct Failing;

    #[async_trait]
    impl VisionFallback for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn detect(&self, _image: &RgbImage) -> Result<VisionDetection> {
            Err(GradingError::ProcessingError {
                message: "model returned prose".to_string(),
            })
        }
    }

    /// Tracks the highest number of calls in flight at once
    struct Counting {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl VisionFallback for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn detect(&self, _image: &RgbImage) -> Result<VisionDetection> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(VisionDetection::not_found())
        }
    }

    fn config(timeout_ms: u64, max_concurrent: usize) -> FallbackConfig {
        FallbackConfig {
            timeout_ms,
            max_concurrent,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_passes_detection_through() {
        let gate = FallbackGate::new(&FallbackConfig::default());
        let stub = Fixed(VisionDetection {
            quadrilateral: Some(card_quad()),
            confidence: 0.8,
            quality: QualityTags {
                lighting: Some("good".to_string()),
                ..Default::default()
            },
        });
        let image = RgbImage::new(10, 10);
        let detection = gate.run(&stub, &image, &CancellationToken::new()).await.unwrap();
        assert_eq!(detection.quadrilateral, Some(card_quad()));
        assert_eq!(detection.quality.lighting.as_deref(), Some("good"));
        assert_eq!(gate.available_permits(), 5);
    }

    #[tokio::test]
    async fn test_clamps_confidence() {
        let gate = FallbackGate::new(&FallbackConfig::default());
        let stub = Fixed(VisionDetection {
            quadrilateral: Some(card_quad()),
            confidence: 3.0,
            quality: QualityTags::default(),
        });
        let detection = gate
            .run(&stub, &RgbImage::new(4, 4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(detection.confidence, 1.0);

        let nan = Fixed(VisionDetection {
            quadrilateral: Some(card_quad()),
            confidence: f64::NAN,
            quality: QualityTags::default(),
        });
        let detection = gate
            .run(&nan, &RgbImage::new(4, 4), &CancellationToken::new())
            .await
            .unwrap();
        assert!(detection.quadrilateral.is_none());
        assert_eq!(detection.confidence, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let gate = FallbackGate::new(&config(1_000, 5));
        let result = gate
            .run(&Slow(Duration::from_secs(60)), &RgbImage::new(4, 4), &CancellationToken::new())
            .await;
        match result {
            Err(GradingError::FallbackTimeout { service, timeout_ms }) => {
                assert_eq!(service, "slow");
                assert_eq!(timeout_ms, 1_000);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_service_error_is_wrapped() {
        let gate = FallbackGate::new(&FallbackConfig::default());
        let err = gate
            .run(&Failing, &RgbImage::new(4, 4), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::ExternalServiceFailure { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_call() {
        let gate = FallbackGate::new(&config(60_000, 5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result = gate
            .run(&Slow(Duration::from_secs(30)), &RgbImage::new(4, 4), &cancel)
            .await;
        assert!(matches!(result, Err(GradingError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_before_permit() {
        let gate = FallbackGate::new(&config(1_000, 1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = gate
            .run(&Fixed(VisionDetection::not_found()), &RgbImage::new(4, 4), &cancel)
            .await;
        assert!(matches!(result, Err(GradingError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_queue_beyond_limit() {
        let gate = FallbackGate::new(&config(10_000, 2));
        let stub = Arc::new(Counting {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let image = Arc::new(RgbImage::new(4, 4));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            let stub = Arc::clone(&stub);
            let image = Arc::clone(&image);
            handles.push(tokio::spawn(async move {
                gate.run(&stub, &image, &CancellationToken::new()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(stub.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refine_snaps_to_card_corners() {
        let mut gray = GrayImage::from_pixel(400, 480, Luma([40]));
        draw_filled_rect_mut(&mut gray, Rect::at(110, 95).of_size(200, 290), Luma([220]));
        // Each guess sits diagonally outside its corner
        let guess = Quadrilateral::from_points([
            Point::new(100.0, 85.0),
            Point::new(319.0, 85.0),
            Point::new(319.0, 394.0),
            Point::new(100.0, 394.0),
        ])
        .unwrap();

        let (refined, moved) = refine_corners(&gray, &guess, &FallbackConfig::default());
        assert_eq!(moved, 4);
        assert!((refined.top_left.x - 110.0).abs() <= 3.0);
        assert!((refined.top_left.y - 95.0).abs() <= 3.0);
        assert!((refined.bottom_right.x - 309.0).abs() <= 3.0);
        assert!((refined.bottom_right.y - 384.0).abs() <= 3.0);
    }

    #[test]
    fn test_refine_snaps_to_nearest_side() {
        let mut gray = GrayImage::from_pixel(400, 480, Luma([40]));
        draw_filled_rect_mut(&mut gray, Rect::at(110, 95).of_size(200, 290), Luma([220]));

        // Top-left guess is closer to the left side than to the corner
        let (refined, _) = refine_corners(&gray, &card_quad(), &FallbackConfig::default());
        assert!((refined.top_left.x - 110.0).abs() <= 2.0);
        assert!((refined.top_left.y - 100.0).abs() <= 2.0);
    }

    #[test]
    fn test_refine_without_edges_keeps_quad() {
        let gray = GrayImage::from_pixel(400, 480, Luma([128]));
        let (refined, moved) = refine_corners(&gray, &card_quad(), &FallbackConfig::default());
        assert_eq!(moved, 0);
        assert_eq!(refined, card_quad());
    }

    #[test]
    fn test_candidate_confidence_boost() {
        let mut gray = GrayImage::from_pixel(400, 480, Luma([40]));
        draw_filled_rect_mut(&mut gray, Rect::at(110, 95).of_size(200, 290), Luma([220]));
        let detection = VisionDetection {
            quadrilateral: Some(card_quad()),
            confidence: 0.8,
            quality: QualityTags::default(),
        };

        let candidate = to_candidate(&detection, Some(&gray), &FallbackConfig::default()).unwrap();
        assert_eq!(candidate.method, DetectionMethod::VisionFallback);
        assert!((candidate.confidence - 0.88).abs() < 1e-9);

        let plain = to_candidate(&detection, None, &FallbackConfig::default()).unwrap();
        assert_eq!(plain.confidence, 0.8);
        assert!(to_candidate(&VisionDetection::not_found(), Some(&gray), &FallbackConfig::default()).is_none());
    }
}
