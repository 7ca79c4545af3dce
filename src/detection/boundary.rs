//! Card boundary detection
//!
//! Locates the card's quadrilateral in an arbitrary photograph with an
//! ensemble of segmentation strategies:
//! - adaptive edges: CLAHE, median denoise, Canny with thresholds derived
//!   from the image's own median intensity, morphological closing
//! - colour segmentation: k-means (k=3) in Lab, largest region per cluster
//! - full frame: accept an already-cropped photo at low confidence
//!
//! Every raw contour passes a card-likeness filter (area, rotated-rectangle
//! aspect, rectangularity, solidity) and accepted ones are scored by a
//! weighted blend. Strategies run cheapest first and stop early once a
//! candidate is confident enough.

use crate::color::cluster::{KMeans, LabSample};
use crate::color::conversion::{rgb_to_lab, to_gray};
use crate::color::stats::median_u8;
use crate::config::DetectionConfig;
use crate::detection::geometry::{polygon_area, Point, Quadrilateral};
use crate::imaging::{clahe, Mask};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::median_filter;
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull, min_area_rect};
use imageproc::point::Point as ImgPoint;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument};

/// Strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    AdaptiveEdges,
    ColorSegmentation,
    FullFrame,
    VisionFallback,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionMethod::AdaptiveEdges => "adaptive_edges",
            DetectionMethod::ColorSegmentation => "color_segmentation",
            DetectionMethod::FullFrame => "full_frame",
            DetectionMethod::VisionFallback => "vision_fallback",
        };
        f.write_str(name)
    }
}

/// Shape measurements behind a candidate's confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetrics {
    /// Contour area over image area
    pub area_ratio: f64,
    /// Short over long side of the rotated bounding rectangle
    pub aspect: f64,
    pub rectangularity: f64,
    pub solidity: f64,
}

/// One card hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub quadrilateral: Quadrilateral,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub method: DetectionMethod,
    pub metrics: Option<CandidateMetrics>,
}

/// Card boundary detector implementing the strategy ensemble
pub struct BoundaryDetector {
    config: DetectionConfig,
}

impl Default for BoundaryDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl BoundaryDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect the card quadrilateral
    ///
    /// Returns `None` when no strategy found a card-like contour and the
    /// frame itself does not have card proportions. The quadrilateral is in
    /// the coordinates of `image`.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &RgbImage) -> Option<DetectionCandidate> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        // Step 1: Work on a bounded-size copy
        let (small, scale) = self.downscale(image);
        let gray = to_gray(&small);

        // Step 2: Adaptive edge strategy
        let mut best = self.adaptive_edge_strategy(&gray);
        if let Some(candidate) = &best {
            debug!(confidence = candidate.confidence, "adaptive edge candidate");
        }

        // Step 3: Colour segmentation unless already confident
        let confident = best
            .as_ref()
            .is_some_and(|c| c.confidence > self.config.early_exit_confidence);
        if !confident && self.config.color_segmentation {
            if let Some(candidate) = self.color_segmentation_strategy(&small) {
                debug!(confidence = candidate.confidence, "colour segmentation candidate");
                keep_best(&mut best, candidate);
            }
        }

        // Step 4: Pre-cropped photo fallback
        if best.is_none() {
            best = self.full_frame_candidate(small.width(), small.height());
        }

        let candidate = best.map(|mut c| {
            if scale != 1.0 {
                c.quadrilateral = c.quadrilateral.scaled(1.0 / scale);
            }
            c
        });

        match &candidate {
            Some(c) => info!(method = %c.method, confidence = c.confidence, "card boundary detected"),
            None => info!("no card boundary found"),
        }
        candidate
    }

    /// Shrink so the longer side fits `max_side`; returns the copy and its scale
    fn downscale(&self, image: &RgbImage) -> (RgbImage, f64) {
        let (width, height) = image.dimensions();
        let longer = width.max(height);
        if longer <= self.config.max_side {
            return (image.clone(), 1.0);
        }
        let scale = self.config.max_side as f64 / longer as f64;
        let new_w = ((width as f64 * scale).round() as u32).max(1);
        let new_h = ((height as f64 * scale).round() as u32).max(1);
        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
        // Use the realised ratio so corners map back exactly
        (resized, new_w as f64 / width as f64)
    }

    fn adaptive_edge_strategy(&self, gray: &GrayImage) -> Option<DetectionCandidate> {
        let cfg = &self.config;
        let enhanced = clahe(gray, cfg.clahe_clip_limit, cfg.clahe_tiles);
        let denoised = median_filter(&enhanced, cfg.denoise_radius, cfg.denoise_radius);

        let median = median_u8(denoised.pixels().map(|p| p.0[0]))? as f32;
        let low = ((1.0 - cfg.canny_sigma) * median).max(1.0);
        let high = ((1.0 + cfg.canny_sigma) * median).min(255.0).max(low + 1.0);
        let edges = canny(&denoised, low, high);

        let mut closed = Mask::from_gray(edges);
        for _ in 0..cfg.close_iterations {
            closed = closed.close(cfg.close_radius);
        }
        debug!(low, high, "adaptive canny thresholds");

        self.best_external_contour(closed.as_gray(), DetectionMethod::AdaptiveEdges)
    }

    fn color_segmentation_strategy(&self, image: &RgbImage) -> Option<DetectionCandidate> {
        let cfg = &self.config;
        let (width, height) = image.dimensions();
        let step = cfg.kmeans_sample_step.max(1);

        let lab: Vec<LabSample> = image
            .pixels()
            .map(|p| {
                let lab = rgb_to_lab(p.0[0], p.0[1], p.0[2]);
                [lab.l, lab.a, lab.b]
            })
            .collect();
        let samples: Vec<LabSample> = (0..height)
            .step_by(step as usize)
            .flat_map(|y| (0..width).step_by(step as usize).map(move |x| (x, y)))
            .map(|(x, y)| lab[(y * width + x) as usize])
            .collect();

        let model = KMeans::fit(&samples, cfg.kmeans_clusters, cfg.kmeans_iterations)?;
        let labels: Vec<usize> = lab.iter().map(|s| model.assign(s)).collect();

        let mut best = None;
        for cluster in 0..model.k() {
            let mask = Mask::from_fn(width, height, |x, y| {
                labels[(y * width + x) as usize] == cluster
            })
            .close(cfg.segmentation_morph_radius)
            .open(cfg.segmentation_morph_radius);

            let Some(region) = largest_component(mask.as_gray()) else {
                continue;
            };
            if let Some(candidate) =
                self.best_external_contour(&region, DetectionMethod::ColorSegmentation)
            {
                debug!(cluster, confidence = candidate.confidence, "cluster candidate");
                keep_best(&mut best, candidate);
            }
        }
        best
    }

    fn full_frame_candidate(&self, width: u32, height: u32) -> Option<DetectionCandidate> {
        if !self.config.full_frame_fallback {
            return None;
        }
        let aspect = width.min(height) as f64 / width.max(height) as f64;
        if aspect < self.config.min_aspect || aspect > self.config.max_aspect {
            return None;
        }
        let quadrilateral = Quadrilateral::full_frame(width, height).ok()?;
        Some(DetectionCandidate {
            quadrilateral,
            confidence: self.config.full_frame_confidence,
            method: DetectionMethod::FullFrame,
            metrics: None,
        })
    }

    /// Score every external contour of a binary image and keep the best
    fn best_external_contour(
        &self,
        binary: &GrayImage,
        method: DetectionMethod,
    ) -> Option<DetectionCandidate> {
        let image_area = binary.width() as f64 * binary.height() as f64;
        let mut best: Option<DetectionCandidate> = None;
        for contour in find_contours::<i32>(binary) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            if let Some((quadrilateral, metrics, score)) =
                self.score_contour(&contour.points, image_area)
            {
                keep_best(
                    &mut best,
                    DetectionCandidate {
                        quadrilateral,
                        confidence: score,
                        method,
                        metrics: Some(metrics),
                    },
                );
            }
        }
        best
    }

    /// Card-likeness filter and score for one contour
    ///
    /// Returns `None` when the contour fails any filter.
    pub fn score_contour(
        &self,
        contour: &[ImgPoint<i32>],
        image_area: f64,
    ) -> Option<(Quadrilateral, CandidateMetrics, f64)> {
        let cfg = &self.config;
        if contour.len() < 4 || image_area <= 0.0 {
            return None;
        }

        let points: Vec<Point> = contour.iter().map(|&p| Point::from(p)).collect();
        let area = polygon_area(&points);
        let area_ratio = area / image_area;
        if area_ratio < cfg.min_area_ratio || area_ratio > cfg.max_area_ratio {
            return None;
        }

        let rect = min_area_rect(contour);
        let side_a = Point::from(rect[0]).distance(&Point::from(rect[1]));
        let side_b = Point::from(rect[1]).distance(&Point::from(rect[2]));
        let (short, long) = (side_a.min(side_b), side_a.max(side_b));
        if short <= 0.0 {
            return None;
        }
        let aspect = short / long;
        if aspect < cfg.min_aspect || aspect > cfg.max_aspect {
            return None;
        }

        let rectangularity = (area / (short * long)).min(1.0);
        let hull = convex_hull(contour);
        let hull_points: Vec<Point> = hull.iter().map(|&p| Point::from(p)).collect();
        let hull_area = polygon_area(&hull_points);
        if hull_area <= 0.0 {
            return None;
        }
        let solidity = (area / hull_area).min(1.0);
        if rectangularity < cfg.min_rectangularity || solidity < cfg.min_solidity {
            return None;
        }

        let aspect_score = (1.0 - (aspect - cfg.ideal_aspect).abs() / cfg.ideal_aspect).max(0.0);
        let area_score = if area_ratio < cfg.preferred_area_min {
            area_ratio / cfg.preferred_area_min
        } else if area_ratio > cfg.preferred_area_max {
            let span = cfg.max_area_ratio - cfg.preferred_area_max;
            if span > 0.0 {
                ((cfg.max_area_ratio - area_ratio) / span).max(0.0)
            } else {
                0.0
            }
        } else {
            1.0
        };
        let score = (cfg.weight_aspect * aspect_score
            + cfg.weight_rectangularity * rectangularity
            + cfg.weight_solidity * solidity
            + cfg.weight_area * area_score)
            .clamp(0.0, 1.0);

        let quadrilateral = self.fit_quadrilateral(&hull, &rect)?;
        let metrics = CandidateMetrics {
            area_ratio,
            aspect,
            rectangularity,
            solidity,
        };
        Some((quadrilateral, metrics, score))
    }

    /// Four-corner polygon for an accepted contour
    ///
    /// Prefers the simplified hull when it has exactly four convex corners,
    /// otherwise the rotated bounding rectangle.
    fn fit_quadrilateral(
        &self,
        hull: &[ImgPoint<i32>],
        rect: &[ImgPoint<i32>; 4],
    ) -> Option<Quadrilateral> {
        let epsilon = self.config.poly_epsilon_fraction * arc_length(hull, true);
        let mut approx = approximate_polygon_dp(hull, epsilon, true);
        approx.dedup();
        if approx.len() > 1 && approx.first() == approx.last() {
            approx.pop();
        }
        if approx.len() == 4 {
            let corners = [
                Point::from(approx[0]),
                Point::from(approx[1]),
                Point::from(approx[2]),
                Point::from(approx[3]),
            ];
            if let Ok(quad) = Quadrilateral::from_points(corners) {
                return Some(quad);
            }
        }
        Quadrilateral::from_points(rect.map(Point::from)).ok()
    }
}

fn keep_best(best: &mut Option<DetectionCandidate>, candidate: DetectionCandidate) {
    let better = best
        .as_ref()
        .map_or(true, |current| candidate.confidence > current.confidence);
    if better {
        *best = Some(candidate);
    }
}

/// Binary image of the largest 8-connected foreground region
fn largest_component(binary: &GrayImage) -> Option<GrayImage> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut counts: Vec<usize> = Vec::new();
    for p in labels.pixels() {
        let label = p.0[0] as usize;
        if label == 0 {
            continue;
        }
        if counts.len() <= label {
            counts.resize(label + 1, 0);
        }
        counts[label] += 1;
    }
    let (largest, _) = counts
        .iter()
        .enumerate()
        .filter(|(_, &n)| n > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
    let largest = largest as u32;
    Some(GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        Luma([if labels.get_pixel(x, y).0[0] == largest { 255 } else { 0 }])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn card_on_background(card_w: u32, card_h: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(800, 800, Rgb([60, 70, 60]));
        let x0 = (800 - card_w) as i32 / 2;
        let y0 = (800 - card_h) as i32 / 2;
        draw_filled_rect_mut(&mut image, Rect::at(x0, y0).of_size(card_w, card_h), Rgb([255, 215, 0]));
        draw_filled_rect_mut(
            &mut image,
            Rect::at(x0 + 8, y0 + 8).of_size(card_w - 16, card_h - 16),
            Rgb([30, 60, 200]),
        );
        image
    }

    fn rectangle_contour(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<ImgPoint<i32>> {
        let mut pts = Vec::new();
        for x in x0..x1 {
            pts.push(ImgPoint::new(x, y0));
        }
        for y in y0..y1 {
            pts.push(ImgPoint::new(x1, y));
        }
        for x in (x0 + 1..=x1).rev() {
            pts.push(ImgPoint::new(x, y1));
        }
        for y in (y0 + 1..=y1).rev() {
            pts.push(ImgPoint::new(x0, y));
        }
        pts
    }

    #[test]
    fn test_scores_card_shaped_contour() {
        let detector = BoundaryDetector::default();
        let contour = rectangle_contour(100, 100, 450, 590);
        let (quad, metrics, score) = detector.score_contour(&contour, 800.0 * 800.0).unwrap();
        assert!((metrics.aspect - 350.0 / 490.0).abs() < 0.01);
        assert!(metrics.rectangularity > 0.98);
        assert!(metrics.solidity > 0.98);
        assert!(score > 0.9);
        assert!((quad.top_left.x - 100.0).abs() < 1.5);
        assert!((quad.bottom_right.y - 590.0).abs() < 1.5);
    }

    #[test]
    fn test_rejects_square_contour() {
        let detector = BoundaryDetector::default();
        let contour = rectangle_contour(100, 100, 600, 600);
        assert!(detector.score_contour(&contour, 800.0 * 800.0).is_none());
    }

    #[test]
    fn test_rejects_small_contour() {
        let detector = BoundaryDetector::default();
        let contour = rectangle_contour(0, 0, 70, 98);
        assert!(detector.score_contour(&contour, 800.0 * 800.0).is_none());
    }

    #[test]
    fn test_detects_card_on_plain_background() {
        let image = card_on_background(350, 490);
        let candidate = BoundaryDetector::default().detect(&image).unwrap();
        assert!(candidate.confidence > 0.85, "confidence {}", candidate.confidence);
        assert_ne!(candidate.method, DetectionMethod::FullFrame);

        let quad = candidate.quadrilateral;
        assert!((quad.top_left.x - 225.0).abs() < 6.0);
        assert!((quad.top_left.y - 155.0).abs() < 6.0);
        assert!((quad.bottom_right.x - 575.0).abs() < 6.0);
        assert!((quad.bottom_right.y - 645.0).abs() < 6.0);
    }

    #[test]
    fn test_circle_is_not_a_card() {
        let mut image = RgbImage::from_pixel(800, 800, Rgb([60, 70, 60]));
        draw_filled_circle_mut(&mut image, (400, 400), 250, Rgb([240, 240, 240]));
        match BoundaryDetector::default().detect(&image) {
            None => {}
            Some(candidate) => assert!(candidate.confidence < 0.5),
        }
    }

    #[test]
    fn test_full_frame_fallback_for_cropped_card() {
        // Uniform card-shaped frame: no contour to find
        let image = RgbImage::from_pixel(500, 700, Rgb([200, 30, 30]));
        let candidate = BoundaryDetector::default().detect(&image).unwrap();
        assert_eq!(candidate.method, DetectionMethod::FullFrame);
        assert!((candidate.confidence - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_square_frame_without_card_is_not_found() {
        let image = RgbImage::from_pixel(400, 400, Rgb([90, 90, 90]));
        assert!(BoundaryDetector::default().detect(&image).is_none());
    }

    #[test]
    fn test_downscaled_detection_maps_back() {
        let mut image = RgbImage::from_pixel(2000, 2000, Rgb([60, 70, 60]));
        draw_filled_rect_mut(&mut image, Rect::at(550, 300).of_size(900, 1260), Rgb([255, 215, 0]));
        let candidate = BoundaryDetector::default().detect(&image).unwrap();
        let quad = candidate.quadrilateral;
        assert!((quad.top_left.x - 550.0).abs() < 12.0);
        assert!((quad.bottom_right.y - 1560.0).abs() < 12.0);
    }

    #[test]
    fn test_largest_component() {
        let mut binary = GrayImage::new(20, 20);
        for y in 0..3 {
            for x in 0..3 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 10..15 {
            for x in 10..15 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        let region = largest_component(&binary).unwrap();
        assert_eq!(region.get_pixel(12, 12).0[0], 255);
        assert_eq!(region.get_pixel(1, 1).0[0], 0);
    }
}
