//! Integration tests for the synchronous grading pipeline
//!
//! These tests run whole photos through detection, rectification, the four
//! analyzers and grade aggregation. Photos are synthetic: a yellow-bordered
//! blue card on a dark green table, drawn at a known position.

use card_grader::grading::MISSING_BACK_WARNING;
use card_grader::pipeline::NOT_DETECTED_WARNING;
use card_grader::{
    grade_card, CardGrader, DetectionMetrics, GradingConfig, GradingError, RectifiedCard,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;

const CARD_X: i32 = 225;
const CARD_Y: i32 = 155;
const CARD_W: u32 = 350;
const CARD_H: u32 = 490;

fn card_photo() -> RgbImage {
    let mut image = RgbImage::from_pixel(800, 800, Rgb([60, 70, 60]));
    draw_filled_rect_mut(
        &mut image,
        Rect::at(CARD_X, CARD_Y).of_size(CARD_W, CARD_H),
        Rgb([255, 215, 0]),
    );
    draw_filled_rect_mut(
        &mut image,
        Rect::at(CARD_X + 8, CARD_Y + 8).of_size(CARD_W - 16, CARD_H - 16),
        Rgb([30, 60, 200]),
    );
    image
}

fn flooded_corner_photo() -> RgbImage {
    let mut image = card_photo();
    draw_filled_rect_mut(&mut image, Rect::at(CARD_X, CARD_Y).of_size(18, 18), Rgb([255, 255, 255]));
    image
}

fn grader() -> CardGrader {
    CardGrader::new(GradingConfig::default()).unwrap()
}

// ============================================================================
// End-to-end grading
// ============================================================================

#[test]
fn test_clean_card_grades_high() {
    let report = grader().grade_image(&card_photo(), None).unwrap();

    assert!(report.front.detection.method.is_some());
    assert!(report.front.detection.confidence > 0.85);
    assert!(!report.front.detection.fallback_attempted);
    assert!(report.grade.final_score >= 8.0, "{}", report.grade.summary());
    assert!(report.grade.warnings.iter().any(|w| w == MISSING_BACK_WARNING));
    assert!(!report.grade.warnings.iter().any(|w| w == NOT_DETECTED_WARNING));
}

#[test]
fn test_whitened_corner_lowers_grade() {
    let grader = grader();
    let clean = grader.grade_image(&card_photo(), None).unwrap();
    let flooded = grader.grade_image(&flooded_corner_photo(), None).unwrap();

    assert!(
        flooded.grade.sub_scores.corners.score < clean.grade.sub_scores.corners.score,
        "clean {} flooded {}",
        clean.grade.sub_scores.corners.score,
        flooded.grade.sub_scores.corners.score
    );
    assert!(flooded.grade.final_score < clean.grade.final_score);
    assert!(flooded.grade.penalties.corner > 0.0);
}

#[test]
fn test_flooded_rectified_corner_drops_two_brackets() {
    let grader = grader();
    let rectification = &grader.config().rectification;
    let mut image = RgbImage::from_pixel(500, 700, Rgb([255, 215, 0]));
    draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(480, 680), Rgb([30, 60, 200]));
    let clean = RectifiedCard::new(image.clone(), rectification).unwrap();
    draw_filled_rect_mut(&mut image, Rect::at(0, 0).of_size(25, 25), Rgb([255, 255, 255]));
    let flooded = RectifiedCard::new(image, rectification).unwrap();

    let clean_grade = grader.grade_rectified(&clean, None);
    let flooded_grade = grader.grade_rectified(&flooded, None);
    assert_eq!(clean_grade.grade_label, "10");
    let drop = clean_grade.grade_label.parse::<i32>().unwrap()
        - flooded_grade.grade_label.parse::<i32>().unwrap();
    assert!(drop >= 2, "{} -> {}", clean_grade.grade_label, flooded_grade.grade_label);

    let (analysis, _) = grader.analyze_side(&flooded);
    assert!(analysis.corners.sub_score.score < analysis.corners.average);
}

#[test]
fn test_grading_is_deterministic() {
    let grader = grader();
    let photo = flooded_corner_photo();
    let first = grader.grade_image(&photo, None).unwrap();
    let second = grader.grade_image(&photo, None).unwrap();
    assert_eq!(first.grade, second.grade);
}

#[test]
fn test_back_replaces_missing_back_warning() {
    let photo = card_photo();
    let report = grader().grade_image(&photo, Some(&photo)).unwrap();
    assert!(report.back.is_some());
    assert!(!report.grade.warnings.iter().any(|w| w == MISSING_BACK_WARNING));
}

#[test]
fn test_damaged_back_pulls_grade_down() {
    let grader = grader();
    let clean = grader.grade_image(&card_photo(), Some(&card_photo())).unwrap();
    let damaged = grader
        .grade_image(&card_photo(), Some(&flooded_corner_photo()))
        .unwrap();
    assert!(damaged.grade.sub_scores.corners.score < clean.grade.sub_scores.corners.score);
    // Centering comes from the front only
    assert_eq!(
        damaged.grade.sub_scores.centering.score,
        clean.grade.sub_scores.centering.score
    );
}

#[test]
fn test_undetectable_card_is_graded_conservatively() {
    let photo = RgbImage::from_pixel(600, 600, Rgb([120, 120, 120]));
    let report = grader().grade_image(&photo, None).unwrap();

    assert!(report.front.detection.method.is_none());
    assert!(report.grade.warnings.iter().any(|w| w == NOT_DETECTED_WARNING));
    assert!((report.grade.overall_confidence - 0.3).abs() < 1e-6);
    assert!(report.grade.final_score <= 7.0);
}

#[test]
fn test_metrics_collect_across_requests() {
    let metrics = Arc::new(DetectionMetrics::new());
    let grader = grader().with_metrics(Arc::clone(&metrics));
    grader.grade_image(&card_photo(), None).unwrap();
    grader
        .grade_image(&RgbImage::from_pixel(600, 600, Rgb([120, 120, 120])), None)
        .unwrap();

    let stats = metrics.snapshot();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.classical_successes, 1);
    assert_eq!(stats.failures, 1);
    assert!((stats.success_rate - 0.5).abs() < 1e-9);
}

// ============================================================================
// File entry point
// ============================================================================

#[test]
fn test_grade_card_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let front = dir.path().join("front.png");
    let back = dir.path().join("back.png");
    card_photo().save(&front).unwrap();
    flooded_corner_photo().save(&back).unwrap();

    let report = grade_card(&front, Some(&back), GradingConfig::default()).unwrap();
    assert!(report.front.detection.method.is_some());
    assert!(report.back.as_ref().unwrap().detection.method.is_some());
    assert!((1.0..=10.0).contains(&report.grade.final_score));
}

#[test]
fn test_grade_card_missing_file() {
    let err = grade_card(Path::new("nonexistent_card.jpg"), None, GradingConfig::default())
        .unwrap_err();
    assert!(matches!(err, GradingError::ImageLoadError { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn test_grade_card_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let front = dir.path().join("front.png");
    card_photo().save(&front).unwrap();

    let mut config = GradingConfig::default();
    config.scoring.weights.surface = 2.0;
    assert!(grade_card(&front, None, config).is_err());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.json");
    let config = GradingConfig::default();
    config.to_json_file(&path).unwrap();

    let loaded = GradingConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_config_is_a_config_error() {
    let err = GradingConfig::from_json_str("{ \"scoring\": 3 }").unwrap_err();
    assert!(matches!(err, GradingError::ConfigError { .. }));
}
