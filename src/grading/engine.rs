//! Weighted grade aggregation
//!
//! The engine is a pure function of the four analyzer reports: a weighted sum,
//! additive damage penalties, a clamp, and a bracket lookup. Confidence is the
//! same weighted blend over the sub-score confidences.

use crate::analysis::{CenteringReport, CornerReport, EdgeReport, SubScore, SurfaceReport};
use crate::config::ScoringConfig;
use crate::constants::scale::{MAX_SCORE, MIN_SCORE};
use crate::grading::result::{ConfidenceLevel, GradeResult, Penalties, SubScores};
use tracing::{debug, info};

pub struct GradingEngine {
    config: ScoringConfig,
}

impl Default for GradingEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl GradingEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Combine the four analyzer reports into a grade
    pub fn calculate_grade(
        &self,
        centering: &CenteringReport,
        corners: &CornerReport,
        edges: &EdgeReport,
        surface: &SurfaceReport,
    ) -> GradeResult {
        let cfg = &self.config;
        let w = &cfg.weights;
        let sub_scores = SubScores {
            centering: centering.sub_score.clone(),
            corners: corners.sub_score.clone(),
            edges: edges.sub_score.clone(),
            surface: surface.sub_score.clone(),
        };

        let weighted_score = sub_scores.centering.score * w.centering
            + sub_scores.corners.score * w.corners
            + sub_scores.edges.score * w.edges
            + sub_scores.surface.score * w.surface;

        let penalties = Penalties {
            corner: self.corner_penalty(corners.worst_corner()),
            edge: self.edge_penalty(&edges.edge_scores()),
            surface: self.surface_penalty(surface.major_damage, sub_scores.surface.score),
        };

        let final_score = round_tenth((weighted_score - penalties.total()).clamp(MIN_SCORE, MAX_SCORE));
        let grade_label = self.label_for(final_score);

        let overall_confidence = (sub_scores.centering.confidence * w.centering
            + sub_scores.corners.confidence * w.corners
            + sub_scores.edges.confidence * w.edges
            + sub_scores.surface.confidence * w.surface)
            .clamp(0.0, 1.0);
        let confidence_level = self.confidence_level(overall_confidence);
        let grade_range = grade_range(&grade_label, confidence_level);

        debug!(
            weighted_score,
            corner_penalty = penalties.corner,
            edge_penalty = penalties.edge,
            surface_penalty = penalties.surface,
            "penalties applied"
        );
        info!(final_score, grade = %grade_label, confidence = overall_confidence, "grade calculated");

        let explanations = self.explanations(&sub_scores, overall_confidence);
        let recommendations = self.recommendations(&sub_scores, overall_confidence);

        GradeResult {
            final_score,
            grade_label,
            grade_range,
            sub_scores,
            weighted_score,
            penalties,
            overall_confidence,
            confidence_level,
            explanations,
            recommendations,
            warnings: Vec::new(),
        }
    }

    /// First bracket at or below the score, highest first
    pub fn label_for(&self, score: f32) -> String {
        self.config
            .brackets
            .iter()
            .find(|b| score >= b.min_score)
            .or_else(|| self.config.brackets.last())
            .map_or_else(|| "0".to_string(), |b| b.label.clone())
    }

    pub fn confidence_level(&self, confidence: f32) -> ConfidenceLevel {
        if confidence >= self.config.high_confidence {
            ConfidenceLevel::High
        } else if confidence >= self.config.medium_confidence {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    fn corner_penalty(&self, worst_corner: f32) -> f32 {
        self.config
            .corner_penalties
            .iter()
            .find(|band| worst_corner <= band.at_most)
            .map_or(0.0, |band| band.penalty)
    }

    fn edge_penalty(&self, edge_scores: &[f32]) -> f32 {
        let worn = edge_scores
            .iter()
            .filter(|&&s| s < self.config.edge_wear_threshold)
            .count();
        self.config
            .edge_penalties
            .iter()
            .find(|p| worn >= p.count)
            .map_or(0.0, |p| p.penalty)
    }

    fn surface_penalty(&self, major_damage: bool, surface_score: f32) -> f32 {
        if major_damage {
            self.config.major_damage_penalty
        } else if surface_score < self.config.mild_surface_below {
            self.config.mild_surface_penalty
        } else {
            0.0
        }
    }

    fn explanations(&self, s: &SubScores, confidence: f32) -> Vec<String> {
        let t = &self.config.tiers;
        let mut out = Vec::with_capacity(5);

        out.push(
            if s.centering.score >= t.excellent {
                "Excellent centering"
            } else if s.centering.score >= t.centering_acceptable {
                "Slightly off-center"
            } else {
                "Poor centering - major grade impact"
            }
            .to_string(),
        );
        out.push(
            if s.corners.score >= t.excellent {
                "Sharp corners"
            } else if s.corners.score >= t.good {
                "Minor corner wear detected"
            } else {
                "Significant corner damage"
            }
            .to_string(),
        );
        out.push(
            if s.edges.score >= t.excellent {
                "Clean edges"
            } else if s.edges.score >= t.good {
                "Minor edge wear"
            } else {
                "Multiple edges show wear"
            }
            .to_string(),
        );
        out.push(
            if s.surface.score >= t.excellent {
                "Pristine surface"
            } else if s.surface.score >= t.good {
                "Minor surface imperfections"
            } else if s.surface.score >= t.fair {
                "Visible scratches detected"
            } else {
                "Major surface damage (creases/dents)"
            }
            .to_string(),
        );

        if confidence < self.config.low_confidence_warning {
            out.push("Low confidence - consider retaking photo with better lighting".to_string());
        }
        out
    }

    fn recommendations(&self, s: &SubScores, confidence: f32) -> Vec<String> {
        let threshold = self.config.recommendation_confidence;
        if confidence >= threshold {
            return Vec::new();
        }
        let low = |sub: &SubScore| sub.confidence < threshold;
        let mut out = Vec::new();
        if low(&s.centering) {
            out.push("Improve lighting to better detect card borders".to_string());
        }
        if low(&s.corners) {
            out.push("Ensure all four corners are clearly visible".to_string());
        }
        if low(&s.edges) {
            out.push("Make sure card edges are in focus".to_string());
        }
        if low(&s.surface) {
            out.push("Reduce glare by adjusting lighting angle".to_string());
        }
        out
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Label range widening as confidence drops
///
/// High confidence gives the label and the one below it; medium widens to one
/// bracket each way and low to two. Labels that are not integers are returned
/// unchanged.
pub fn grade_range(label: &str, level: ConfidenceLevel) -> String {
    let Ok(grade) = label.parse::<i32>() else {
        return label.to_string();
    };
    let (min, max) = (MIN_SCORE as i32, MAX_SCORE as i32);
    let (low, high) = match level {
        ConfidenceLevel::High => (grade - 1, grade),
        ConfidenceLevel::Medium => (grade - 1, grade + 1),
        ConfidenceLevel::Low => (grade - 2, grade + 2),
    };
    let low = low.max(min);
    let high = high.min(max).max(low);
    if low == high {
        low.to_string()
    } else {
        format!("{}-{}", low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        CenteringMethod, CornerAnalyzer, CornerPosition, CornerScore, EdgePosition, EdgeScore,
    };

    fn centering(score: f32, confidence: f32) -> CenteringReport {
        let mut report = CenteringReport::conservative(score, confidence, "test");
        report.method = CenteringMethod::Gradient;
        report
    }

    fn corners(scores: [f32; 4]) -> CornerReport {
        let corners = CornerPosition::ALL
            .iter()
            .zip(scores)
            .map(|(&position, score)| CornerScore {
                position,
                score,
                whitened_percent: 0.0,
                coverage: 1.0,
                confidence: 0.9,
                skipped: false,
            })
            .collect();
        CornerAnalyzer::default().aggregate(corners)
    }

    fn edges(scores: [f32; 4], overall: f32) -> EdgeReport {
        let mut report = EdgeReport::conservative(overall, 0.85, "test");
        report.edges = EdgePosition::ALL
            .iter()
            .zip(scores)
            .map(|(&position, score)| EdgeScore {
                position,
                score,
                whitened_percent: 0.0,
                inspected_pixels: 100,
                worn: score < 8.0,
            })
            .collect();
        report
    }

    fn surface(score: f32, major_damage: bool) -> SurfaceReport {
        let mut report = SurfaceReport::conservative(score, 0.95, "test");
        report.major_damage = major_damage;
        report
    }

    #[test]
    fn test_pristine_card_grades_ten() {
        let engine = GradingEngine::default();
        let result = engine.calculate_grade(
            &centering(10.0, 0.9),
            &corners([10.0; 4]),
            &edges([10.0; 4], 10.0),
            &surface(10.0, false),
        );
        assert_eq!(result.final_score, 10.0);
        assert_eq!(result.grade_label, "10");
        assert_eq!(result.penalties.total(), 0.0);
        assert_eq!(result.confidence_level, ConfidenceLevel::High);
        assert_eq!(result.grade_range, "9-10");
        assert!(result.recommendations.is_empty());
        assert_eq!(result.explanations[0], "Excellent centering");
    }

    #[test]
    fn test_flooded_corner_drops_brackets() {
        let engine = GradingEngine::default();
        let corner_report = corners([3.0, 10.0, 10.0, 10.0]);
        assert!((corner_report.sub_score.score - 6.75).abs() < 1e-4);

        let result = engine.calculate_grade(
            &centering(10.0, 0.9),
            &corner_report,
            &edges([4.0, 10.0, 10.0, 7.0], 4.0),
            &surface(10.0, false),
        );
        // 0.2·10 + 0.3·6.75 + 0.3·4 + 0.2·10 = 7.225, minus the severe corner penalty
        assert!((result.weighted_score - 7.225).abs() < 1e-4);
        assert_eq!(result.penalties.corner, 2.0);
        assert_eq!(result.penalties.edge, 0.0);
        assert!((result.final_score - 5.2).abs() < 1e-4);
        assert_eq!(result.grade_label, "5");
    }

    #[test]
    fn test_penalties_are_additive() {
        let engine = GradingEngine::default();
        let result = engine.calculate_grade(
            &centering(9.0, 0.9),
            &corners([6.0, 9.0, 9.0, 9.0]),
            &edges([6.0, 6.0, 6.5, 9.0], 6.0),
            &surface(7.0, true),
        );
        assert_eq!(result.penalties.corner, 1.0);
        assert_eq!(result.penalties.edge, 1.0);
        assert_eq!(result.penalties.surface, 2.0);
        assert_eq!(result.penalties.total(), 4.0);
        let expected = round_tenth(result.weighted_score - 4.0);
        assert!((result.final_score - expected).abs() < 1e-4);
    }

    #[test]
    fn test_mild_surface_penalty() {
        let engine = GradingEngine::default();
        assert_eq!(engine.surface_penalty(false, 6.5), 0.5);
        assert_eq!(engine.surface_penalty(false, 7.0), 0.0);
        assert_eq!(engine.surface_penalty(true, 9.0), 2.0);
    }

    #[test]
    fn test_edge_penalty_by_count() {
        let engine = GradingEngine::default();
        assert_eq!(engine.edge_penalty(&[6.0; 4]), 1.5);
        assert_eq!(engine.edge_penalty(&[6.0, 6.0, 6.0, 9.0]), 1.0);
        assert_eq!(engine.edge_penalty(&[6.0, 6.0, 9.0, 9.0]), 0.5);
        assert_eq!(engine.edge_penalty(&[6.0, 9.0, 9.0, 9.0]), 0.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let engine = GradingEngine::default();
        let result = engine.calculate_grade(
            &centering(1.0, 0.2),
            &corners([1.0; 4]),
            &edges([1.0; 4], 1.0),
            &surface(1.0, true),
        );
        assert_eq!(result.final_score, 1.0);
        assert_eq!(result.grade_label, "1");
        assert_eq!(result.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(result.grade_range, "1-2");
    }

    #[test]
    fn test_low_confidence_recommendations() {
        let engine = GradingEngine::default();
        let result = engine.calculate_grade(
            &centering(7.0, 0.3),
            &corners([9.0; 4]),
            &edges([9.0; 4], 9.0),
            &surface(7.0, false),
        );
        // 0.2·0.3 + 0.3·0.9 + 0.3·0.85 + 0.2·0.95
        assert!((result.overall_confidence - 0.775).abs() < 1e-4);
        assert_eq!(result.confidence_level, ConfidenceLevel::Medium);
        assert!(result.recommendations.is_empty());

        let result = engine.calculate_grade(
            &centering(7.0, 0.3),
            &CornerReport::conservative(7.0, 0.3, "test"),
            &EdgeReport::conservative(7.0, 0.3, "test"),
            &SurfaceReport::conservative(7.0, 0.3, "test"),
        );
        assert_eq!(result.confidence_level, ConfidenceLevel::Low);
        assert_eq!(result.recommendations.len(), 4);
        assert!(result
            .explanations
            .iter()
            .any(|e| e.starts_with("Low confidence")));
    }

    #[test]
    fn test_brackets() {
        let engine = GradingEngine::default();
        assert_eq!(engine.label_for(9.5), "10");
        assert_eq!(engine.label_for(9.49), "9");
        assert_eq!(engine.label_for(8.0), "8");
        assert_eq!(engine.label_for(1.0), "1");
    }

    #[test]
    fn test_grade_range() {
        assert_eq!(grade_range("10", ConfidenceLevel::High), "9-10");
        assert_eq!(grade_range("1", ConfidenceLevel::High), "1");
        assert_eq!(grade_range("7", ConfidenceLevel::Medium), "6-8");
        assert_eq!(grade_range("10", ConfidenceLevel::Medium), "9-10");
        assert_eq!(grade_range("5", ConfidenceLevel::Low), "3-7");
        assert_eq!(grade_range("2", ConfidenceLevel::Low), "1-4");
        assert_eq!(grade_range("A", ConfidenceLevel::Low), "A");
    }

    #[test]
    fn test_deterministic() {
        let engine = GradingEngine::default();
        let run = || {
            engine.calculate_grade(
                &centering(8.3, 0.7),
                &corners([8.0, 9.5, 7.2, 9.0]),
                &edges([8.5, 9.0, 9.5, 7.0], 7.0),
                &surface(9.0, false),
            )
        };
        assert_eq!(run(), run());
    }
}
