//! Front and back combination
//!
//! Centering is a property of the printed front. Physical wear shows on both
//! faces, so corners pool every measured corner while edges and surface take
//! the worse face.

use crate::analysis::{CenteringReport, CornerAnalyzer, CornerReport, EdgeReport, SurfaceReport};
use crate::grading::engine::GradingEngine;
use crate::grading::result::GradeResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MISSING_BACK_WARNING: &str = "Back not provided - single-side analysis";

/// The four analyzer reports of one card face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideAnalysis {
    pub centering: CenteringReport,
    pub corners: CornerReport,
    pub edges: EdgeReport,
    pub surface: SurfaceReport,
}

impl SideAnalysis {
    /// Every analyzer at its conservative default
    pub fn conservative(score: f32, confidence: f32, reason: &str) -> Self {
        Self {
            centering: CenteringReport::conservative(score, confidence, reason),
            corners: CornerReport::conservative(score, confidence, reason),
            edges: EdgeReport::conservative(score, confidence, reason),
            surface: SurfaceReport::conservative(score, confidence, reason),
        }
    }
}

/// Grade a card from its front and, when available, its back
pub fn combine_sides(
    engine: &GradingEngine,
    corner_analyzer: &CornerAnalyzer,
    front: &SideAnalysis,
    back: Option<&SideAnalysis>,
) -> GradeResult {
    let Some(back) = back else {
        let mut result = engine.calculate_grade(&front.centering, &front.corners, &front.edges, &front.surface);
        result.add_warning(MISSING_BACK_WARNING);
        return result;
    };

    let corners = pool_corners(corner_analyzer, &front.corners, &back.corners);
    let edges = if back.edges.sub_score.score < front.edges.sub_score.score {
        &back.edges
    } else {
        &front.edges
    };

    let mut surface = if back.surface.sub_score.score < front.surface.sub_score.score {
        back.surface.clone()
    } else {
        front.surface.clone()
    };
    surface.major_damage = front.surface.major_damage || back.surface.major_damage;

    debug!(
        corners = corners.sub_score.score,
        edges = edges.sub_score.score,
        surface = surface.sub_score.score,
        "sides combined"
    );
    engine.calculate_grade(&front.centering, &corners, edges, &surface)
}

/// Aggregate all measured corners of both faces
///
/// When either face has no measured corners the lower aggregate wins.
fn pool_corners(analyzer: &CornerAnalyzer, front: &CornerReport, back: &CornerReport) -> CornerReport {
    if front.corners.is_empty() || back.corners.is_empty() {
        return if back.sub_score.score < front.sub_score.score {
            back.clone()
        } else {
            front.clone()
        };
    }
    let all = front.corners.iter().chain(&back.corners).copied().collect();
    analyzer.aggregate(all)
}
