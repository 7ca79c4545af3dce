//! Grade result types

use crate::analysis::SubScore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative band of the overall confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        };
        f.write_str(name)
    }
}

/// The four sub-scores a grade is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub centering: SubScore,
    pub corners: SubScore,
    pub edges: SubScore,
    pub surface: SubScore,
}

/// Penalties subtracted from the weighted score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Penalties {
    /// Worst-corner penalty
    pub corner: f32,
    /// Worn-edge-count penalty
    pub edge: f32,
    /// Major damage or mild surface penalty
    pub surface: f32,
}

impl Penalties {
    pub fn total(&self) -> f32 {
        self.corner + self.edge + self.surface
    }
}

/// Final grade of one card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Clamped to [1, 10], one decimal
    pub final_score: f32,
    /// Discrete grade, e.g. "9"
    pub grade_label: String,
    /// Plausible label range, e.g. "8-9"
    pub grade_range: String,
    pub sub_scores: SubScores,
    /// Weighted sum before penalties
    pub weighted_score: f32,
    pub penalties: Penalties,
    pub overall_confidence: f32,
    pub confidence_level: ConfidenceLevel,
    pub explanations: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GradeResult {
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Final score as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "Grade {} ({:.1}, range {}, {} confidence)",
            self.grade_label, self.final_score, self.grade_range, self.confidence_level
        )
    }
}
