//! Condition analyzers
//!
//! Each analyzer reads one [`RectifiedCard`] and returns its own report
//! carrying a [`SubScore`]. Analyzers share no mutable state and may run in
//! parallel.

pub mod card;
pub mod centering;
pub mod corners;
pub mod edges;
pub mod side;
pub mod surface;

pub use card::RectifiedCard;
pub use centering::{BorderWidths, CenteringAnalyzer, CenteringMethod, CenteringReport};
pub use corners::{CornerAnalyzer, CornerPosition, CornerReport, CornerScore};
pub use edges::{EdgeAnalyzer, EdgePosition, EdgeReport, EdgeScore};
pub use side::{classify_side, CardSide, SideClassification};
pub use surface::{SurfaceAnalyzer, SurfaceReport};

use crate::constants::scale::{MAX_SCORE, MIN_SCORE};
use serde::{Deserialize, Serialize};

/// Score of one analyzer on one card side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    /// Condition score in [1, 10]
    pub score: f32,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Human-readable remarks on how the score was reached
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SubScore {
    /// Clamps both values into range; NaN falls to the minimum
    pub fn new(score: f32, confidence: f32) -> Self {
        let score = if score.is_nan() { MIN_SCORE } else { score.clamp(MIN_SCORE, MAX_SCORE) };
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            score,
            confidence,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_score_clamps() {
        let s = SubScore::new(12.0, 1.5);
        assert_eq!(s.score, 10.0);
        assert_eq!(s.confidence, 1.0);

        let s = SubScore::new(-3.0, -0.1);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.confidence, 0.0);

        let s = SubScore::new(f32::NAN, f32::NAN);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_notes() {
        let s = SubScore::new(8.0, 0.9).with_note("gradient method");
        assert_eq!(s.notes, vec!["gradient method".to_string()]);
    }
}
