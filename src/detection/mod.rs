//! Card localisation module
//!
//! This module finds the card in an arbitrary photograph and maps it onto
//! the canonical upright frame consumed by the analyzers.

pub mod boundary;
pub mod fallback;
pub mod geometry;
pub mod rectify;

pub use boundary::{BoundaryDetector, CandidateMetrics, DetectionCandidate, DetectionMethod};
pub use fallback::{FallbackGate, QualityTags, VisionDetection, VisionFallback};
pub use geometry::{Point, Quadrilateral};
pub use rectify::PerspectiveRectifier;
