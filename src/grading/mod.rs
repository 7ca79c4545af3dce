//! Grade aggregation
//!
//! Turns analyzer reports into a [`GradeResult`], for one face or both.

pub mod combine;
pub mod engine;
pub mod result;

pub use combine::{combine_sides, SideAnalysis, MISSING_BACK_WARNING};
pub use engine::{grade_range, GradingEngine};
pub use result::{ConfidenceLevel, GradeResult, Penalties, SubScores};
