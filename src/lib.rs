//! # Card Grader
//!
//! A Rust crate for estimating the condition grade of trading cards from
//! ordinary photographs.
//!
//! This library grades a card by:
//! - Detecting the card boundary and rectifying it to a canonical frame
//! - Measuring centering, corner whitening, edge wear and surface damage
//! - Combining the four sub-scores with damage penalties into a 1-10 grade
//!   with an honest confidence
//!
//! ## Example
//!
//! ```rust,no_run
//! use card_grader::{grade_card, GradingConfig};
//! use std::path::Path;
//!
//! let report = grade_card(
//!     Path::new("front.jpg"),
//!     Some(Path::new("back.jpg")),
//!     GradingConfig::default(),
//! )?;
//! println!("{}", report.grade.summary());
//! # Ok::<(), card_grader::GradingError>(())
//! ```

use std::path::Path;

pub mod error;
pub mod constants;
pub mod config;
pub mod image_loader;
pub mod exif;
pub mod color;
pub mod imaging;
pub mod detection;
pub mod analysis;
pub mod grading;
pub mod quality;
pub mod metrics;
pub mod pipeline;

pub use analysis::{
    CenteringReport, CornerReport, EdgeReport, RectifiedCard, SubScore, SurfaceReport,
};
pub use config::GradingConfig;
pub use detection::{
    DetectionCandidate, DetectionMethod, FallbackGate, Quadrilateral, QualityTags, VisionDetection,
    VisionFallback,
};
pub use error::{GradingError, Result};
pub use grading::{ConfidenceLevel, GradeResult, GradingEngine};
pub use metrics::{DetectionMetrics, DetectionStats};
pub use pipeline::{CardGrader, GradeReport, HybridGrader, SideReport};
pub use quality::{assess_quality, QualityReport};

/// Grade a card from photos on disk
///
/// This is the synchronous entry point: classical detection only, no vision
/// fallback. Photos are turned upright using their EXIF orientation.
///
/// # Arguments
///
/// * `front` - Path to the photo of the card front
/// * `back` - Optional path to the photo of the card back
/// * `config` - Calibration to grade with
///
/// # Errors
///
/// Returns `GradingError` if:
/// - The configuration fails validation
/// - A photo cannot be loaded or decoded
///
/// A card that cannot be located still gets a conservative grade.
pub fn grade_card(front: &Path, back: Option<&Path>, config: GradingConfig) -> Result<GradeReport> {
    let grader = CardGrader::new(config)?;
    let front = image_loader::load_image_oriented(front)?;
    let back = back.map(image_loader::load_image_oriented).transpose()?;
    grader.grade_image(&front, back.as_ref())
}
