//! Physical and processing constants for card grading
//!
//! Tunable thresholds live in [`crate::config`]; this module only holds values
//! that follow from the physical card format or from processing limits.

/// Standard trading card geometry
pub mod card {
    /// Card width in millimetres (63 × 88 mm poker size)
    pub const WIDTH_MM: f64 = 63.0;

    /// Card height in millimetres
    pub const HEIGHT_MM: f64 = 88.0;

    /// Short side over long side (~0.714)
    pub const ASPECT_RATIO: f64 = WIDTH_MM / HEIGHT_MM;
}

/// Canonical rectified card frame
pub mod canonical {
    /// Rectified width in pixels
    pub const WIDTH: u32 = 500;

    /// Rectified height in pixels
    pub const HEIGHT: u32 = 700;
}

/// Performance targets and limits
pub mod performance {
    /// Longer side limit for boundary detection; larger photos are downscaled first
    pub const DETECTION_MAX_SIDE: u32 = 1200;

    /// Maximum image size accepted without downscaling before any processing
    pub const MAX_PROCESSING_PIXELS: u32 = 40_000_000; // 40MP

    /// Downscale target for oversize inputs
    pub const DOWNSCALE_TARGET_PIXELS: u32 = 16_000_000; // 16MP
}

/// Score scale
pub mod scale {
    pub const MIN_SCORE: f32 = 1.0;
    pub const MAX_SCORE: f32 = 10.0;
}
