//! Color conversion and statistics
//!
//! This module handles per-pixel color space conversions (Lab, HSV),
//! robust statistics over pixel samples, and unsupervised clustering
//! used by colour-based card segmentation.

pub mod conversion;
pub mod planes;
pub mod stats;
pub mod cluster;

pub use conversion::{delta_e, luma, rgb_to_hsv, rgb_to_lab, to_gray, HsvSample};
pub use planes::ColorPlanes;
