//! EXIF metadata
//!
//! Orientation correction applied when photos are loaded.

pub mod extractor;

pub use extractor::{ExifExtractor, Orientation};
