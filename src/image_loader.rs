//! Unified image loading
//!
//! Decodes card photos into 8-bit RGB pixel grids.
//!
//! ## Supported Formats
//!
//! Standard formats (via `image` crate):
//! - JPEG, PNG, GIF (first frame), WebP, TIFF, BMP
//!
//! Apple formats (via `libheif-rs`, `heic` feature):
//! - HEIC, HEIF
//!
//! EXIF orientation is applied only by [`load_image_oriented`]; [`load_image`]
//! returns the stored pixel grid.

use crate::error::{GradingError, Result};
use crate::exif::{ExifExtractor, Orientation};
use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, instrument};

/// Container formats the loader can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Decoded by the `image` crate
    Standard(image::ImageFormat),
    /// HEIC/HEIF (Apple)
    Heic,
}

impl SourceFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<SourceFormat> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "heic" | "heif" => Some(SourceFormat::Heic),
            _ if is_supported_extension(&ext) => {
                image::ImageFormat::from_extension(&ext).map(SourceFormat::Standard)
            }
            _ => None,
        }
    }

    /// Check if format requires libheif
    pub fn requires_heif(&self) -> bool {
        matches!(self, SourceFormat::Heic)
    }
}

/// Load an image from disk as 8-bit RGB
///
/// # Errors
///
/// Returns `GradingError::ImageLoadError` if the extension is unknown, the
/// file cannot be opened or decoded, or the image has a zero dimension.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let format = SourceFormat::from_extension(path).ok_or_else(|| GradingError::ImageLoadError {
        message: format!("Unknown image format for file: {}", path.display()),
        source: None,
    })?;

    let image = match format {
        SourceFormat::Heic => load_heic(path)?,
        SourceFormat::Standard(format) => load_standard(path, format)?,
    };
    ensure_non_empty(&image)?;
    debug!(width = image.width(), height = image.height(), "image loaded");
    Ok(image)
}

/// Load an image and turn it upright according to its EXIF orientation
pub fn load_image_oriented(path: &Path) -> Result<RgbImage> {
    let image = load_image(path)?;
    let orientation = match ExifExtractor::read_orientation(path) {
        Ok(orientation) => orientation,
        Err(e) => {
            debug!(error = %e, "orientation unavailable, keeping stored grid");
            Orientation::Normal
        }
    };
    debug!(?orientation, "applying EXIF orientation");
    Ok(orientation.apply(image))
}

/// Decode an in-memory image, sniffing its format, and apply its orientation
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<RgbImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| GradingError::image_load("Failed to read image buffer", e))?;
    let image = reader
        .decode()
        .map_err(|e| GradingError::image_load("Failed to decode image buffer", e))?
        .to_rgb8();
    ensure_non_empty(&image)?;
    Ok(ExifExtractor::orientation_from_bytes(bytes).apply(image))
}

/// Load image using the `image` crate (standard formats)
fn load_standard(path: &Path, format: image::ImageFormat) -> Result<RgbImage> {
    let mut reader = ImageReader::open(path).map_err(|e| {
        GradingError::image_load(format!("Failed to open image file: {}", path.display()), e)
    })?;
    reader.set_format(format);

    let image = reader.decode().map_err(|e| {
        GradingError::image_load(format!("Failed to decode image: {}", path.display()), e)
    })?;
    Ok(image.to_rgb8())
}

/// Load HEIC/HEIF image using libheif
#[cfg(feature = "heic")]
fn load_heic(path: &Path) -> Result<RgbImage> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let path_str = path.to_str().ok_or_else(|| GradingError::ImageLoadError {
        message: format!("Invalid file path encoding: {}", path.display()),
        source: None,
    })?;
    let ctx = HeifContext::read_from_file(path_str).map_err(|e| {
        GradingError::image_load(format!("Failed to read HEIC file: {}", path.display()), e)
    })?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| GradingError::image_load("Failed to get primary image handle", e))?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| GradingError::image_load("Failed to decode HEIC image", e))?;

    let planes = image.planes();
    let plane = planes.interleaved.ok_or_else(|| GradingError::ImageLoadError {
        message: "HEIC image has no interleaved RGB data".to_string(),
        source: None,
    })?;

    let (width, height) = (handle.width(), handle.height());
    let row_bytes = width as usize * 3;
    let stride = plane.stride as usize;
    // Rows may carry stride padding
    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let line = plane.data.get(start..start + row_bytes).ok_or_else(|| {
            GradingError::invariant("HEIC plane shorter than its declared size")
        })?;
        data.extend_from_slice(line);
    }

    RgbImage::from_raw(width, height, data).ok_or_else(|| GradingError::ImageLoadError {
        message: "HEIC buffer does not match image dimensions".to_string(),
        source: None,
    })
}

#[cfg(not(feature = "heic"))]
fn load_heic(path: &Path) -> Result<RgbImage> {
    Err(GradingError::ImageLoadError {
        message: format!(
            "HEIC support not compiled in (enable the `heic` feature): {}",
            path.display()
        ),
        source: None,
    })
}

fn ensure_non_empty(image: &RgbImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(GradingError::ImageLoadError {
            message: format!("Image has a zero dimension ({}x{})", image.width(), image.height()),
            source: None,
        });
    }
    Ok(())
}

/// Get list of all supported file extensions
pub fn supported_extensions() -> &'static [&'static str] {
    &[
        "jpg", "jpeg", "png", "gif", "webp", "tiff", "tif", "bmp", "heic", "heif",
    ]
}

/// Check if a file extension is supported
pub fn is_supported_extension(ext: &str) -> bool {
    let ext_lower = ext.to_lowercase();
    supported_extensions().contains(&ext_lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_extension(Path::new("photo.jpg")),
            Some(SourceFormat::Standard(image::ImageFormat::Jpeg))
        );
        assert_eq!(
            SourceFormat::from_extension(Path::new("photo.JPEG")),
            Some(SourceFormat::Standard(image::ImageFormat::Jpeg))
        );
        assert_eq!(
            SourceFormat::from_extension(Path::new("photo.png")),
            Some(SourceFormat::Standard(image::ImageFormat::Png))
        );
        assert_eq!(
            SourceFormat::from_extension(Path::new("photo.HEIF")),
            Some(SourceFormat::Heic)
        );
        assert_eq!(SourceFormat::from_extension(Path::new("photo.xyz")), None);
        assert_eq!(SourceFormat::from_extension(Path::new("photo.exr")), None);
    }

    #[test]
    fn test_heif_requirement() {
        assert!(SourceFormat::Heic.requires_heif());
        assert!(!SourceFormat::Standard(image::ImageFormat::Png).requires_heif());
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("jpg"));
        assert!(is_supported_extension("JPEG"));
        assert!(is_supported_extension("heic"));
        assert!(!is_supported_extension("xyz"));
        assert!(!is_supported_extension("doc"));
    }

    #[test]
    fn test_png_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.png");
        let source = RgbImage::from_pixel(40, 56, Rgb([30, 60, 200]));
        source.save(&path).unwrap();

        let loaded = load_image_oriented(&path).unwrap();
        assert_eq!(loaded.dimensions(), (40, 56));
        assert_eq!(loaded.get_pixel(5, 5), &Rgb([30, 60, 200]));
    }

    #[test]
    fn test_load_from_bytes() {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(8, 8, Rgb([255, 215, 0]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let image = load_image_from_bytes(&bytes).unwrap();
        assert_eq!(image.dimensions(), (8, 8));

        assert!(matches!(
            load_image_from_bytes(b"garbage"),
            Err(GradingError::ImageLoadError { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_image(Path::new("/nonexistent/card.png")).unwrap_err();
        assert!(matches!(err, GradingError::ImageLoadError { .. }));
        assert!(!err.is_recoverable());
    }

    #[cfg(not(feature = "heic"))]
    #[test]
    fn test_heic_without_feature() {
        let err = load_image(Path::new("photo.heic")).unwrap_err();
        assert!(err.to_string().contains("heic"));
    }
}
