//! EXIF orientation
//!
//! Phone photos are usually stored sensor-up with an `Orientation` tag; the
//! pixel grid must be turned upright before boundary detection so the card's
//! portrait/landscape test sees what the photographer saw.

use crate::error::{GradingError, Result};
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tracing::debug;

/// EXIF orientation tag values 1 to 8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Normal,
    MirrorHorizontal,
    Rotate180,
    MirrorVertical,
    /// Mirrored, then rotated 90° clockwise
    Transpose,
    Rotate90,
    /// Mirrored, then rotated 270° clockwise
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Unknown values map to `Normal`
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Orientation::MirrorHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::MirrorVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    /// Whether applying this orientation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            Orientation::Transpose | Orientation::Rotate90 | Orientation::Transverse | Orientation::Rotate270
        )
    }

    /// Turn the stored pixel grid upright
    pub fn apply(&self, image: RgbImage) -> RgbImage {
        match self {
            Orientation::Normal => image,
            Orientation::MirrorHorizontal => imageops::flip_horizontal(&image),
            Orientation::Rotate180 => imageops::rotate180(&image),
            Orientation::MirrorVertical => imageops::flip_vertical(&image),
            Orientation::Transpose => imageops::flip_horizontal(&imageops::rotate90(&image)),
            Orientation::Rotate90 => imageops::rotate90(&image),
            Orientation::Transverse => imageops::flip_horizontal(&imageops::rotate270(&image)),
            Orientation::Rotate270 => imageops::rotate270(&image),
        }
    }
}

/// EXIF orientation reader
pub struct ExifExtractor;

impl ExifExtractor {
    /// Orientation of an image file
    ///
    /// Only a failure to open the file is an error; missing or malformed
    /// EXIF yields `Normal`.
    pub fn read_orientation(path: &Path) -> Result<Orientation> {
        let file = File::open(path)
            .map_err(|e| GradingError::exif(format!("Failed to open {}", path.display()), e))?;
        let mut reader = BufReader::new(file);
        match ::exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Ok(Self::orientation_of(&exif)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no EXIF data");
                Ok(Orientation::Normal)
            }
        }
    }

    /// Orientation from an in-memory image; anything unreadable is `Normal`
    pub fn orientation_from_bytes(bytes: &[u8]) -> Orientation {
        let mut cursor = Cursor::new(bytes);
        match ::exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => Self::orientation_of(&exif),
            Err(_) => Orientation::Normal,
        }
    }

    fn orientation_of(exif: &::exif::Exif) -> Orientation {
        exif.get_field(::exif::Tag::Orientation, ::exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .map_or(Orientation::Normal, Orientation::from_exif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn marked_image() -> RgbImage {
        // 3×2 with a red pixel at the top-left
        let mut image = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image
    }

    #[test]
    fn test_from_exif() {
        assert_eq!(Orientation::from_exif(1), Orientation::Normal);
        assert_eq!(Orientation::from_exif(6), Orientation::Rotate90);
        assert_eq!(Orientation::from_exif(8), Orientation::Rotate270);
        assert_eq!(Orientation::from_exif(42), Orientation::Normal);
    }

    #[test]
    fn test_rotate90_moves_top_left_to_top_right() {
        let out = Orientation::Rotate90.apply(marked_image());
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(out.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_rotate180_and_mirrors() {
        let out = Orientation::Rotate180.apply(marked_image());
        assert_eq!(out.get_pixel(2, 1), &Rgb([255, 0, 0]));

        let out = Orientation::MirrorHorizontal.apply(marked_image());
        assert_eq!(out.get_pixel(2, 0), &Rgb([255, 0, 0]));

        let out = Orientation::MirrorVertical.apply(marked_image());
        assert_eq!(out.get_pixel(0, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_transpose_keeps_top_left() {
        let out = Orientation::Transpose.apply(marked_image());
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert!(Orientation::Transpose.swaps_dimensions());
        assert!(!Orientation::Rotate180.swaps_dimensions());
    }

    #[test]
    fn test_bytes_without_exif() {
        let mut png = Vec::new();
        marked_image()
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(ExifExtractor::orientation_from_bytes(&png), Orientation::Normal);
        assert_eq!(ExifExtractor::orientation_from_bytes(b"not an image"), Orientation::Normal);
    }

    #[test]
    fn test_file_without_exif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        marked_image().save(&path).unwrap();
        let orientation = ExifExtractor::read_orientation(&path).unwrap();
        assert_eq!(orientation, Orientation::Normal);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = ExifExtractor::read_orientation(Path::new("/nonexistent/card.jpg")).unwrap_err();
        assert!(matches!(err, GradingError::ExifError { .. }));
    }
}
