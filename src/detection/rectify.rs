//! Perspective rectification
//!
//! Maps the detected quadrilateral onto the canonical upright card frame so
//! every analyzer works in the same coordinate system.

use crate::color::conversion::rgb_to_lab;
use crate::color::stats::median;
use crate::config::RectificationConfig;
use crate::detection::geometry::{Point, Quadrilateral};
use crate::error::{GradingError, Result};
use crate::imaging::Mask;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use palette::Lab;
use tracing::{debug, instrument};

/// Samples taken along each side when estimating the background colour
const BACKGROUND_SAMPLES_PER_SIDE: usize = 24;

/// Fewer usable samples than this means the background is unknown
const MIN_BACKGROUND_SAMPLES: usize = 8;

/// Projective warp into a fixed-size portrait frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerspectiveRectifier {
    width: u32,
    height: u32,
}

impl Default for PerspectiveRectifier {
    fn default() -> Self {
        Self::new(&RectificationConfig::default())
    }
}

impl PerspectiveRectifier {
    pub fn new(config: &RectificationConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Warp the quadrilateral's content to the canonical frame
    ///
    /// Landscape quadrilaterals are turned upright first. Output pixels that
    /// map outside the source are black; [`Self::coverage_mask`] tells them apart.
    #[instrument(skip(self, image, quad), fields(out_w = self.width, out_h = self.height))]
    pub fn rectify(&self, image: &RgbImage, quad: &Quadrilateral) -> Result<RgbImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(GradingError::invariant("cannot rectify an empty image"));
        }
        let projection = self.forward_projection(quad)?;

        let mut output = RgbImage::new(self.width, self.height);
        warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut output);

        debug!(area = quad.area(), "card rectified");
        Ok(output)
    }

    /// Output pixels whose source position lies inside the original image
    ///
    /// An all-on plane of the source size is warped like the photo; output
    /// pixels with no source behind them keep the zero default.
    pub fn coverage_mask(
        &self,
        quad: &Quadrilateral,
        source_width: u32,
        source_height: u32,
    ) -> Result<Mask> {
        if source_width == 0 || source_height == 0 {
            return Err(GradingError::invariant("cannot map coverage of an empty image"));
        }
        let projection = self.forward_projection(quad)?;
        let plane = GrayImage::from_pixel(source_width, source_height, Luma([255]));
        let mut covered = GrayImage::new(self.width, self.height);
        warp_into(&plane, &projection, Interpolation::Nearest, Luma([0]), &mut covered);
        Ok(Mask::from_gray(covered))
    }

    fn forward_projection(&self, quad: &Quadrilateral) -> Result<Projection> {
        let upright = quad.to_portrait();
        Projection::from_control_points(corners_f32(&upright), self.target_corners())
            .ok_or_else(|| GradingError::invariant("degenerate quadrilateral: no projective transform"))
    }

    /// Pixel-centre corners of the output frame in TL, TR, BR, BL order
    fn target_corners(&self) -> [(f32, f32); 4] {
        let w = (self.width - 1) as f32;
        let h = (self.height - 1) as f32;
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
    }
}

fn corners_f32(quad: &Quadrilateral) -> [(f32, f32); 4] {
    quad.points().map(|p| (p.x as f32, p.y as f32))
}

/// Median Lab colour just outside the quadrilateral
///
/// Points along each side are pushed `offset` pixels away from the centroid;
/// those landing outside the image are skipped.
pub fn sample_background(image: &RgbImage, quad: &Quadrilateral, offset: f32) -> Option<Lab> {
    let (width, height) = image.dimensions();
    let centroid = quad.centroid();
    let corners = quad.points();
    let mut l_values = Vec::new();
    let mut a_values = Vec::new();
    let mut b_values = Vec::new();

    for i in 0..4 {
        let start = corners[i];
        let end = corners[(i + 1) % 4];
        for s in 0..BACKGROUND_SAMPLES_PER_SIDE {
            // Skip the corners themselves; the offset direction is ambiguous there
            let t = (s as f64 + 0.5) / BACKGROUND_SAMPLES_PER_SIDE as f64;
            let on_edge = Point::new(
                start.x + (end.x - start.x) * t,
                start.y + (end.y - start.y) * t,
            );
            let dx = on_edge.x - centroid.x;
            let dy = on_edge.y - centroid.y;
            let len = (dx * dx + dy * dy).sqrt();
            if len <= f64::EPSILON {
                continue;
            }
            let x = (on_edge.x + dx / len * offset as f64).round();
            let y = (on_edge.y + dy / len * offset as f64).round();
            if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
                continue;
            }
            let p = image.get_pixel(x as u32, y as u32);
            let lab = rgb_to_lab(p.0[0], p.0[1], p.0[2]);
            l_values.push(lab.l);
            a_values.push(lab.a);
            b_values.push(lab.b);
        }
    }

    if l_values.len() < MIN_BACKGROUND_SAMPLES {
        return None;
    }
    Some(Lab::new(
        median(&l_values)?,
        median(&a_values)?,
        median(&b_values)?,
    ))
}
