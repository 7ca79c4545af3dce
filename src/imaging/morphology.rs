//! Directional morphology
//!
//! imageproc only ships square/diamond structuring elements; scratches are
//! isolated with 1×N and N×1 line elements instead.

use image::{GrayImage, Luma};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

/// Opening (erode then dilate) of a binary image with a centred line element
///
/// Keeps only foreground runs at least `length` pixels long along `orientation`.
pub fn open_line(binary: &GrayImage, length: u32, orientation: LineOrientation) -> GrayImage {
    let length = length.max(1);
    let eroded = line_pass(binary, length, orientation, true);
    line_pass(&eroded, length, orientation, false)
}

/// One erosion (`all`) or dilation (`any`) pass along rows or columns
fn line_pass(binary: &GrayImage, length: u32, orientation: LineOrientation, erode: bool) -> GrayImage {
    let (width, height) = binary.dimensions();
    let before = ((length - 1) / 2) as i64;
    let after = (length / 2) as i64;
    let (outer, inner) = match orientation {
        LineOrientation::Horizontal => (height, width),
        LineOrientation::Vertical => (width, height),
    };
    let at = |o: u32, i: u32| -> bool {
        match orientation {
            LineOrientation::Horizontal => binary.get_pixel(i, o).0[0] > 0,
            LineOrientation::Vertical => binary.get_pixel(o, i).0[0] > 0,
        }
    };

    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0u32; inner as usize + 1];
    for o in 0..outer {
        for i in 0..inner {
            prefix[i as usize + 1] = prefix[i as usize] + u32::from(at(o, i));
        }
        for i in 0..inner {
            let lo = (i as i64 - before).max(0) as usize;
            let hi = ((i as i64 + after).min(inner as i64 - 1) + 1) as usize;
            let on = prefix[hi] - prefix[lo];
            let keep = if erode {
                on as usize == hi - lo
            } else {
                on > 0
            };
            if keep {
                let (x, y) = match orientation {
                    LineOrientation::Horizontal => (i, o),
                    LineOrientation::Vertical => (o, i),
                };
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}
