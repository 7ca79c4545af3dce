//! Contrast-limited adaptive histogram equalization
//!
//! Tile histograms are clipped at `clip_limit` times the uniform bin height,
//! the excess is spread evenly over all bins, and each pixel is mapped through
//! a bilinear blend of the four nearest tile lookup tables.

use image::{GrayImage, Luma};

/// Equalize `gray` over a `tiles × tiles` grid
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts[(ty * tiles_x + tx) as usize] = tile_lut(gray, x0, y0, x1, y1, clip_limit);
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as usize;
        let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        let at = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;
        let top = at(tx0, ty0) * (1.0 - wx) + at(tx1, ty0) * wx;
        let bottom = at(tx0, ty1) * (1.0 - wx) + at(tx1, ty1) * wx;
        let mapped = top * (1.0 - wy) + bottom * wy;
        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let pixels = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; 256];
    if pixels == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let limit = ((clip_limit * pixels as f32 / 256.0).ceil() as u32).max(1);
    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let spread = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += spread + u32::from(i < remainder);
    }

    let mut cdf = 0u32;
    for (i, bin) in histogram.iter().enumerate() {
        cdf += bin;
        lut[i] = ((cdf as f32 * 255.0) / pixels as f32).round().min(255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and blend weight for one axis
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let t0 = (f.floor() as u32).min(tiles - 1);
    let t1 = (t0 + 1).min(tiles - 1);
    let w = if t1 == t0 { 0.0 } else { f - t0 as f32 };
    (t0, t1, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_dimensions() {
        let gray = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let out = clahe(&gray, 2.0, 8);
        assert_eq!(out.dimensions(), gray.dimensions());
    }

    #[test]
    fn test_stretches_low_contrast() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 2) as u8 * 10]));
        let out = clahe(&gray, 4.0, 2);
        let spread_in = 10i32;
        let lo = out.pixels().map(|p| p.0[0]).min().unwrap() as i32;
        let hi = out.pixels().map(|p| p.0[0]).max().unwrap() as i32;
        assert!(hi - lo > spread_in);
    }

    #[test]
    fn test_keeps_ordering_within_tile() {
        let gray = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 10) as u8]));
        let out = clahe(&gray, 2.0, 1);
        for x in 1..16 {
            assert!(out.get_pixel(x, 0).0[0] >= out.get_pixel(x - 1, 0).0[0]);
        }
    }

    #[test]
    fn test_empty_image() {
        let gray = GrayImage::new(0, 0);
        assert_eq!(clahe(&gray, 2.0, 8).dimensions(), (0, 0));
    }
}
