//! Sliding-window mean and variance via summed-area tables

/// Mean of `values` over a `(2r+1)²` window around each pixel
///
/// Windows are clipped at the borders. `values` is row-major `width × height`.
pub fn local_mean(values: &[f32], width: u32, height: u32, radius: u32) -> Vec<f32> {
    window_stats(values, width, height, radius, false)
}

/// Variance of `values` over a `(2r+1)²` window around each pixel
pub fn local_variance(values: &[f32], width: u32, height: u32, radius: u32) -> Vec<f32> {
    window_stats(values, width, height, radius, true)
}

fn window_stats(values: &[f32], width: u32, height: u32, radius: u32, variance: bool) -> Vec<f32> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || values.len() != w * h {
        return Vec::new();
    }

    // Integral images with a zero first row/column
    let stride = w + 1;
    let mut sum = vec![0f64; stride * (h + 1)];
    let mut sum_sq = vec![0f64; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0f64;
        let mut row_sq = 0f64;
        for x in 0..w {
            let v = values[y * w + x] as f64;
            row += v;
            row_sq += v * v;
            sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
            sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
        }
    }

    let r = radius as usize;
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let n = ((y1 - y0) * (x1 - x0)) as f64;
            let s = sum[y1 * stride + x1] - sum[y0 * stride + x1] - sum[y1 * stride + x0]
                + sum[y0 * stride + x0];
            let sq = sum_sq[y1 * stride + x1] - sum_sq[y0 * stride + x1]
                - sum_sq[y1 * stride + x0]
                + sum_sq[y0 * stride + x0];
            let mean = s / n;
            if variance {
                out.push((sq / n - mean * mean).max(0.0) as f32);
            } else {
                out.push(mean as f32);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_region_has_zero_variance() {
        let values = vec![42.0; 100];
        let var = local_variance(&values, 10, 10, 2);
        assert!(var.iter().all(|&v| v.abs() < 1e-3));
    }

    #[test]
    fn test_checker_has_high_variance() {
        let values: Vec<f32> = (0..100)
            .map(|i| if (i % 10 + i / 10) % 2 == 0 { 0.0 } else { 10.0 })
            .collect();
        let var = local_variance(&values, 10, 10, 1);
        // 3x3 window of a checker: 5 of one value, 4 of the other
        assert!((var[55] - 24.691).abs() < 0.01);
    }

    #[test]
    fn test_local_mean_clips_at_border() {
        let values: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mean = local_mean(&values, 3, 3, 1);
        assert!((mean[4] - 4.0).abs() < 1e-6);
        // corner window covers 0, 1, 3, 4
        assert!((mean[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_size_mismatch() {
        assert!(local_variance(&[1.0, 2.0], 3, 3, 1).is_empty());
    }
}
