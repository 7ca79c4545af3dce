//! Robust statistics over pixel samples

/// Percentile (0-100) using nearest-rank on a sorted copy
pub fn percentile(values: &[f32], pct: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = ((sorted.len() - 1) as f32 * (pct / 100.0).clamp(0.0, 1.0)).round() as usize;
    Some(sorted[rank.min(sorted.len() - 1)])
}

/// Median of the samples (upper median for even counts)
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut scratch = values.to_vec();
    let mid = scratch.len() / 2;
    let (_, m, _) = scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}

/// Median of an 8-bit histogram-friendly sample set
pub fn median_u8(values: impl IntoIterator<Item = u8>) -> Option<u8> {
    let mut histogram = [0usize; 256];
    let mut count = 0usize;
    for v in values {
        histogram[v as usize] += 1;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let target = count / 2;
    let mut seen = 0usize;
    for (level, &n) in histogram.iter().enumerate() {
        seen += n;
        if seen > target {
            return Some(level as u8);
        }
    }
    Some(255)
}

pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some((values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32)
}

/// Population standard deviation
pub fn std_dev(values: &[f32]) -> Option<f32> {
    let m = mean(values)? as f64;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(var.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_u8() {
        assert_eq!(median_u8([10u8, 200, 30]), Some(30));
        assert_eq!(median_u8(std::iter::empty()), None);
    }

    #[test]
    fn test_percentile() {
        let values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        assert_eq!(percentile(&values, 15.0), Some(15.0));
        assert_eq!(percentile(&values, 100.0), Some(100.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_mean_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(std_dev(&[]), None);
    }
}
