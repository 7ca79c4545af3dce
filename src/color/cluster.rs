//! Deterministic k-means over Lab samples
//!
//! Centres are seeded by farthest-point traversal starting from the darkest
//! sample, so the same input always yields the same clustering.

/// Lab sample as `[L*, a*, b*]`
pub type LabSample = [f32; 3];

#[inline]
fn distance_sq(a: &LabSample, b: &LabSample) -> f32 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    dl * dl + da * da + db * db
}

/// Fitted cluster centres
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub centers: Vec<LabSample>,
}

impl KMeans {
    /// Fit `k` centres with Lloyd iterations
    ///
    /// Returns `None` when there are fewer samples than clusters.
    pub fn fit(samples: &[LabSample], k: usize, iterations: usize) -> Option<Self> {
        if k == 0 || samples.len() < k {
            return None;
        }

        let mut centers = Self::seed(samples, k);
        let mut labels = vec![0usize; samples.len()];

        for _ in 0..iterations {
            let mut changed = false;
            for (sample, label) in samples.iter().zip(labels.iter_mut()) {
                let nearest = nearest(&centers, sample);
                if nearest != *label {
                    *label = nearest;
                    changed = true;
                }
            }

            let mut sums = vec![[0f64; 3]; k];
            let mut counts = vec![0usize; k];
            for (sample, &label) in samples.iter().zip(labels.iter()) {
                for c in 0..3 {
                    sums[label][c] += sample[c] as f64;
                }
                counts[label] += 1;
            }
            for (i, center) in centers.iter_mut().enumerate() {
                if counts[i] > 0 {
                    for c in 0..3 {
                        center[c] = (sums[i][c] / counts[i] as f64) as f32;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        Some(Self { centers })
    }

    /// Farthest-point seeding from the darkest sample
    fn seed(samples: &[LabSample], k: usize) -> Vec<LabSample> {
        let mut first = 0;
        for (i, s) in samples.iter().enumerate() {
            if s[0] < samples[first][0] {
                first = i;
            }
        }
        let mut centers = vec![samples[first]];
        let mut min_dist: Vec<f32> = samples
            .iter()
            .map(|s| distance_sq(s, &samples[first]))
            .collect();

        while centers.len() < k {
            let mut best = 0;
            for (i, &d) in min_dist.iter().enumerate() {
                if d > min_dist[best] {
                    best = i;
                }
            }
            let next = samples[best];
            centers.push(next);
            for (d, s) in min_dist.iter_mut().zip(samples.iter()) {
                *d = d.min(distance_sq(s, &next));
            }
        }
        centers
    }

    /// Index of the closest centre
    pub fn assign(&self, sample: &LabSample) -> usize {
        nearest(&self.centers, sample)
    }

    pub fn k(&self) -> usize {
        self.centers.len()
    }
}

fn nearest(centers: &[LabSample], sample: &LabSample) -> usize {
    let mut best = 0;
    let mut best_d = f32::MAX;
    for (i, c) in centers.iter().enumerate() {
        let d = distance_sq(c, sample);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> Vec<LabSample> {
        let mut samples = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f32 * 0.2;
            samples.push([20.0 + jitter, 0.0, 0.0]);
            samples.push([50.0, 40.0 + jitter, 10.0]);
            samples.push([90.0 - jitter, -5.0, 60.0]);
        }
        samples
    }

    #[test]
    fn test_separates_blobs() {
        let samples = three_blobs();
        let model = KMeans::fit(&samples, 3, 20).unwrap();
        assert_eq!(model.k(), 3);

        let dark = model.assign(&[20.0, 0.0, 0.0]);
        let red = model.assign(&[50.0, 40.0, 10.0]);
        let yellow = model.assign(&[90.0, -5.0, 60.0]);
        assert_ne!(dark, red);
        assert_ne!(red, yellow);
        assert_ne!(dark, yellow);
    }

    #[test]
    fn test_deterministic() {
        let samples = three_blobs();
        let a = KMeans::fit(&samples, 3, 20).unwrap();
        let b = KMeans::fit(&samples, 3, 20).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(KMeans::fit(&[[1.0, 2.0, 3.0]], 3, 10).is_none());
        assert!(KMeans::fit(&[], 0, 10).is_none());
    }
}
