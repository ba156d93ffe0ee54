use ndarray::Array1;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::common::Label;

/// Seeded synthetic stream: Gaussian points around the origin with a
/// configurable fraction of far-away outliers. Members carry `Label::Int(0)`,
/// outliers `Label::Int(1)`, so detection statistics can be checked against
/// ground truth. The iterator is infinite; bound it with `take`.
///
/// # Parameters
///
/// - `dim`: Dimensionality of the generated feature vectors.
/// - `outlier_rate`: Probability in [0, 1] that a point is an outlier.
/// - `seed`: RNG seed; two generators with the same seed yield the same
///   stream.
///
/// # Example
///
/// ```
/// use anyout::datasets::synthetic::SyntheticOutliers;
///
/// let points: Vec<_> = SyntheticOutliers::new(2, 0.1, 42).take(100).collect();
/// assert_eq!(points.len(), 100);
/// assert_eq!(points[0].0.len(), 2);
/// ```
pub struct SyntheticOutliers {
    dim: usize,
    outlier_rate: f64,
    rng: StdRng,
    member: Normal<f64>,
    outlier: Normal<f64>,
}

impl SyntheticOutliers {
    pub fn new(dim: usize, outlier_rate: f64, seed: u64) -> Self {
        Self {
            dim,
            outlier_rate,
            rng: StdRng::seed_from_u64(seed),
            member: Normal::new(0.0, 1.0).unwrap(),
            outlier: Normal::new(25.0, 2.0).unwrap(),
        }
    }
}

impl Iterator for SyntheticOutliers {
    type Item = (Array1<f64>, Option<Label>);

    fn next(&mut self) -> Option<Self::Item> {
        let is_outlier = self.rng.gen::<f64>() < self.outlier_rate;
        let distribution = if is_outlier {
            self.outlier
        } else {
            self.member
        };
        let features = (0..self.dim)
            .map(|_| distribution.sample(&mut self.rng))
            .collect::<Vec<f64>>();
        let label = if is_outlier {
            Label::Int(1)
        } else {
            Label::Int(0)
        };
        Some((Array1::from_vec(features), Some(label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let a: Vec<_> = SyntheticOutliers::new(3, 0.05, 7).take(50).collect();
        let b: Vec<_> = SyntheticOutliers::new(3, 0.05, 7).take(50).collect();
        assert_eq!(a.len(), b.len());
        for ((xa, la), (xb, lb)) in a.iter().zip(b.iter()) {
            assert_eq!(xa, xb);
            assert_eq!(la, lb);
        }
    }

    #[test]
    fn test_outliers_are_far_and_labeled() {
        let mut seen_outlier = false;
        for (features, label) in SyntheticOutliers::new(2, 0.2, 3).take(200) {
            if label == Some(Label::Int(1)) {
                seen_outlier = true;
                // Outliers live far from the member cluster.
                assert!(features.iter().all(|v| *v > 10.0));
            }
        }
        assert!(seen_outlier);
    }

    #[test]
    fn test_rate_zero_never_emits_outliers() {
        for (_, label) in SyntheticOutliers::new(2, 0.0, 9).take(100) {
            assert_eq!(label, Some(Label::Int(0)));
        }
    }
}
