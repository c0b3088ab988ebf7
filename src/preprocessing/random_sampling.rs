//! Probabilistic thinning.

use rand::Rng;

use super::{CloudFilter, retain_columns};
use crate::core::types::PointCloud;
use crate::error::Result;

/// Keeps each point independently with probability `prob`.
///
/// A cheap map post-filter for bounding map density when a structured
/// scheme like [`super::VoxelGridFilter`] is overkill.
#[derive(Debug, Clone, Copy)]
pub struct RandomSamplingFilter {
    prob: f32,
}

impl RandomSamplingFilter {
    /// Create a sampler; `prob` is clamped to [0, 1].
    pub fn new(prob: f32) -> Self {
        Self {
            prob: prob.clamp(0.0, 1.0),
        }
    }
}

impl CloudFilter for RandomSamplingFilter {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()> {
        let mut rng = rand::thread_rng();
        retain_columns(cloud, |_| rng.gen_range(0.0f32..1.0) < self.prob);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn test_cloud(n: usize) -> PointCloud {
        let coords = DMatrix::from_fn(3, n, |row, col| (row * n + col) as f32);
        PointCloud::from_coordinates(&coords)
    }

    #[test]
    fn test_prob_zero_drops_everything() {
        let mut cloud = test_cloud(100);
        RandomSamplingFilter::new(0.0)
            .filter_in_place(&mut cloud)
            .unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_prob_one_keeps_everything() {
        let mut cloud = test_cloud(100);
        RandomSamplingFilter::new(1.0)
            .filter_in_place(&mut cloud)
            .unwrap();
        assert_eq!(cloud.point_count(), 100);
    }

    #[test]
    fn test_half_prob_thins_roughly_half() {
        let mut cloud = test_cloud(2000);
        RandomSamplingFilter::new(0.5)
            .filter_in_place(&mut cloud)
            .unwrap();
        let kept = cloud.point_count();
        assert!((600..1400).contains(&kept), "kept {kept} of 2000");
    }

    #[test]
    fn test_out_of_range_prob_is_clamped() {
        let mut cloud = test_cloud(10);
        RandomSamplingFilter::new(2.0)
            .filter_in_place(&mut cloud)
            .unwrap();
        assert_eq!(cloud.point_count(), 10);
    }
}
