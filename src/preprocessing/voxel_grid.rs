//! Voxel-grid downsampling.

use std::collections::HashSet;

use super::{CloudFilter, retain_columns};
use crate::core::types::PointCloud;
use crate::error::Result;

/// Keeps the first point that lands in each voxel of edge `voxel_size`.
///
/// Used in the map post-filter chain, where it runs on the map expressed
/// in sensor-frame coordinates, so density is bounded uniformly around
/// the sensor rather than around the map origin. Survivors keep their
/// original order.
#[derive(Debug, Clone, Copy)]
pub struct VoxelGridFilter {
    voxel_size: f32,
}

impl VoxelGridFilter {
    /// Create a voxel filter with the given edge length in meters.
    pub fn new(voxel_size: f32) -> Self {
        assert!(voxel_size > 0.0);
        Self { voxel_size }
    }

    #[inline]
    fn voxel_of(&self, value: f32) -> i64 {
        (value / self.voxel_size).floor() as i64
    }
}

impl CloudFilter for VoxelGridFilter {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()> {
        let dim = cloud.euclidean_dim();
        let features = cloud.features().clone();
        let mut occupied: HashSet<[i64; 3]> = HashSet::with_capacity(cloud.point_count());

        retain_columns(cloud, |i| {
            let mut key = [0i64; 3];
            for row in 0..dim {
                key[row] = self.voxel_of(features[(row, i)]);
            }
            occupied.insert(key)
        });
        Ok(())
    }
}
