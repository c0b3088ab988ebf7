//! Radial distance gating.

use super::{CloudFilter, retain_columns};
use crate::core::types::PointCloud;
use crate::error::Result;

/// Keeps points whose distance from the origin lies in
/// `[min_distance, max_distance]`.
///
/// With `min_distance = 0` this is the sensor-range radius filter: applied
/// to a sensor-frame cloud it drops everything the sensor could not have
/// observed reliably.
#[derive(Debug, Clone, Copy)]
pub struct DistanceLimitFilter {
    min_distance: f32,
    max_distance: f32,
}

impl DistanceLimitFilter {
    /// Create a filter with both bounds.
    pub fn new(min_distance: f32, max_distance: f32) -> Self {
        Self {
            min_distance,
            max_distance,
        }
    }

    /// Create a pure maximum-range filter.
    pub fn with_max_distance(max_distance: f32) -> Self {
        Self::new(0.0, max_distance)
    }
}

impl CloudFilter for DistanceLimitFilter {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()> {
        let dim = cloud.euclidean_dim();
        let features = cloud.features().clone();
        retain_columns(cloud, |i| {
            let norm = features.view((0, i), (dim, 1)).norm();
            norm >= self.min_distance && norm <= self.max_distance
        });
        Ok(())
    }
}
