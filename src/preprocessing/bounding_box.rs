//! Axis-aligned bounding-box culling.

use super::{CloudFilter, retain_columns};
use crate::core::types::PointCloud;
use crate::error::{MapperError, Result};

/// Culls points against an axis-aligned box.
///
/// With `remove_inside = false` only points inside the box survive; with
/// `remove_inside = true` the box is carved out instead. The usual home of
/// this filter is the world-frame input chain, where the box is expressed
/// in absolute map coordinates (e.g. to crop a site boundary or remove
/// the robot's own footprint).
#[derive(Debug, Clone)]
pub struct BoundingBoxFilter {
    min: Vec<f32>,
    max: Vec<f32>,
    remove_inside: bool,
}

impl BoundingBoxFilter {
    /// Create a box filter; `min` and `max` must have D entries each.
    pub fn new(min: Vec<f32>, max: Vec<f32>, remove_inside: bool) -> Self {
        assert_eq!(min.len(), max.len());
        Self {
            min,
            max,
            remove_inside,
        }
    }
}

impl CloudFilter for BoundingBoxFilter {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()> {
        let dim = cloud.euclidean_dim();
        if self.min.len() != dim {
            return Err(MapperError::Filter(format!(
                "bounding box is {}-dimensional but cloud is {}-dimensional",
                self.min.len(),
                dim
            )));
        }

        let features = cloud.features().clone();
        retain_columns(cloud, |i| {
            let inside = (0..dim).all(|row| {
                let value = features[(row, i)];
                value >= self.min[row] && value <= self.max[row]
            });
            inside != self.remove_inside
        });
        Ok(())
    }
}
