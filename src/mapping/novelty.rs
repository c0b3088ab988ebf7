//! Novelty selection for incoming points.

use crate::core::knn::KnnIndex;
use crate::core::types::{PointCloud, RigidTransform};
use crate::error::Result;
use crate::preprocessing::DistanceLimitFilter;

use super::crop_to_sensor_range;

/// Select the input points that are not already represented in the map.
///
/// The map is first cropped to the sensor's range (points the sensor could
/// not have re-observed must not suppress new ones), then each input point
/// keeps its place iff its nearest cropped-map neighbour is at least
/// `min_dist_new_point` away. The result is an order-preserving
/// subsequence of the input, descriptors included.
pub(crate) fn retain_novel_points(
    input: &PointCloud,
    map: &PointCloud,
    sensor_pose: &RigidTransform,
    radius_filter: &DistanceLimitFilter,
    min_dist_new_point: f32,
) -> Result<PointCloud> {
    let cut_map = crop_to_sensor_range(map, sensor_pose, radius_filter)?;
    if cut_map.is_empty() {
        return Ok(input.clone());
    }

    let index = KnnIndex::from_coordinates(&cut_map.coordinates());
    let min_dist_sq = min_dist_new_point * min_dist_new_point;
    let dim = input.euclidean_dim();
    let features = input.features();

    let mut kept = Vec::with_capacity(input.point_count());
    let mut query = vec![0.0f32; dim];
    for i in 0..input.point_count() {
        for row in 0..dim {
            query[row] = features[(row, i)];
        }
        let is_novel = match index.nearest_one(&query) {
            Some((dist_sq, _)) => dist_sq >= min_dist_sq,
            None => true,
        };
        if is_novel {
            kept.push(i);
        }
    }

    Ok(input.select_columns(&kept))
}
