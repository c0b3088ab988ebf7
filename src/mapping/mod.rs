//! Map maintenance: storage, novelty selection, dynamic-point tracking
//! and the update policy.

pub mod dynamic;
pub mod novelty;
pub mod policy;
pub mod store;

use crate::core::types::{PointCloud, RigidTransform};
use crate::error::Result;
use crate::preprocessing::{CloudFilter, DistanceLimitFilter};

/// Crop a map-frame cloud to the sensor's range.
///
/// The cloud is moved into the sensor frame, radius-filtered around the
/// origin, and moved back, so the crop is centred on the sensor rather
/// than the map origin.
pub(crate) fn crop_to_sensor_range(
    cloud: &PointCloud,
    sensor_pose: &RigidTransform,
    radius_filter: &DistanceLimitFilter,
) -> Result<PointCloud> {
    let mut in_sensor_frame = sensor_pose.inverse().apply(cloud);
    radius_filter.filter_in_place(&mut in_sensor_frame)?;
    sensor_pose.apply_in_place(&mut in_sensor_frame);
    Ok(in_sensor_frame)
}
