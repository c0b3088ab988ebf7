//! Per-point dynamic-probability tracking.
//!
//! Each map point carries a posterior belief that it belongs to a
//! non-stationary obstacle. Every accepted sweep re-observes part of the
//! map; for each re-observed point a Bayesian rule folds in the new
//! evidence, weighted down when the geometry makes the observation
//! unreliable: a grazing view ray, a large angular distance to the best
//! matching beam, or a radial delta incompatible with
//! occlusion-versus-transparency reasoning.

use crate::core::knn::AngularKnn;
use crate::core::spherical::convert_to_spherical;
use crate::core::types::{
    DESCRIPTOR_NORMALS, DESCRIPTOR_PROBABILITY_DYNAMIC, PointCloud, RigidTransform,
};
use crate::error::{MapperError, Result};

const EPS: f32 = 1e-4;

/// Parameters of the dynamic-probability update.
#[derive(Debug, Clone, Copy)]
pub struct DynamicUpdateConfig {
    /// Sensor range; map points beyond it are not re-observable.
    pub sensor_max_range: f32,
    /// Probability above which a point is pinned as dynamic.
    pub threshold_dynamic: f32,
    /// Angular half-width of a beam, radians.
    pub beam_half_angle: f32,
    /// Relative radial tolerance (fraction of the return's range).
    pub epsilon_a: f32,
    /// Absolute radial tolerance, meters.
    pub epsilon_d: f32,
    /// Bayesian mixing weight for static evidence.
    pub alpha: f32,
    /// Bayesian mixing weight for dynamic evidence.
    pub beta: f32,
}

/// Update `map`'s `probabilityDynamic` descriptor in place from the
/// current sweep.
///
/// `input` and `map` are both map-frame clouds; `sensor_pose` locates the
/// sensor that produced `input`. The association between map points and
/// input beams is purely angular, searched in spherical sensor-frame
/// coordinates with a cutoff of twice the beam half-angle; map points with
/// no beam inside the cutoff are left untouched, as are points firmly
/// occluded behind the matched return.
pub(crate) fn update_probabilities(
    input: &PointCloud,
    map: &mut PointCloud,
    sensor_pose: &RigidTransform,
    config: &DynamicUpdateConfig,
) -> Result<()> {
    let input_in_sensor_frame = sensor_pose.inverse().apply(input);
    let input_spherical = convert_to_spherical(&input_in_sensor_frame);

    let map_in_sensor_frame = sensor_pose.inverse().apply(map);
    let mut global_id = Vec::with_capacity(map.point_count());
    for i in 0..map.point_count() {
        if map_in_sensor_frame.point(i).norm() < config.sensor_max_range {
            global_id.push(i);
        }
    }
    let cut_map = map_in_sensor_frame.select_columns(&global_id);
    let cut_spherical = convert_to_spherical(&cut_map);

    let map_normals = cut_map
        .descriptor(DESCRIPTOR_NORMALS)
        .ok_or_else(|| MapperError::Precondition("map has no normals descriptor".into()))?;

    let knn = AngularKnn::from_angles(&input_spherical.angles, 2.0 * config.beam_half_angle);

    let probabilities = map
        .descriptor_mut(DESCRIPTOR_PROBABILITY_DYNAMIC)
        .ok_or_else(|| {
            MapperError::Precondition("map has no probabilityDynamic descriptor".into())
        })?;

    for i in 0..cut_map.point_count() {
        let Some((angular_dist_sq, reading_id)) =
            knn.nearest_within(cut_spherical.angles[(0, i)], cut_spherical.angles[(1, i)])
        else {
            continue;
        };

        let reading_point = input_in_sensor_frame.point(reading_id);
        let map_point = cut_map.point(i);
        let reading_norm = input_spherical.radii[reading_id];
        let map_norm = cut_spherical.radii[i];

        let delta = (&reading_point - &map_point).norm();
        let d_max = config.epsilon_a * reading_norm;

        let normal = map_normals.column(i);
        let w_v = EPS + (1.0 - EPS) * normal.dot(&(map_point / map_norm)).abs();
        let w_d1 =
            EPS + (1.0 - EPS) * (1.0 - angular_dist_sq.sqrt() / (2.0 * config.beam_half_angle));

        let offset = delta - config.epsilon_d;
        let mut w_d2 = 1.0;
        if delta < config.epsilon_d || map_norm > reading_norm {
            w_d2 = EPS;
        } else if offset < d_max {
            w_d2 = EPS + (1.0 - EPS) * offset / d_max;
        }

        let mut w_p2 = EPS;
        if delta < config.epsilon_d {
            w_p2 = 1.0;
        } else if offset < d_max {
            w_p2 = EPS + (1.0 - EPS) * (1.0 - offset / d_max);
        }

        if reading_norm + config.epsilon_d + d_max >= map_norm {
            let map_id = global_id[i];
            let last_dyn = probabilities[(0, map_id)];

            let c1 = 1.0 - w_v * w_d1;
            let c2 = w_v * w_d1;

            let (prob_dynamic, prob_static) = if last_dyn < config.threshold_dynamic {
                (
                    c1 * last_dyn
                        + c2 * w_d2 * ((1.0 - config.alpha) * (1.0 - last_dyn) + config.beta * last_dyn),
                    c1 * (1.0 - last_dyn)
                        + c2 * w_p2
                            * (config.alpha * (1.0 - last_dyn) + (1.0 - config.beta) * last_dyn),
                )
            } else {
                (1.0 - EPS, EPS)
            };

            probabilities[(0, map_id)] = prob_dynamic / (prob_dynamic + prob_static);
        }
    }

    Ok(())
}
