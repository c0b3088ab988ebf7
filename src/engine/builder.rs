//! Map construction and the single-slot build worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nalgebra::DMatrix;

use crate::core::types::{DESCRIPTOR_PROBABILITY_DYNAMIC, PointCloud, RigidTransform};
use crate::error::Result;
use crate::mapping::{dynamic, novelty};

use super::mapper::MapperShared;

/// Produce and commit the next map from by-value snapshots.
///
/// Steps: seed the dynamic prior on the input, fold the sweep's evidence
/// into the existing map's probabilities, merge the novel input points,
/// post-filter in the sensor frame (so range- and ray-dependent filters
/// see the origin at the sensor), and commit via the shared map setter.
pub(crate) fn build_map(
    shared: &MapperShared,
    mut current_input: PointCloud,
    mut current_map: PointCloud,
    current_sensor_pose: RigidTransform,
) -> Result<()> {
    if shared.config.compute_prob_dynamic {
        current_input.add_descriptor(
            DESCRIPTOR_PROBABILITY_DYNAMIC,
            DMatrix::from_element(1, current_input.point_count(), shared.config.prior_dynamic),
        );
    }

    if current_map.is_empty() {
        current_map = current_input;
    } else {
        if shared.config.compute_prob_dynamic {
            dynamic::update_probabilities(
                &current_input,
                &mut current_map,
                &current_sensor_pose,
                &shared.dynamic_update_config(),
            )?;
        }

        let input_points_to_keep = novelty::retain_novel_points(
            &current_input,
            &current_map,
            &current_sensor_pose,
            &shared.radius_filter,
            shared.config.min_dist_new_point,
        )?;
        current_map.concatenate(&input_points_to_keep);
    }

    let mut map_in_sensor_frame = current_sensor_pose.inverse().apply(&current_map);
    shared
        .filters
        .read()
        .map_post
        .apply(&mut map_in_sensor_frame)?;
    current_map = current_sensor_pose.apply(&map_in_sensor_frame);

    shared.set_map(current_map, &current_sensor_pose)?;

    log::debug!(
        "map updated: {} points",
        shared.store.get_map().point_count()
    );
    Ok(())
}

/// At most one build runs at a time; while it runs, new observations
/// contribute to registration only. The update policy's busy guard keeps
/// a second build from ever being queued, so this slot never blocks.
pub(crate) struct BuilderSlot {
    handle: Option<JoinHandle<()>>,
}

impl BuilderSlot {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Non-blocking poll: is a build still running?
    pub fn is_busy(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn a build over by-value snapshots.
    ///
    /// A failed build only loses that build: the map is committed solely
    /// on success, and the slot clears when the thread exits.
    pub fn spawn(
        &mut self,
        shared: Arc<MapperShared>,
        input: PointCloud,
        map: PointCloud,
        sensor_pose: RigidTransform,
    ) {
        // Reap the previous, already-finished worker.
        self.wait();

        let handle = thread::Builder::new()
            .name("map-builder".into())
            .spawn(move || {
                if let Err(e) = build_map(&shared, input, map, sensor_pose) {
                    log::warn!("map build failed: {e}");
                }
            })
            .expect("failed to spawn map-builder thread");
        self.handle = Some(handle);
    }

    /// Join the outstanding build, if any.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("map-builder thread panicked");
        }
    }
}

impl Drop for BuilderSlot {
    fn drop(&mut self) {
        self.wait();
    }
}
