//! Shared map state.

use parking_lot::{Mutex, RwLock};

use crate::core::types::{PointCloud, RigidTransform};

struct MapState {
    map: PointCloud,
    new_map_available: bool,
    is_map_empty: bool,
}

/// Holds the authoritative map and the last estimated sensor pose.
///
/// The map, the new-map flag and the emptiness flag live under one mutex,
/// held only for field reads and the swap. The sensor pose has its own
/// reader-writer lock so publishers never contend with a map commit.
pub struct MapStore {
    state: Mutex<MapState>,
    sensor_pose: RwLock<RigidTransform>,
}

impl MapStore {
    /// Create an empty store for the given Euclidean dimension.
    pub fn new(euclidean_dim: usize) -> Self {
        Self {
            state: Mutex::new(MapState {
                map: PointCloud::new(euclidean_dim),
                new_map_available: false,
                is_map_empty: true,
            }),
            sensor_pose: RwLock::new(RigidTransform::identity(euclidean_dim)),
        }
    }

    /// Snapshot copy of the current map.
    pub fn get_map(&self) -> PointCloud {
        self.state.lock().map.clone()
    }

    /// True iff the map has zero points.
    pub fn is_map_empty(&self) -> bool {
        self.state.lock().is_map_empty
    }

    /// Replace the map, raising the new-map flag.
    pub fn replace_map(&self, new_map: PointCloud) {
        let mut state = self.state.lock();
        state.is_map_empty = new_map.is_empty();
        state.map = new_map;
        state.new_map_available = true;
    }

    /// If a new map is available, copy it into `out`, clear the flag and
    /// return true. Edge-triggered: a second call returns false until the
    /// next replacement.
    pub fn get_new_map(&self, out: &mut PointCloud) -> bool {
        let mut state = self.state.lock();
        if state.new_map_available {
            *out = state.map.clone();
            state.new_map_available = false;
            true
        } else {
            false
        }
    }

    /// Last estimated sensor pose.
    pub fn sensor_pose(&self) -> RigidTransform {
        self.sensor_pose.read().clone()
    }

    /// Record a new sensor pose estimate.
    pub fn set_sensor_pose(&self, pose: RigidTransform) {
        *self.sensor_pose.write() = pose;
    }
}
