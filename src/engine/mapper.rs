//! The mapper: registration loop and public API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::MapperConfig;
use crate::core::types::{DESCRIPTOR_NORMALS, PointCloud, RigidTransform};
use crate::error::{MapperError, Result};
use crate::mapping::crop_to_sensor_range;
use crate::mapping::dynamic::DynamicUpdateConfig;
use crate::mapping::policy::{UpdateCondition, UpdatePolicy};
use crate::mapping::store::MapStore;
use crate::matching::{Icp, IcpConfig};
use crate::preprocessing::{CloudFilter, DistanceLimitFilter, FilterChain};

use super::builder::{BuilderSlot, build_map};

/// The three reloadable filter chains.
pub(crate) struct FilterSet {
    pub input: FilterChain,
    pub input_world: FilterChain,
    pub map_post: FilterChain,
}

impl FilterSet {
    fn load(config: &MapperConfig) -> Result<Self> {
        Ok(Self {
            input: load_chain(&config.input_filters_config)?,
            input_world: load_chain(&config.input_filters_world_config)?,
            map_post: load_chain(&config.map_post_filters_config)?,
        })
    }
}

fn load_chain(path: &Option<PathBuf>) -> Result<FilterChain> {
    match path {
        Some(path) => FilterChain::load(path),
        None => Ok(FilterChain::empty()),
    }
}

fn load_icp_config(path: &Option<PathBuf>) -> Result<IcpConfig> {
    match path {
        Some(path) => IcpConfig::load(path),
        None => Ok(IcpConfig::default()),
    }
}

/// State shared between the caller thread, the build worker and
/// publisher handles.
pub(crate) struct MapperShared {
    pub config: MapperConfig,
    pub filters: RwLock<FilterSet>,
    pub radius_filter: DistanceLimitFilter,
    pub icp: Mutex<Icp>,
    pub store: MapStore,
}

impl MapperShared {
    /// Commit a new map: crop it to sensor range, swap the crop into the
    /// ICP reference, then publish the full map to the store.
    ///
    /// The two locks are taken one after the other, never together.
    pub fn set_map(&self, new_map: PointCloud, sensor_pose: &RigidTransform) -> Result<()> {
        if self.config.compute_prob_dynamic && !new_map.has_descriptor(DESCRIPTOR_NORMALS) {
            return Err(MapperError::Precondition(
                "compute_prob_dynamic is enabled, but the map has no normals descriptor".into(),
            ));
        }

        let cut_map = crop_to_sensor_range(&new_map, sensor_pose, &self.radius_filter)?;

        self.icp.lock().set_reference(cut_map);
        self.store.replace_map(new_map);
        Ok(())
    }

    pub fn dynamic_update_config(&self) -> DynamicUpdateConfig {
        DynamicUpdateConfig {
            sensor_max_range: self.config.sensor_max_range,
            threshold_dynamic: self.config.threshold_dynamic,
            beam_half_angle: self.config.beam_half_angle,
            epsilon_a: self.config.epsilon_a,
            epsilon_d: self.config.epsilon_d,
            alpha: self.config.alpha,
            beta: self.config.beta,
        }
    }
}

/// Cloneable read-side handle for publisher threads.
#[derive(Clone)]
pub struct MapperHandle {
    shared: Arc<MapperShared>,
}

impl MapperHandle {
    /// Snapshot copy of the current map.
    pub fn get_map(&self) -> PointCloud {
        self.shared.store.get_map()
    }

    /// Edge-triggered new-map poll; see [`Mapper::get_new_map`].
    pub fn get_new_map(&self, out: &mut PointCloud) -> bool {
        self.shared.store.get_new_map(out)
    }

    /// Last ICP-corrected sensor pose.
    pub fn get_sensor_pose(&self) -> RigidTransform {
        self.shared.store.sensor_pose()
    }
}

/// Incremental ICP mapper.
///
/// Feed it sensor-frame clouds with odometry pose guesses via
/// [`Mapper::process_input`]; it refines each guess against the running
/// map and, update policy permitting, fuses the observation into the map
/// — synchronously, or on a single background worker in online mode.
///
/// `process_input` is meant to be called from one thread at a time;
/// publisher threads read concurrently through [`Mapper::handle`].
pub struct Mapper {
    shared: Arc<MapperShared>,
    builder: BuilderSlot,
    policy: UpdatePolicy,
    last_update_time: Option<Instant>,
    last_update_pose: RigidTransform,
}

impl Mapper {
    /// Build a mapper from a validated configuration, loading the filter
    /// chains and ICP settings from their configured paths.
    pub fn new(config: MapperConfig) -> Result<Self> {
        config.validate()?;

        let condition = UpdateCondition::parse(&config.map_update_condition)?;
        let dim = config.euclidean_dim();

        let filters = FilterSet::load(&config)?;
        let icp = Icp::new(load_icp_config(&config.icp_config)?);

        let policy = UpdatePolicy {
            condition,
            overlap_threshold: config.map_update_overlap,
            delay: Duration::from_secs_f32(config.map_update_delay),
            distance: config.map_update_distance,
            is_mapping: config.is_mapping,
            is_online: config.is_online,
        };

        let shared = Arc::new(MapperShared {
            radius_filter: DistanceLimitFilter::with_max_distance(config.sensor_max_range),
            filters: RwLock::new(filters),
            icp: Mutex::new(icp),
            store: MapStore::new(dim),
            config,
        });

        Ok(Self {
            shared,
            builder: BuilderSlot::new(),
            policy,
            last_update_time: None,
            last_update_pose: RigidTransform::identity(dim),
        })
    }

    /// Register one observation and possibly fold it into the map.
    ///
    /// `input_in_sensor_frame` is filtered in place by the radius filter
    /// and the sensor-frame input chain; the map-frame copy used for
    /// registration passes through the world-frame chain first. On an ICP
    /// failure the error propagates and neither the pose nor the map is
    /// touched; the next observation is an independent attempt.
    pub fn process_input(
        &mut self,
        input_in_sensor_frame: &mut PointCloud,
        estimated_sensor_pose: &RigidTransform,
        timestamp: Instant,
    ) -> Result<()> {
        let dim = self.shared.config.euclidean_dim();
        if input_in_sensor_frame.euclidean_dim() != dim {
            return Err(MapperError::Precondition(format!(
                "input is {}-dimensional but the mapper expects {}-dimensional clouds",
                input_in_sensor_frame.euclidean_dim(),
                dim
            )));
        }

        let mut input_in_map_frame = estimated_sensor_pose.apply(input_in_sensor_frame);
        self.shared
            .filters
            .read()
            .input_world
            .apply(&mut input_in_map_frame)?;

        self.shared
            .radius_filter
            .filter_in_place(input_in_sensor_frame)?;
        self.shared
            .filters
            .read()
            .input
            .apply(input_in_sensor_frame)?;

        if self.shared.store.is_map_empty() {
            self.shared
                .store
                .set_sensor_pose(estimated_sensor_pose.clone());
            return self.update_map(input_in_map_frame, timestamp);
        }

        let (correction, overlap) = {
            let mut icp = self.shared.icp.lock();
            let correction = icp.register(&input_in_map_frame)?;
            (correction, icp.overlap())
        };

        let sensor_pose = correction.compose(estimated_sensor_pose);
        self.shared.store.set_sensor_pose(sensor_pose.clone());

        if self.policy.should_update(
            timestamp,
            &sensor_pose,
            overlap,
            self.builder.is_busy(),
            self.last_update_time,
            &self.last_update_pose,
        ) {
            // The builder gets the input re-expressed in the corrected
            // map frame.
            return self.update_map(correction.apply(&input_in_map_frame), timestamp);
        }

        Ok(())
    }

    /// Record policy bookkeeping, then dispatch the build — on the worker
    /// in online mode (except for the very first build), synchronously
    /// otherwise.
    fn update_map(&mut self, current_input: PointCloud, timestamp: Instant) -> Result<()> {
        self.last_update_time = Some(timestamp);
        self.last_update_pose = self.shared.store.sensor_pose();

        if self.shared.config.is_online && !self.shared.store.is_map_empty() {
            self.builder.spawn(
                Arc::clone(&self.shared),
                current_input,
                self.shared.store.get_map(),
                self.shared.store.sensor_pose(),
            );
            Ok(())
        } else {
            build_map(
                &self.shared,
                current_input,
                self.shared.store.get_map(),
                self.shared.store.sensor_pose(),
            )
        }
    }

    /// Snapshot copy of the current map.
    pub fn get_map(&self) -> PointCloud {
        self.shared.store.get_map()
    }

    /// Seed or override the map.
    ///
    /// With `compute_prob_dynamic` enabled the map must carry a `normals`
    /// descriptor. The ICP reference is re-cropped around `sensor_pose`.
    pub fn set_map(&mut self, map: PointCloud, sensor_pose: &RigidTransform) -> Result<()> {
        self.shared.set_map(map, sensor_pose)
    }

    /// If the map changed since the last call, copy it into `out`, clear
    /// the flag and return true.
    pub fn get_new_map(&self, out: &mut PointCloud) -> bool {
        self.shared.store.get_new_map(out)
    }

    /// Last ICP-corrected sensor pose.
    pub fn get_sensor_pose(&self) -> RigidTransform {
        self.shared.store.sensor_pose()
    }

    /// Re-read the filter chains and ICP settings from their configured
    /// paths.
    pub fn load_yaml_config(&mut self) -> Result<()> {
        let filters = FilterSet::load(&self.shared.config)?;
        let icp_config = load_icp_config(&self.shared.config.icp_config)?;

        *self.shared.filters.write() = filters;
        self.shared.icp.lock().set_config(icp_config);
        Ok(())
    }

    /// Cloneable read-side handle for publisher threads.
    pub fn handle(&self) -> MapperHandle {
        MapperHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Join an outstanding background build, if any.
    pub fn wait_for_idle(&mut self) {
        self.builder.wait();
    }
}
