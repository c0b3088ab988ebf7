//! NakshaMapper - incremental 2D/3D point-cloud mapping around ICP.
//!
//! Given a stream of sensor-frame point clouds, each with an
//! odometry-based pose guess, the engine registers every cloud against a
//! running map, corrects the pose, and fuses new observations into the
//! map under a configurable update policy. Optionally it maintains a
//! per-map-point probability that the point belongs to a dynamic (moving)
//! obstacle, updated by an angular nearest-neighbour association between
//! map points and input beams.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Mapper, build worker
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   mapping/                          │  ← store, novelty,
//! │                                                     │    dynamic points, policy
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │          matching/          preprocessing/          │  ← ICP, filter chains
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← clouds, transforms,
//! │                                                     │    k-NN, spherical coords
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Threads
//!
//! [`Mapper::process_input`] runs on the caller's thread, one call at a
//! time. In online mode map builds run on a single background worker; at
//! most one build is in flight, and observations arriving while it runs
//! contribute to registration only. Publisher threads read the map and
//! pose concurrently through [`MapperHandle`].
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use nalgebra::DMatrix;
//! use naksha_mapper::{Mapper, MapperConfig, PointCloud, RigidTransform};
//!
//! # fn main() -> naksha_mapper::Result<()> {
//! let config = MapperConfig {
//!     is_online: false,
//!     ..MapperConfig::default()
//! };
//! let mut mapper = Mapper::new(config)?;
//!
//! // One sweep from the sensor driver, plus an odometry pose guess.
//! let coords = DMatrix::from_fn(3, 50, |row, col| {
//!     if row == 0 { col as f32 * 0.1 } else { 1.0 }
//! });
//! let mut cloud = PointCloud::from_coordinates(&coords);
//! let pose_guess = RigidTransform::identity(3);
//!
//! mapper.process_input(&mut cloud, &pose_guess, Instant::now())?;
//! assert!(!mapper.get_map().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod matching;
pub mod preprocessing;

// Convenience re-exports.
pub use config::MapperConfig;
pub use crate::core::knn::{AngularKnn, KnnIndex};
pub use crate::core::types::{
    DESCRIPTOR_NORMALS, DESCRIPTOR_PROBABILITY_DYNAMIC, PointCloud, RigidTransform,
};
pub use engine::{Mapper, MapperHandle};
pub use error::{MapperError, Result};
pub use mapping::policy::UpdateCondition;
pub use mapping::store::MapStore;
pub use matching::{Icp, IcpConfig};
pub use preprocessing::{
    BoundingBoxFilter, CloudFilter, DistanceLimitFilter, FilterChain, FilterSpec,
    RandomSamplingFilter, SurfaceNormalsFilter, VoxelGridFilter,
};
