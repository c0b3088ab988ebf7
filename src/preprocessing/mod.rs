//! Configurable point-cloud filter chains.
//!
//! The engine owns four chains: the sensor-frame input chain, the
//! world-frame input chain, the map post-filter chain, and the hard-wired
//! sensor-range radius filter. Chains are ordered lists of filters loaded
//! from YAML; an absent configuration yields an empty, no-op chain.
//!
//! ```yaml
//! - type: distance_limit
//!   max_distance: 10.0
//! - type: surface_normals
//!   knn: 10
//! ```

mod bounding_box;
mod distance_limit;
mod random_sampling;
mod surface_normals;
mod voxel_grid;

pub use bounding_box::BoundingBoxFilter;
pub use distance_limit::DistanceLimitFilter;
pub use random_sampling::RandomSamplingFilter;
pub use surface_normals::SurfaceNormalsFilter;
pub use voxel_grid::VoxelGridFilter;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud;
use crate::error::Result;

/// A point-cloud filter applied in place.
pub trait CloudFilter: Send + Sync {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()>;
}

/// Declarative filter description, one YAML list entry per filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    DistanceLimit {
        #[serde(default)]
        min_distance: f32,
        max_distance: f32,
    },
    BoundingBox {
        min: Vec<f32>,
        max: Vec<f32>,
        #[serde(default)]
        remove_inside: bool,
    },
    RandomSampling {
        prob: f32,
    },
    VoxelGrid {
        voxel_size: f32,
    },
    SurfaceNormals {
        #[serde(default = "default_normal_knn")]
        knn: usize,
    },
}

fn default_normal_knn() -> usize {
    10
}

impl FilterSpec {
    fn build(&self) -> Box<dyn CloudFilter> {
        match self {
            FilterSpec::DistanceLimit {
                min_distance,
                max_distance,
            } => Box::new(DistanceLimitFilter::new(*min_distance, *max_distance)),
            FilterSpec::BoundingBox {
                min,
                max,
                remove_inside,
            } => Box::new(BoundingBoxFilter::new(
                min.clone(),
                max.clone(),
                *remove_inside,
            )),
            FilterSpec::RandomSampling { prob } => Box::new(RandomSamplingFilter::new(*prob)),
            FilterSpec::VoxelGrid { voxel_size } => Box::new(VoxelGridFilter::new(*voxel_size)),
            FilterSpec::SurfaceNormals { knn } => Box::new(SurfaceNormalsFilter::new(*knn)),
        }
    }
}

/// An ordered chain of filters applied front to back.
pub struct FilterChain {
    filters: Vec<Box<dyn CloudFilter>>,
}

impl FilterChain {
    /// An empty, no-op chain.
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Build a chain from declarative specs.
    pub fn from_specs(specs: &[FilterSpec]) -> Self {
        Self {
            filters: specs.iter().map(FilterSpec::build).collect(),
        }
    }

    /// Parse a chain from a YAML list of filter specs.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let specs: Vec<FilterSpec> = serde_yaml::from_str(yaml)?;
        Ok(Self::from_specs(&specs))
    }

    /// Load a chain from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the chain is a no-op.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply every filter, in order, to the cloud.
    pub fn apply(&self, cloud: &mut PointCloud) -> Result<()> {
        for filter in &self.filters {
            filter.filter_in_place(cloud)?;
        }
        Ok(())
    }
}

/// Collect the indices of points a predicate keeps, then rebuild the cloud
/// from those columns. Shared scaffolding for the selection filters.
pub(crate) fn retain_columns<F>(cloud: &mut PointCloud, mut keep: F)
where
    F: FnMut(usize) -> bool,
{
    let kept: Vec<usize> = (0..cloud.point_count()).filter(|&i| keep(i)).collect();
    if kept.len() != cloud.point_count() {
        *cloud = cloud.select_columns(&kept);
    }
}
