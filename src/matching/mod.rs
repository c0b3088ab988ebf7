//! Point-to-point ICP registration against a settable reference map.
//!
//! The operator owns the reference cloud and its k-d tree; the engine
//! swaps the reference on every map commit and calls [`Icp::register`]
//! with the incoming cloud already expressed in the map frame, so the
//! initial guess is always the identity and the result is a small
//! correction transform.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::core::knn::KnnIndex;
use crate::core::types::{PointCloud, RigidTransform};
use crate::error::{MapperError, Result};

/// Configuration for the ICP registration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of iterations.
    pub max_iterations: u32,

    /// Convergence threshold on the incremental translation (meters).
    pub translation_epsilon: f32,

    /// Convergence threshold on the incremental rotation (radians).
    pub rotation_epsilon: f32,

    /// Maximum correspondence distance (meters). Pairs farther apart are
    /// rejected, and the overlap estimate counts only pairs within it.
    pub max_correspondence_distance: f32,

    /// Minimum number of valid correspondences; fewer fails the match.
    pub min_correspondences: usize,

    /// Fraction of the worst correspondences trimmed each iteration.
    pub outlier_ratio: f32,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            translation_epsilon: 0.001,
            rotation_epsilon: 0.001,
            max_correspondence_distance: 0.5,
            min_correspondences: 10,
            outlier_ratio: 0.1,
        }
    }
}

impl IcpConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

struct Reference {
    cloud: PointCloud,
    index: KnnIndex,
}

/// Iterative closest point operator.
pub struct Icp {
    config: IcpConfig,
    reference: Option<Reference>,
    last_overlap: f32,
}

impl Icp {
    /// Create an operator with the given configuration.
    pub fn new(config: IcpConfig) -> Self {
        Self {
            config,
            reference: None,
            last_overlap: 0.0,
        }
    }

    /// Reset the configuration to defaults.
    pub fn set_default(&mut self) {
        self.config = IcpConfig::default();
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: IcpConfig) {
        self.config = config;
    }

    /// Current configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Replace the reference cloud the operator aligns against.
    pub fn set_reference(&mut self, cloud: PointCloud) {
        let index = KnnIndex::from_coordinates(&cloud.coordinates());
        self.reference = Some(Reference { cloud, index });
    }

    /// The current reference cloud, if one was set.
    pub fn reference(&self) -> Option<&PointCloud> {
        self.reference.as_ref().map(|r| &r.cloud)
    }

    /// Overlap of the last successful registration: the fraction of input
    /// points whose nearest reference neighbour, at the converged pose,
    /// lies within the correspondence distance. In [0, 1].
    pub fn overlap(&self) -> f32 {
        self.last_overlap
    }

    /// Align `input` (already in the reference frame) to the reference.
    ///
    /// Returns the correction transform that maps the input onto the map.
    pub fn register(&mut self, input: &PointCloud) -> Result<RigidTransform> {
        let reference = self
            .reference
            .as_ref()
            .ok_or_else(|| MapperError::Registration("no reference map set".into()))?;
        if reference.cloud.is_empty() {
            return Err(MapperError::Registration("reference map is empty".into()));
        }
        if input.is_empty() {
            return Err(MapperError::Registration("input cloud is empty".into()));
        }
        let dim = reference.cloud.euclidean_dim();
        if input.euclidean_dim() != dim {
            return Err(MapperError::Registration(format!(
                "input is {}-dimensional but reference is {}-dimensional",
                input.euclidean_dim(),
                dim
            )));
        }

        let max_dist_sq = self.config.max_correspondence_distance.powi(2);
        let reference_coords = reference.cloud.coordinates();
        let input_features = input.features();
        let n = input.point_count();

        let mut current = RigidTransform::identity(dim);
        let mut converged = false;
        let mut last_mse = f32::MAX;

        for _ in 0..self.config.max_iterations {
            let transformed = current.matrix() * input_features;

            let mut correspondences: Vec<(usize, usize, f32)> = Vec::with_capacity(n);
            let mut query = vec![0.0f32; dim];
            for i in 0..n {
                for row in 0..dim {
                    query[row] = transformed[(row, i)];
                }
                if let Some((dist_sq, j)) = reference.index.nearest_one(&query)
                    && dist_sq <= max_dist_sq
                {
                    correspondences.push((i, j, dist_sq));
                }
            }

            if correspondences.len() < self.config.min_correspondences {
                return Err(MapperError::Registration(format!(
                    "only {} correspondences within {} m",
                    correspondences.len(),
                    self.config.max_correspondence_distance
                )));
            }

            if self.config.outlier_ratio > 0.0 {
                correspondences.sort_by(|a, b| a.2.total_cmp(&b.2));
                let keep =
                    ((1.0 - self.config.outlier_ratio) * correspondences.len() as f32) as usize;
                correspondences.truncate(keep.max(self.config.min_correspondences));
            }

            let delta = compute_alignment(&transformed, &reference_coords, &correspondences, dim);

            let translation_change = delta.translation().norm();
            let rotation_change = rotation_angle(&delta);
            current = delta.compose(&current);

            if translation_change < self.config.translation_epsilon
                && rotation_change < self.config.rotation_epsilon
            {
                converged = true;
                break;
            }

            let mse = mean_squared_error(
                &(current.matrix() * input_features),
                &reference_coords,
                &correspondences,
                dim,
            );
            if mse > last_mse * 1.1 {
                break;
            }
            last_mse = mse;
        }

        if !converged {
            log::debug!("icp stopped before convergence after {} iterations", self.config.max_iterations);
        }

        // Overlap at the final pose, over the whole input.
        let transformed = current.matrix() * input_features;
        let mut in_range = 0usize;
        let mut query = vec![0.0f32; dim];
        for i in 0..n {
            for row in 0..dim {
                query[row] = transformed[(row, i)];
            }
            if let Some((dist_sq, _)) = reference.index.nearest_one(&query)
                && dist_sq <= max_dist_sq
            {
                in_range += 1;
            }
        }
        self.last_overlap = in_range as f32 / n as f32;

        Ok(current)
    }
}

/// Closed-form rigid alignment of matched pairs (Kabsch, SVD), returning
/// the incremental transform that moves the sources onto the targets.
fn compute_alignment(
    transformed: &DMatrix<f32>,
    reference_coords: &DMatrix<f32>,
    correspondences: &[(usize, usize, f32)],
    dim: usize,
) -> RigidTransform {
    let count = correspondences.len() as f32;

    let mut source_centroid = DVector::<f32>::zeros(dim);
    let mut target_centroid = DVector::<f32>::zeros(dim);
    for &(i, j, _) in correspondences {
        for row in 0..dim {
            source_centroid[row] += transformed[(row, i)];
            target_centroid[row] += reference_coords[(row, j)];
        }
    }
    source_centroid /= count;
    target_centroid /= count;

    let mut cross_covariance = DMatrix::<f32>::zeros(dim, dim);
    for &(i, j, _) in correspondences {
        let mut source_centered = DVector::<f32>::zeros(dim);
        let mut target_centered = DVector::<f32>::zeros(dim);
        for row in 0..dim {
            source_centered[row] = transformed[(row, i)] - source_centroid[row];
            target_centered[row] = reference_coords[(row, j)] - target_centroid[row];
        }
        cross_covariance += source_centered * target_centered.transpose();
    }

    let svd = cross_covariance.svd(true, true);
    let u = svd.u.expect("SVD of cross covariance");
    let v_t = svd.v_t.expect("SVD of cross covariance");

    let mut rotation = v_t.transpose() * u.transpose();
    if rotation.determinant() < 0.0 {
        let mut v = v_t.transpose();
        let last = dim - 1;
        for row in 0..dim {
            v[(row, last)] = -v[(row, last)];
        }
        rotation = v * u.transpose();
    }

    let translation = target_centroid - &rotation * source_centroid;

    let mut matrix = DMatrix::identity(dim + 1, dim + 1);
    matrix.view_mut((0, 0), (dim, dim)).copy_from(&rotation);
    matrix.view_mut((0, dim), (dim, 1)).copy_from(&translation);
    RigidTransform::from_matrix(matrix)
}

fn rotation_angle(transform: &RigidTransform) -> f32 {
    let rotation = transform.rotation();
    match transform.euclidean_dim() {
        2 => rotation[(1, 0)].atan2(rotation[(0, 0)]).abs(),
        _ => {
            let trace = rotation[(0, 0)] + rotation[(1, 1)] + rotation[(2, 2)];
            (((trace - 1.0) / 2.0).clamp(-1.0, 1.0)).acos()
        }
    }
}

fn mean_squared_error(
    transformed: &DMatrix<f32>,
    reference_coords: &DMatrix<f32>,
    correspondences: &[(usize, usize, f32)],
    dim: usize,
) -> f32 {
    if correspondences.is_empty() {
        return f32::MAX;
    }
    let mut sum = 0.0f32;
    for &(i, j, _) in correspondences {
        for row in 0..dim {
            let diff = transformed[(row, i)] - reference_coords[(row, j)];
            sum += diff * diff;
        }
    }
    sum / correspondences.len() as f32
}
