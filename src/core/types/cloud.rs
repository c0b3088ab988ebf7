//! Point cloud storage: homogeneous features plus named descriptors.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Descriptor key for per-point surface normals (D×N).
pub const DESCRIPTOR_NORMALS: &str = "normals";

/// Descriptor key for the per-point dynamic probability (1×N).
pub const DESCRIPTOR_PROBABILITY_DYNAMIC: &str = "probabilityDynamic";

/// An ordered collection of N points in D ∈ {2, 3} dimensions.
///
/// Coordinates are stored in homogeneous form: a (D+1)×N `features` matrix
/// whose last row is all ones, so rigid transforms are plain matrix
/// multiplies. Per-point attributes live in `descriptors`, a map from name
/// to a k×N matrix aligned column-for-column with `features`.
///
/// Clouds are value-like: cloning, concatenation and column selection are
/// the normal way to derive new clouds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    features: DMatrix<f32>,
    descriptors: BTreeMap<String, DMatrix<f32>>,
}

impl PointCloud {
    /// Create an empty cloud with the given Euclidean dimension (2 or 3).
    pub fn new(euclidean_dim: usize) -> Self {
        assert!(euclidean_dim == 2 || euclidean_dim == 3);
        Self {
            features: DMatrix::zeros(euclidean_dim + 1, 0),
            descriptors: BTreeMap::new(),
        }
    }

    /// Build a cloud from a D×N coordinate matrix, appending the
    /// homogeneous row of ones.
    pub fn from_coordinates(coordinates: &DMatrix<f32>) -> Self {
        let dim = coordinates.nrows();
        assert!(dim == 2 || dim == 3);
        let n = coordinates.ncols();

        let mut features = DMatrix::zeros(dim + 1, n);
        features.view_mut((0, 0), (dim, n)).copy_from(coordinates);
        features.row_mut(dim).fill(1.0);
        Self {
            features,
            descriptors: BTreeMap::new(),
        }
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.features.ncols()
    }

    /// Check if the cloud has zero points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.ncols() == 0
    }

    /// Euclidean dimension D.
    #[inline]
    pub fn euclidean_dim(&self) -> usize {
        self.features.nrows() - 1
    }

    /// Homogeneous dimension D+1.
    #[inline]
    pub fn homogeneous_dim(&self) -> usize {
        self.features.nrows()
    }

    /// The (D+1)×N homogeneous feature matrix.
    #[inline]
    pub fn features(&self) -> &DMatrix<f32> {
        &self.features
    }

    /// Replace the feature matrix. Shape must stay (D+1)×N.
    pub(crate) fn set_features(&mut self, features: DMatrix<f32>) {
        assert_eq!(features.nrows(), self.features.nrows());
        assert_eq!(features.ncols(), self.features.ncols());
        self.features = features;
    }

    /// Euclidean coordinates of point `i` (the first D rows of column `i`).
    pub fn point(&self, i: usize) -> DVector<f32> {
        let dim = self.euclidean_dim();
        DVector::from_fn(dim, |row, _| self.features[(row, i)])
    }

    /// The D×N Euclidean coordinate block.
    pub fn coordinates(&self) -> DMatrix<f32> {
        let dim = self.euclidean_dim();
        self.features.view((0, 0), (dim, self.point_count())).into_owned()
    }

    /// Copy column `src_index` of `source` (features and every descriptor
    /// present in both clouds) into column `dst_index` of `self`.
    pub fn set_column_from(&mut self, dst_index: usize, source: &PointCloud, src_index: usize) {
        self.features
            .set_column(dst_index, &source.features.column(src_index));
        for (name, descriptor) in &mut self.descriptors {
            if let Some(src_descriptor) = source.descriptors.get(name) {
                descriptor.set_column(dst_index, &src_descriptor.column(src_index));
            }
        }
    }

    /// Shrink the cloud to its first `count` columns, keeping descriptors
    /// aligned.
    pub fn conservative_resize(&mut self, count: usize) {
        assert!(count <= self.point_count());
        self.features = self.features.columns(0, count).into_owned();
        for descriptor in self.descriptors.values_mut() {
            *descriptor = descriptor.columns(0, count).into_owned();
        }
    }

    /// A zero-filled cloud with the same column count, dimension and
    /// descriptor layout as `self`. Pair with [`Self::set_column_from`]
    /// and [`Self::conservative_resize`] to assemble filtered copies.
    pub fn create_similar_empty(&self) -> PointCloud {
        let descriptors = self
            .descriptors
            .iter()
            .map(|(name, d)| (name.clone(), DMatrix::zeros(d.nrows(), self.point_count())))
            .collect();
        PointCloud {
            features: DMatrix::zeros(self.homogeneous_dim(), self.point_count()),
            descriptors,
        }
    }

    /// Select the given columns, in the given order, into a new cloud.
    ///
    /// Descriptors are carried along, so passing a subsequence of indices
    /// yields a shape-preserving subsequence of the cloud.
    pub fn select_columns(&self, indices: &[usize]) -> PointCloud {
        let mut out = self.create_similar_empty();
        for (dst, &src) in indices.iter().enumerate() {
            out.set_column_from(dst, self, src);
        }
        out.conservative_resize(indices.len());
        out
    }

    /// Append `other`'s points to this cloud.
    ///
    /// Descriptors present in only one of the clouds cannot stay aligned
    /// and are dropped with a warning.
    pub fn concatenate(&mut self, other: &PointCloud) {
        assert_eq!(self.homogeneous_dim(), other.homogeneous_dim());

        let n_self = self.point_count();
        let n_other = other.point_count();
        let rows = self.homogeneous_dim();

        let mut features = DMatrix::zeros(rows, n_self + n_other);
        features
            .view_mut((0, 0), (rows, n_self))
            .copy_from(&self.features);
        features
            .view_mut((0, n_self), (rows, n_other))
            .copy_from(&other.features);
        self.features = features;

        let shared: Vec<String> = self
            .descriptors
            .keys()
            .filter(|name| other.descriptors.contains_key(*name))
            .cloned()
            .collect();
        for name in self.descriptors.keys() {
            if !other.descriptors.contains_key(name) {
                log::warn!("dropping descriptor {name} on concatenation: missing from appended cloud");
            }
        }

        let mut descriptors = BTreeMap::new();
        for name in shared {
            let a = &self.descriptors[&name];
            let b = &other.descriptors[&name];
            assert_eq!(a.nrows(), b.nrows());
            let mut merged = DMatrix::zeros(a.nrows(), n_self + n_other);
            merged.view_mut((0, 0), (a.nrows(), n_self)).copy_from(a);
            merged
                .view_mut((0, n_self), (b.nrows(), n_other))
                .copy_from(b);
            descriptors.insert(name, merged);
        }
        self.descriptors = descriptors;
    }

    /// Add or replace a named descriptor. Column count must match.
    pub fn add_descriptor(&mut self, name: &str, values: DMatrix<f32>) {
        assert_eq!(values.ncols(), self.point_count());
        self.descriptors.insert(name.to_string(), values);
    }

    /// Check whether a descriptor exists.
    #[inline]
    pub fn has_descriptor(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Borrow a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&DMatrix<f32>> {
        self.descriptors.get(name)
    }

    /// Mutably borrow a descriptor by name.
    pub fn descriptor_mut(&mut self, name: &str) -> Option<&mut DMatrix<f32>> {
        self.descriptors.get_mut(name)
    }
}
