//! Rigid transforms in homogeneous coordinates.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::cloud::{DESCRIPTOR_NORMALS, PointCloud};

/// A rigid transform as a (D+1)×(D+1) homogeneous matrix, D ∈ {2, 3}.
///
/// Composition is matrix product; the inverse uses the rigid closed form
/// (Rᵀ, −Rᵀt). Applying a transform to a [`PointCloud`] multiplies the
/// homogeneous features and rotates direction-valued descriptors
/// (`normals`) by the rotation block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    matrix: DMatrix<f32>,
}

impl RigidTransform {
    /// Identity transform for the given Euclidean dimension (2 or 3).
    pub fn identity(euclidean_dim: usize) -> Self {
        assert!(euclidean_dim == 2 || euclidean_dim == 3);
        Self {
            matrix: DMatrix::identity(euclidean_dim + 1, euclidean_dim + 1),
        }
    }

    /// Wrap a homogeneous matrix. Must be square of size 3 or 4.
    pub fn from_matrix(matrix: DMatrix<f32>) -> Self {
        assert!(matrix.is_square());
        assert!(matrix.nrows() == 3 || matrix.nrows() == 4);
        Self { matrix }
    }

    /// Pure translation for the given Euclidean dimension.
    pub fn from_translation(translation: &[f32]) -> Self {
        let dim = translation.len();
        let mut matrix = DMatrix::identity(dim + 1, dim + 1);
        for (row, &value) in translation.iter().enumerate() {
            matrix[(row, dim)] = value;
        }
        Self::from_matrix(matrix)
    }

    /// Euclidean dimension D.
    #[inline]
    pub fn euclidean_dim(&self) -> usize {
        self.matrix.nrows() - 1
    }

    /// The underlying homogeneous matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f32> {
        &self.matrix
    }

    /// Rotation block (D×D).
    pub fn rotation(&self) -> DMatrix<f32> {
        let dim = self.euclidean_dim();
        self.matrix.view((0, 0), (dim, dim)).into_owned()
    }

    /// Translation column (first D rows of the last column).
    pub fn translation(&self) -> DVector<f32> {
        let dim = self.euclidean_dim();
        DVector::from_fn(dim, |row, _| self.matrix[(row, dim)])
    }

    /// Compose two transforms: `self ∘ other` (matrix product).
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            matrix: &self.matrix * &other.matrix,
        }
    }

    /// Inverse transform, using the rigid closed form.
    pub fn inverse(&self) -> RigidTransform {
        let dim = self.euclidean_dim();
        let rotation_t = self.rotation().transpose();
        let translation = self.translation();
        let inv_translation = -&rotation_t * translation;

        let mut matrix = DMatrix::identity(dim + 1, dim + 1);
        matrix.view_mut((0, 0), (dim, dim)).copy_from(&rotation_t);
        matrix
            .view_mut((0, dim), (dim, 1))
            .copy_from(&inv_translation);
        RigidTransform { matrix }
    }

    /// Re-orthonormalize the rotation block.
    ///
    /// Accumulated float error can drift the rotation away from SO(D);
    /// this projects it back via SVD (R := U·Vᵀ, with a reflection fix on
    /// the last singular direction when det < 0).
    pub fn corrected(&self) -> RigidTransform {
        let dim = self.euclidean_dim();
        let svd = self.rotation().svd(true, true);
        let u = svd.u.expect("SVD of rotation block");
        let v_t = svd.v_t.expect("SVD of rotation block");

        let mut rotation = &u * &v_t;
        if rotation.determinant() < 0.0 {
            let mut u_fixed = u;
            let last = dim - 1;
            for row in 0..dim {
                u_fixed[(row, last)] = -u_fixed[(row, last)];
            }
            rotation = &u_fixed * &v_t;
        }

        let mut matrix = self.matrix.clone();
        matrix.view_mut((0, 0), (dim, dim)).copy_from(&rotation);
        RigidTransform { matrix }
    }

    /// Apply the transform to a point cloud, returning a new cloud.
    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        let mut out = cloud.clone();
        self.apply_in_place(&mut out);
        out
    }

    /// Apply the transform to a point cloud in place.
    ///
    /// Rotates the `normals` descriptor, if present, so direction-valued
    /// data stays consistent with the coordinates.
    pub fn apply_in_place(&self, cloud: &mut PointCloud) {
        let features = &self.matrix * cloud.features();
        cloud.set_features(features);

        if cloud.has_descriptor(DESCRIPTOR_NORMALS) {
            let rotation = self.rotation();
            if let Some(normals) = cloud.descriptor_mut(DESCRIPTOR_NORMALS) {
                *normals = &rotation * &*normals;
            }
        }
    }
}
