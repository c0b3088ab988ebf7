//! Surface-normal estimation.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use super::CloudFilter;
use crate::core::knn::KnnIndex;
use crate::core::types::{DESCRIPTOR_NORMALS, PointCloud};
use crate::error::Result;

/// Estimates a D×N `normals` descriptor from local neighbourhoods.
///
/// For each point the `knn` nearest neighbours (the point included) form a
/// local patch; the normal is the eigenvector of the patch covariance with
/// the smallest eigenvalue, oriented towards the origin. Applied in the
/// sensor-frame input chain, the origin is the sensor, so normals face the
/// viewpoint — which is what the dynamic-point update expects.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceNormalsFilter {
    knn: usize,
}

impl SurfaceNormalsFilter {
    /// Create an estimator using `knn` neighbours per point.
    pub fn new(knn: usize) -> Self {
        assert!(knn >= 2);
        Self { knn }
    }
}

impl CloudFilter for SurfaceNormalsFilter {
    fn filter_in_place(&self, cloud: &mut PointCloud) -> Result<()> {
        let n = cloud.point_count();
        let dim = cloud.euclidean_dim();
        if n == 0 {
            cloud.add_descriptor(DESCRIPTOR_NORMALS, DMatrix::zeros(dim, 0));
            return Ok(());
        }

        let coordinates = cloud.coordinates();
        let index = KnnIndex::from_coordinates(&coordinates);
        let mut normals = DMatrix::zeros(dim, n);

        let mut query = vec![0.0f32; dim];
        for i in 0..n {
            for row in 0..dim {
                query[row] = coordinates[(row, i)];
            }
            let neighbours = index.nearest_n(&query, self.knn);

            let mut centroid = DVector::<f32>::zeros(dim);
            for &(_, j) in &neighbours {
                centroid += coordinates.column(j);
            }
            centroid /= neighbours.len() as f32;

            let mut covariance = DMatrix::<f32>::zeros(dim, dim);
            for &(_, j) in &neighbours {
                let centered = coordinates.column(j) - &centroid;
                covariance += &centered * centered.transpose();
            }

            let eigen = SymmetricEigen::new(covariance);
            let mut smallest = 0;
            for k in 1..dim {
                if eigen.eigenvalues[k] < eigen.eigenvalues[smallest] {
                    smallest = k;
                }
            }
            let mut normal: DVector<f32> = eigen.eigenvectors.column(smallest).into_owned();

            let norm = normal.norm();
            if norm > 0.0 {
                normal /= norm;
            }
            // Orient towards the origin (the sensor, in the sensor frame).
            let point = coordinates.column(i);
            if normal.dot(&point) > 0.0 {
                normal = -normal;
            }
            normals.set_column(i, &normal);
        }

        cloud.add_descriptor(DESCRIPTOR_NORMALS, normals);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// A planar patch at z = 2 in front of a sensor at the origin.
    fn plane_cloud() -> PointCloud {
        let mut columns = Vec::new();
        for ix in 0..5 {
            for iy in 0..5 {
                columns.push([ix as f32 * 0.1, iy as f32 * 0.1, 2.0]);
            }
        }
        let coords = DMatrix::from_fn(3, columns.len(), |row, col| columns[col][row]);
        PointCloud::from_coordinates(&coords)
    }

    #[test]
    fn test_plane_normals_point_at_sensor() {
        let mut cloud = plane_cloud();
        SurfaceNormalsFilter::new(8)
            .filter_in_place(&mut cloud)
            .unwrap();

        let normals = cloud.descriptor(DESCRIPTOR_NORMALS).unwrap();
        assert_eq!(normals.nrows(), 3);
        assert_eq!(normals.ncols(), cloud.point_count());
        for i in 0..cloud.point_count() {
            assert_relative_eq!(normals[(0, i)].abs(), 0.0, epsilon = 1e-3);
            assert_relative_eq!(normals[(1, i)].abs(), 0.0, epsilon = 1e-3);
            // Oriented towards the origin: negative z.
            assert!(normals[(2, i)] < -0.99);
        }
    }

    #[test]
    fn test_normals_are_unit_length() {
        let mut cloud = plane_cloud();
        SurfaceNormalsFilter::new(5)
            .filter_in_place(&mut cloud)
            .unwrap();
        let normals = cloud.descriptor(DESCRIPTOR_NORMALS).unwrap();
        for i in 0..normals.ncols() {
            assert_relative_eq!(normals.column(i).norm(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_2d_line_normal() {
        // Points along the x axis at y = 1: normal must be ±y, oriented
        // towards the origin (negative y).
        let coords = DMatrix::from_fn(2, 10, |row, col| {
            if row == 0 { col as f32 * 0.1 } else { 1.0 }
        });
        let mut cloud = PointCloud::from_coordinates(&coords);
        SurfaceNormalsFilter::new(4)
            .filter_in_place(&mut cloud)
            .unwrap();

        let normals = cloud.descriptor(DESCRIPTOR_NORMALS).unwrap();
        for i in 0..cloud.point_count() {
            assert_relative_eq!(normals[(0, i)].abs(), 0.0, epsilon = 1e-3);
            assert!(normals[(1, i)] < -0.99);
        }
    }

    #[test]
    fn test_empty_cloud_gets_empty_descriptor() {
        let mut cloud = PointCloud::new(3);
        SurfaceNormalsFilter::new(5)
            .filter_in_place(&mut cloud)
            .unwrap();
        assert!(cloud.has_descriptor(DESCRIPTOR_NORMALS));
        assert_eq!(cloud.descriptor(DESCRIPTOR_NORMALS).unwrap().ncols(), 0);
    }
}
