//! Spherical-coordinate conversion for sensor-frame clouds.

use nalgebra::{DMatrix, DVector};

use crate::core::types::PointCloud;

/// Per-point spherical coordinates of a sensor-frame cloud.
///
/// `angles` is a 2×N matrix: row 0 is the elevation (`asin(z / radius)` in
/// 3D, zero in 2D), row 1 the azimuth (`atan2(y, x)`). Radii are Euclidean
/// norms. Beam identity between two clouds is decided purely on the angle
/// rows, which is what makes the angular nearest-neighbour search below
/// range-independent.
#[derive(Debug, Clone)]
pub struct SphericalCoordinates {
    pub radii: DVector<f32>,
    pub angles: DMatrix<f32>,
}

/// Convert a sensor-frame cloud to spherical coordinates.
pub fn convert_to_spherical(cloud: &PointCloud) -> SphericalCoordinates {
    let n = cloud.point_count();
    let is_3d = cloud.euclidean_dim() == 3;

    let mut radii = DVector::zeros(n);
    let mut angles = DMatrix::zeros(2, n);

    let features = cloud.features();
    for i in 0..n {
        let x = features[(0, i)];
        let y = features[(1, i)];
        let radius = if is_3d {
            let z = features[(2, i)];
            (x * x + y * y + z * z).sqrt()
        } else {
            (x * x + y * y).sqrt()
        };
        radii[i] = radius;

        angles[(0, i)] = 0.0;
        if is_3d {
            let ratio = features[(2, i)] / radius;
            angles[(0, i)] = ratio.asin();
        }
        angles[(1, i)] = y.atan2(x);
    }

    SphericalCoordinates { radii, angles }
}
