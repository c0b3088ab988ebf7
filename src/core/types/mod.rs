//! Core value types: point clouds and rigid transforms.

mod cloud;
mod transform;

pub use cloud::{DESCRIPTOR_NORMALS, DESCRIPTOR_PROBABILITY_DYNAMIC, PointCloud};
pub use transform::RigidTransform;
