//! Foundation layer: value types and coordinate conversions.

pub mod knn;
pub mod spherical;
pub mod types;
