//! Nearest-neighbour indices built on k-d trees.
//!
//! Two flavours are used by the engine: a Euclidean index over point
//! coordinates (novelty filtering, ICP correspondences, normal
//! estimation) and an angular index over (elevation, azimuth) pairs with
//! a hard radius cutoff (beam association for the dynamic-point update).

use kiddo::SquaredEuclidean;
use kiddo::float::kdtree::KdTree;
use nalgebra::DMatrix;

/// Bucket capacity for the k-d trees below. Larger than kiddo's default
/// (32) so that coordinate sets with many points sharing a value on one
/// axis (e.g. an axis-aligned plane or grid) don't exceed a leaf's
/// capacity during construction.
const BUCKET_SIZE: usize = 256;

/// Euclidean k-d tree over D ∈ {2, 3} dimensional coordinates.
pub enum KnnIndex {
    D2(KdTree<f32, u64, 2, BUCKET_SIZE, u32>),
    D3(KdTree<f32, u64, 3, BUCKET_SIZE, u32>),
}

impl KnnIndex {
    /// Build an index from a D×N coordinate matrix.
    pub fn from_coordinates(coordinates: &DMatrix<f32>) -> Self {
        let dim = coordinates.nrows();
        assert!(dim == 2 || dim == 3);
        match dim {
            2 => {
                let mut tree: KdTree<f32, u64, 2, BUCKET_SIZE, u32> = KdTree::new();
                for i in 0..coordinates.ncols() {
                    tree.add(&[coordinates[(0, i)], coordinates[(1, i)]], i as u64);
                }
                KnnIndex::D2(tree)
            }
            _ => {
                let mut tree: KdTree<f32, u64, 3, BUCKET_SIZE, u32> = KdTree::new();
                for i in 0..coordinates.ncols() {
                    tree.add(
                        &[
                            coordinates[(0, i)],
                            coordinates[(1, i)],
                            coordinates[(2, i)],
                        ],
                        i as u64,
                    );
                }
                KnnIndex::D3(tree)
            }
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        match self {
            KnnIndex::D2(tree) => tree.size() as usize,
            KnnIndex::D3(tree) => tree.size() as usize,
        }
    }

    /// Check if no points are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Single nearest neighbour of `query` as (squared distance, index),
    /// or `None` when the index is empty. `query` must have D entries.
    pub fn nearest_one(&self, query: &[f32]) -> Option<(f32, usize)> {
        if self.is_empty() {
            return None;
        }
        match self {
            KnnIndex::D2(tree) => {
                let nearest = tree.nearest_one::<SquaredEuclidean>(&[query[0], query[1]]);
                Some((nearest.distance, nearest.item as usize))
            }
            KnnIndex::D3(tree) => {
                let nearest =
                    tree.nearest_one::<SquaredEuclidean>(&[query[0], query[1], query[2]]);
                Some((nearest.distance, nearest.item as usize))
            }
        }
    }

    /// Up to `count` nearest neighbours of `query`, closest first, as
    /// (squared distance, index) pairs.
    pub fn nearest_n(&self, query: &[f32], count: usize) -> Vec<(f32, usize)> {
        match self {
            KnnIndex::D2(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1]], count)
                .into_iter()
                .map(|n| (n.distance, n.item as usize))
                .collect(),
            KnnIndex::D3(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1], query[2]], count)
                .into_iter()
                .map(|n| (n.distance, n.item as usize))
                .collect(),
        }
    }
}

/// Angular nearest-neighbour index over (elevation, azimuth) pairs with a
/// maximum search radius.
///
/// Queries past the cutoff report no match, mirroring an infinite-distance
/// result; callers skip those entries.
pub struct AngularKnn {
    tree: KdTree<f32, u64, 2, BUCKET_SIZE, u32>,
    size: usize,
    max_radius: f32,
}

impl AngularKnn {
    /// Build from a 2×N angle matrix (row 0 elevation, row 1 azimuth) and
    /// a cutoff in radians.
    pub fn from_angles(angles: &DMatrix<f32>, max_radius: f32) -> Self {
        assert_eq!(angles.nrows(), 2);
        let mut tree: KdTree<f32, u64, 2, BUCKET_SIZE, u32> = KdTree::new();
        for i in 0..angles.ncols() {
            tree.add(&[angles[(0, i)], angles[(1, i)]], i as u64);
        }
        Self {
            tree,
            size: angles.ncols(),
            max_radius,
        }
    }

    /// Nearest indexed beam within the cutoff as (squared angular
    /// distance, index), or `None` when no beam qualifies.
    pub fn nearest_within(&self, elevation: f32, azimuth: f32) -> Option<(f32, usize)> {
        if self.size == 0 {
            return None;
        }
        let nearest = self.tree.nearest_one::<SquaredEuclidean>(&[elevation, azimuth]);
        if nearest.distance > self.max_radius * self.max_radius {
            return None;
        }
        Some((nearest.distance, nearest.item as usize))
    }
}
