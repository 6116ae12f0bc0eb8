//! Spatial indexing for nearest-site lookups
//!
//! With the `spatial-index` feature (default) lookups go through a KD-tree;
//! without it they fall back to a linear scan over the sites.

#[cfg(feature = "spatial-index")]
use kiddo::immutable::float::kdtree::ImmutableKdTree;
#[cfg(feature = "spatial-index")]
use kiddo::SquaredEuclidean;
use glam::Vec2;

use crate::error::{MosaicError, Result};

/// Nearest-neighbour index over a fixed set of 2D sites
///
/// Used for k-means center assignment and for painting Voronoi regions.
///
/// # Performance
///
/// - Construction: O(n log n) with the KD-tree, O(n) copy otherwise
/// - Query: O(log n) with the KD-tree, O(n) otherwise
#[derive(Clone)]
pub struct SpatialIndex {
    #[cfg(feature = "spatial-index")]
    tree: ImmutableKdTree<f32, usize, 2, 32>,
    sites: Vec<Vec2>,
}

impl SpatialIndex {
    /// Build an index from site positions
    ///
    /// # Errors
    ///
    /// Returns `GenerationFailed` if `sites` is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use voronoi_mosaic::SpatialIndex;
    /// use glam::Vec2;
    ///
    /// let index = SpatialIndex::new(&[Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)]).unwrap();
    /// assert_eq!(index.find_nearest(Vec2::new(8.0, 1.0)), 1);
    /// ```
    pub fn new(sites: &[Vec2]) -> Result<Self> {
        if sites.is_empty() {
            return Err(MosaicError::GenerationFailed(
                "cannot index an empty site set".to_string(),
            ));
        }

        #[cfg(feature = "spatial-index")]
        let tree = {
            let points: Vec<[f32; 2]> = sites.iter().map(|s| [s.x, s.y]).collect();
            ImmutableKdTree::new_from_slice(&points)
        };

        Ok(Self {
            #[cfg(feature = "spatial-index")]
            tree,
            sites: sites.to_vec(),
        })
    }

    /// Number of indexed sites
    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Always false; an index is never built from an empty set
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Position of a site by index
    #[inline]
    pub fn site(&self, id: usize) -> Vec2 {
        self.sites[id]
    }

    /// Index of the site closest to `position`
    #[cfg(feature = "spatial-index")]
    pub fn find_nearest(&self, position: Vec2) -> usize {
        let query = [position.x, position.y];
        let result = self.tree.nearest_one::<SquaredEuclidean>(&query);
        result.item as usize
    }

    /// Index of the site closest to `position`
    #[cfg(not(feature = "spatial-index"))]
    pub fn find_nearest(&self, position: Vec2) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (id, site) in self.sites.iter().enumerate() {
            let dist = site.distance_squared(position);
            if dist < best_dist {
                best_dist = dist;
                best = id;
            }
        }
        best
    }
}
