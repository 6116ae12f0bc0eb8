//! Mesh point generation
//!
//! Three point-generation algorithms over an image: uniform random,
//! density-adaptive ("fibonacci") and relaxed ("lloyd"). All of them return a
//! [`PointSet`] in pixel space ending with the four edge-buffer points.

pub mod delaunay;
mod fibonacci;
mod lloyd;

pub use delaunay::triangulate;
pub use fibonacci::{density_adaptive_mesh, points_for_intensity, validate_step, FIBONACCI_ISH};
pub use lloyd::{
    cluster_count, kmeans, relaxed_mesh, validate_relaxed, KMeansResult, LloydOptions,
};

use glam::Vec2;
use image::{GrayImage, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::geometry::{add_edge_points, intensity, normalize_points, PointSet};

/// Generate `max(width, height)` uniform random points in pixel space
///
/// Points are drawn as fractions in `[0, 1)` and scaled by
/// [`normalize_points`]. Pass `include_edges = false` when the set feeds
/// clustering, where the far-away edge points would skew the result.
pub fn uniform_random_mesh<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    rng: &mut R,
    include_edges: bool,
) -> PointSet {
    let count = width.max(height) as usize;
    let fractional: Vec<Vec2> = (0..count)
        .map(|_| Vec2::new(rng.gen::<f32>(), rng.gen::<f32>()))
        .collect();

    let points = normalize_points(&fractional, width, height);
    if include_edges {
        add_edge_points(points, width, height)
    } else {
        points
    }
}

/// Source of cacheable meshes for one image
///
/// [`crate::MeshCache`] calls through this trait so that the algorithms can be
/// swapped out, e.g. for a counting double in tests.
pub trait MeshGenerator: Send + Sync {
    /// Image dimensions the meshes are generated for
    fn dimensions(&self) -> (u32, u32);

    /// Density-adaptive mesh for `step` in `(0, 50]`
    fn density_adaptive(&self, step: u32) -> Result<PointSet>;

    /// Relaxed mesh for `cell_density` in `[1, 100]` and `iterations` in `(0, 50)`
    fn relaxed(&self, cell_density: u32, iterations: usize) -> Result<PointSet>;
}

/// Default generator backed by a per-key seeded ChaCha RNG
///
/// The same image, seed and key always yield the same mesh.
#[derive(Debug, Clone)]
pub struct SeededMeshGenerator {
    gray: GrayImage,
    seed: u64,
}

impl SeededMeshGenerator {
    /// Prepare a generator for `image`, caching its intensity field
    pub fn new(image: &RgbImage, seed: u64) -> Self {
        Self {
            gray: intensity(image),
            seed,
        }
    }

    /// Grayscale intensity field the generator samples from
    pub fn intensity(&self) -> &GrayImage {
        &self.gray
    }

    fn rng_for(&self, tag: u64, a: u64, b: u64) -> ChaCha8Rng {
        let mixed = self
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ tag.rotate_left(48)
            ^ a.rotate_left(24)
            ^ b;
        ChaCha8Rng::seed_from_u64(mixed)
    }
}

impl MeshGenerator for SeededMeshGenerator {
    fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    fn density_adaptive(&self, step: u32) -> Result<PointSet> {
        let mut rng = self.rng_for(1, step as u64, 0);
        density_adaptive_mesh(&self.gray, &mut rng, step)
    }

    fn relaxed(&self, cell_density: u32, iterations: usize) -> Result<PointSet> {
        let (width, height) = self.gray.dimensions();
        let mut rng = self.rng_for(2, cell_density as u64, iterations as u64);
        relaxed_mesh(width, height, &mut rng, cell_density, iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::in_bounds;
    use image::Rgb;

    #[test]
    fn test_uniform_random_mesh() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let with_edges = uniform_random_mesh(80, 30, &mut rng, true);
        assert_eq!(with_edges.len(), 80 + 4);

        let without = uniform_random_mesh(80, 30, &mut rng, false);
        assert_eq!(without.len(), 80);
        for p in &without {
            assert!(in_bounds(*p, 80, 30));
        }
    }

    #[test]
    fn test_seeded_generator_is_deterministic() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 0]));
        let a = SeededMeshGenerator::new(&image, 7);
        let b = SeededMeshGenerator::new(&image, 7);
        assert_eq!(a.density_adaptive(10).unwrap(), b.density_adaptive(10).unwrap());
        assert_eq!(a.relaxed(40, 5).unwrap(), b.relaxed(40, 5).unwrap());
        assert_eq!(a.dimensions(), (32, 32));
    }

    #[test]
    fn test_seeded_generator_rejects_bad_parameters() {
        let image = RgbImage::new(16, 16);
        let generator = SeededMeshGenerator::new(&image, 0);
        assert!(generator.density_adaptive(0).is_err());
        assert!(generator.relaxed(0, 10).is_err());
        assert!(generator.relaxed(10, 50).is_err());
    }
}
