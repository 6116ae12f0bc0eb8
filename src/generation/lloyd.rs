//! Lloyd relaxation via k-means clustering
//!
//! Random points are grouped into `k` clusters; iteratively moving each
//! center to the mean of its members (Lloyd's algorithm) spreads the centers
//! into a near-uniform, honeycomb-like layout.

use glam::Vec2;
use rand::Rng;
use std::time::Instant;

use super::uniform_random_mesh;
use crate::error::{MosaicError, Result};
use crate::geometry::{add_edge_points, map_range, PointSet};
use crate::spatial::SpatialIndex;

/// Largest accepted cell density percentage
pub const MAX_CELL_DENSITY: u32 = 100;

/// Exclusive upper bound on relaxation iterations
pub const MAX_ITERATIONS: usize = 50;

/// Convergence epsilon in pixels
pub const DEFAULT_EPSILON: f32 = 1.0;

/// Options for the k-means relaxation
#[derive(Debug, Clone, Copy)]
pub struct LloydOptions {
    /// Maximum number of iterations per attempt
    pub max_iterations: usize,
    /// Stop once no center moves further than this (pixels)
    /// Set to 0.0 to always run `max_iterations`
    pub convergence_threshold: f32,
    /// Independent restarts; the most compact result wins
    pub attempts: usize,
}

impl Default for LloydOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_threshold: DEFAULT_EPSILON,
            attempts: 1,
        }
    }
}

/// Outcome of a k-means run
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Final cluster centers
    pub centers: Vec<Vec2>,
    /// Cluster index of every input point
    pub labels: Vec<usize>,
    /// Sum of squared distances from each point to its center
    pub compactness: f32,
    /// Iterations actually run
    pub iterations: usize,
    /// Whether the epsilon criterion stopped the run
    pub converged: bool,
}

/// Reject densities outside `[1, 100]` and iterations outside `(0, 50)`
pub fn validate_relaxed(cell_density: u32, iterations: usize) -> Result<()> {
    if cell_density < 1 || cell_density > MAX_CELL_DENSITY {
        return Err(MosaicError::InvalidArgument(format!(
            "lloyd cell density must be in [1, {}] (got {}); tiles cannot be larger than the image",
            MAX_CELL_DENSITY, cell_density
        )));
    }
    if iterations == 0 || iterations >= MAX_ITERATIONS {
        return Err(MosaicError::InvalidArgument(format!(
            "lloyd iterations must be in (0, {}) (got {})",
            MAX_ITERATIONS, iterations
        )));
    }
    Ok(())
}

/// Number of clusters for a density percentage
///
/// Inverted: density 1 gives `max(width, height)` clusters and
/// density 100 gives a single cluster.
pub fn cluster_count(width: u32, height: u32, cell_density: u32) -> Result<usize> {
    let longest = width.max(height) as f64;
    let k = map_range(cell_density as f64, 1.0, MAX_CELL_DENSITY as f64, longest, 1.0)?;
    Ok((k as usize).max(1))
}

/// Generate a relaxed ("lloyd") mesh for an image of the given size
///
/// # Arguments
///
/// * `width`, `height` - Image dimensions
/// * `rng` - Random source for the initial points and centers
/// * `cell_density` - Percentage in `[1, 100]`; higher means fewer, larger cells
/// * `iterations` - Relaxation cap in `(0, 50)`
///
/// # Returns
///
/// Cluster centers followed by the four edge points
///
/// # Errors
///
/// Returns `InvalidArgument` for out-of-range parameters.
pub fn relaxed_mesh<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    rng: &mut R,
    cell_density: u32,
    iterations: usize,
) -> Result<PointSet> {
    validate_relaxed(cell_density, iterations)?;

    let k = cluster_count(width, height, cell_density)?;

    // Edge points would drag clusters outward, so they are added afterwards
    let initial: Vec<Vec2> = uniform_random_mesh(width, height, rng, false)
        .iter()
        .map(|p| p.as_vec2())
        .collect();

    let options = LloydOptions {
        max_iterations: iterations,
        convergence_threshold: DEFAULT_EPSILON,
        attempts: 1,
    };
    let result = kmeans(&initial, k, rng, options)?;

    let centers: PointSet = result.centers.iter().map(|c| c.as_ivec2()).collect();
    Ok(add_edge_points(centers, width, height))
}

/// Cluster `points` into `k` groups with Lloyd's algorithm
///
/// Centers start at uniform random positions inside the bounding box of the
/// data. A cluster that loses all its members is moved onto the point
/// furthest from its current center. `k` is clamped to the number of points.
///
/// # Errors
///
/// Returns `GenerationFailed` when `points` is empty or `k == 0`.
pub fn kmeans<R: Rng + ?Sized>(
    points: &[Vec2],
    k: usize,
    rng: &mut R,
    options: LloydOptions,
) -> Result<KMeansResult> {
    if points.is_empty() || k == 0 {
        return Err(MosaicError::GenerationFailed(format!(
            "k-means needs points and clusters (got {} points, k={})",
            points.len(),
            k
        )));
    }
    let k = k.min(points.len());
    let total_start = Instant::now();

    let mut best: Option<KMeansResult> = None;
    for attempt in 0..options.attempts.max(1) {
        let result = kmeans_attempt(points, k, rng, options)?;
        log::debug!(
            "[Lloyd] attempt {}: {} iterations, converged={}, compactness={:.1}",
            attempt + 1,
            result.iterations,
            result.converged,
            result.compactness
        );
        let better = best
            .as_ref()
            .map_or(true, |b| result.compactness < b.compactness);
        if better {
            best = Some(result);
        }
    }

    log::debug!(
        "[Lloyd] finished: {} points, k={}, total={:?}",
        points.len(),
        k,
        total_start.elapsed()
    );

    best.ok_or_else(|| MosaicError::GenerationFailed("k-means produced no result".to_string()))
}

fn kmeans_attempt<R: Rng + ?Sized>(
    points: &[Vec2],
    k: usize,
    rng: &mut R,
    options: LloydOptions,
) -> Result<KMeansResult> {
    let (min, max) = bounding_box(points);
    let mut centers: Vec<Vec2> = (0..k)
        .map(|_| {
            Vec2::new(
                rng.gen_range(min.x..=max.x),
                rng.gen_range(min.y..=max.y),
            )
        })
        .collect();

    let mut labels = vec![0usize; points.len()];
    let mut iterations_run = 0;
    let mut converged = false;

    for iteration in 0..options.max_iterations {
        assign_labels(points, &centers, &mut labels)?;
        let (new_centers, max_displacement) = update_centers(points, &labels, &centers);

        centers = new_centers;
        iterations_run = iteration + 1;

        if options.convergence_threshold > 0.0 && max_displacement < options.convergence_threshold {
            converged = true;
            break;
        }
    }

    assign_labels(points, &centers, &mut labels)?;
    let compactness = points
        .iter()
        .zip(&labels)
        .map(|(p, &label)| p.distance_squared(centers[label]))
        .sum();

    Ok(KMeansResult {
        centers,
        labels,
        compactness,
        iterations: iterations_run,
        converged,
    })
}

fn bounding_box(points: &[Vec2]) -> (Vec2, Vec2) {
    points.iter().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), &p| (min.min(p), max.max(p)),
    )
}

fn assign_labels(points: &[Vec2], centers: &[Vec2], labels: &mut [usize]) -> Result<()> {
    let index = SpatialIndex::new(centers)?;
    for (label, point) in labels.iter_mut().zip(points) {
        *label = index.find_nearest(*point);
    }
    Ok(())
}

/// Move each center to the mean of its members and track the largest move
fn update_centers(points: &[Vec2], labels: &[usize], centers: &[Vec2]) -> (Vec<Vec2>, f32) {
    let k = centers.len();
    let mut sums = vec![Vec2::ZERO; k];
    let mut counts = vec![0usize; k];
    for (point, &label) in points.iter().zip(labels) {
        sums[label] += *point;
        counts[label] += 1;
    }

    let mut new_centers: Vec<Vec2> = (0..k)
        .map(|c| {
            if counts[c] > 0 {
                sums[c] / counts[c] as f32
            } else {
                centers[c]
            }
        })
        .collect();

    // Empty clusters: steal the points furthest from their current centers
    if counts.iter().any(|&n| n == 0) {
        let mut distances: Vec<(usize, f32)> = points
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (p, &label))| (i, p.distance_squared(new_centers[label])))
            .collect();
        distances.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut donors = distances.into_iter();
        for c in (0..k).filter(|&c| counts[c] == 0) {
            if let Some((i, _)) = donors.next() {
                new_centers[c] = points[i];
            }
        }
    }

    let max_displacement = centers
        .iter()
        .zip(&new_centers)
        .map(|(old, new)| old.distance(*new))
        .fold(0.0f32, f32::max);

    (new_centers, max_displacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::in_bounds;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn blobs() -> Vec<Vec2> {
        let mut points = Vec::new();
        for i in 0..20 {
            let offset = Vec2::new((i % 5) as f32, (i / 5) as f32);
            points.push(Vec2::new(10.0, 10.0) + offset);
            points.push(Vec2::new(200.0, 150.0) + offset);
        }
        points
    }

    #[test]
    fn test_validation() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            relaxed_mesh(50, 50, &mut rng, 0, 10),
            Err(MosaicError::InvalidArgument(_))
        ));
        assert!(relaxed_mesh(50, 50, &mut rng, 101, 10).is_err());
        assert!(relaxed_mesh(50, 50, &mut rng, 50, 0).is_err());
        assert!(relaxed_mesh(50, 50, &mut rng, 50, 50).is_err());
        assert!(relaxed_mesh(50, 50, &mut rng, 100, 49).is_ok());
    }

    #[test]
    fn test_cluster_count_is_inverted() {
        assert_eq!(cluster_count(100, 80, 1).unwrap(), 100);
        assert_eq!(cluster_count(100, 80, 100).unwrap(), 1);
        // 100 + (1 - 100) * 49/99 = 51
        assert_eq!(cluster_count(100, 100, 50).unwrap(), 51);
    }

    #[test]
    fn test_relaxed_mesh_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mesh = relaxed_mesh(100, 60, &mut rng, 50, 10).unwrap();
        let k = cluster_count(100, 60, 50).unwrap();
        assert_eq!(mesh.len(), k + 4);

        let (centers, edges) = mesh.as_slice().split_at(k);
        for c in centers {
            assert!(in_bounds(*c, 100, 60), "center {:?} out of bounds", c);
        }
        for e in edges {
            assert!(!in_bounds(*e, 100, 60));
        }
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let points = blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let options = LloydOptions {
            max_iterations: 20,
            convergence_threshold: 0.01,
            attempts: 3,
        };
        let result = kmeans(&points, 2, &mut rng, options).unwrap();

        let near_left = result.centers.iter().filter(|c| c.x < 100.0).count();
        assert_eq!(near_left, 1, "centers: {:?}", result.centers);
        for c in &result.centers {
            let target = if c.x < 100.0 {
                Vec2::new(12.0, 11.5)
            } else {
                Vec2::new(202.0, 151.5)
            };
            assert!(c.distance(target) < 1.0, "center {:?} vs {:?}", c, target);
        }
    }

    #[test]
    fn test_kmeans_labels_match_nearest_center() {
        let points = blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let result = kmeans(&points, 4, &mut rng, LloydOptions::default()).unwrap();
        assert_eq!(result.labels.len(), points.len());
        for (p, &label) in points.iter().zip(&result.labels) {
            let own = p.distance_squared(result.centers[label]);
            for c in &result.centers {
                assert!(own <= p.distance_squared(*c) + 1e-3);
            }
        }
    }

    #[test]
    fn test_kmeans_clamps_k_and_rejects_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let points = vec![Vec2::new(1.0, 1.0), Vec2::new(5.0, 5.0)];
        let result = kmeans(&points, 10, &mut rng, LloydOptions::default()).unwrap();
        assert_eq!(result.centers.len(), 2);

        assert!(kmeans(&[], 3, &mut rng, LloydOptions::default()).is_err());
        assert!(kmeans(&points, 0, &mut rng, LloydOptions::default()).is_err());
    }

    #[test]
    fn test_kmeans_stops_on_epsilon() {
        let points = blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let options = LloydOptions {
            max_iterations: 49,
            convergence_threshold: DEFAULT_EPSILON,
            attempts: 1,
        };
        let result = kmeans(&points, 2, &mut rng, options).unwrap();
        assert!(result.converged);
        assert!(result.iterations < 49);
    }

    #[test]
    fn test_lloyd_options_default() {
        let options = LloydOptions::default();
        assert_eq!(options.max_iterations, 10);
        assert_eq!(options.attempts, 1);
        assert!((options.convergence_threshold - 1.0).abs() < f32::EPSILON);
    }
}
