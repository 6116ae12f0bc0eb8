//! Density-adaptive ("fibonacci") point distribution
//!
//! Splits the image into square cells and scatters a Fibonacci number of
//! random points in each one, chosen from the cell's mean intensity.
//!
//! # Algorithm
//!
//! - Cell side: `step`% of the image width (at least one pixel)
//! - Mean intensity per cell, clipped at the right and bottom edges
//! - `trunc(map_range(avg, 0, 255, 10, 0))` indexes [`FIBONACCI_ISH`], so dark
//!   cells receive up to 144 points and bright cells as few as 1
//! - Uniform random points inside the cell, then the four edge points
//!
//! Cost is O(cells x points-per-cell) for sampling plus one pass over the
//! pixels for the means.

use image::GrayImage;
use rand::Rng;

use crate::error::{MosaicError, Result};
use crate::geometry::{add_edge_points, map_range, mean_intensity, random_points_2d, PointSet};

/// Fibonacci sequence without its leading `0, 1`
pub const FIBONACCI_ISH: [usize; 11] = [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144];

/// Largest accepted step, as a percentage of the image width
pub const MAX_STEP: u32 = 50;

/// Reject steps outside `(0, 50]`
pub fn validate_step(step: u32) -> Result<()> {
    if step == 0 || step > MAX_STEP {
        return Err(MosaicError::InvalidArgument(format!(
            "fibonacci step must be in (0, {}] (got {})",
            MAX_STEP, step
        )));
    }
    Ok(())
}

/// Side length in pixels of one sampling cell
#[inline]
pub fn cell_size(width: u32, step: u32) -> u32 {
    (step * width / 100).max(1)
}

/// Number of points to place in a cell of the given mean intensity
pub fn points_for_intensity(avg: f64) -> Result<usize> {
    let last = FIBONACCI_ISH.len() - 1;
    // `as usize` truncates toward zero and saturates negatives at 0
    let index = map_range(avg, 0.0, 255.0, last as f64, 0.0)? as usize;
    Ok(FIBONACCI_ISH[index.min(last)])
}

/// Generate a density-adaptive mesh over a grayscale intensity field
///
/// # Arguments
///
/// * `gray` - Grayscale intensity of the source image
/// * `rng` - Random source for in-cell sampling
/// * `step` - Cell side as a percentage of the image width, in `(0, 50]`
///
/// # Returns
///
/// Sample points inside the image followed by the four edge points
///
/// # Errors
///
/// Returns `InvalidArgument` if `step` is out of range.
pub fn density_adaptive_mesh<R: Rng + ?Sized>(
    gray: &GrayImage,
    rng: &mut R,
    step: u32,
) -> Result<PointSet> {
    validate_step(step)?;

    let (width, height) = gray.dimensions();
    let side = cell_size(width, step);
    let mut points = PointSet::new();

    for y in (0..height).step_by(side as usize) {
        for x in (0..width).step_by(side as usize) {
            let cell_w = side.min(width - x);
            let cell_h = side.min(height - y);

            let avg = mean_intensity(gray, x, y, cell_w, cell_h);
            let count = points_for_intensity(avg)?;

            let x_range = x as i32..=(x + cell_w - 1) as i32;
            let y_range = y as i32..=(y + cell_h - 1) as i32;
            points.extend(random_points_2d(rng, x_range, y_range, count)?.into_vec());
        }
    }

    log::debug!(
        "fibonacci mesh: step {} -> cell {}px, {} points",
        step,
        side,
        points.len()
    );

    Ok(add_edge_points(points, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::in_bounds;
    use image::Luma;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flat(width: u32, height: u32, level: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([level]))
    }

    #[test]
    fn test_step_validation() {
        let gray = flat(20, 20, 128);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            density_adaptive_mesh(&gray, &mut rng, 0),
            Err(MosaicError::InvalidArgument(_))
        ));
        assert!(density_adaptive_mesh(&gray, &mut rng, 51).is_err());
        assert!(density_adaptive_mesh(&gray, &mut rng, 50).is_ok());
        assert!(density_adaptive_mesh(&gray, &mut rng, 1).is_ok());
    }

    #[test]
    fn test_intensity_mapping_is_inverted() {
        assert_eq!(points_for_intensity(0.0).unwrap(), 144);
        assert_eq!(points_for_intensity(255.0).unwrap(), 1);
        // 127 -> 5.02 -> index 5
        assert_eq!(points_for_intensity(127.0).unwrap(), 13);
    }

    #[test]
    fn test_dark_cells_get_more_points() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // 10x10 at step 50 -> four 5x5 cells
        let dark = density_adaptive_mesh(&flat(10, 10, 0), &mut rng, 50).unwrap();
        let bright = density_adaptive_mesh(&flat(10, 10, 255), &mut rng, 50).unwrap();
        assert_eq!(dark.len(), 4 * 144 + 4);
        assert_eq!(bright.len(), 4 + 4);
    }

    #[test]
    fn test_points_inside_image_and_edges_outside() {
        let gray = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        for step in [1, 7, 13, 31, 50] {
            let mut rng = ChaCha8Rng::seed_from_u64(step as u64);
            let mesh = density_adaptive_mesh(&gray, &mut rng, step).unwrap();
            assert!(mesh.len() >= 4);

            let (inner, edges) = mesh.as_slice().split_at(mesh.len() - 4);
            for p in inner {
                assert!(in_bounds(*p, 37, 23), "step {}: {:?} out of bounds", step, p);
            }
            for p in edges {
                assert!(!in_bounds(*p, 37, 23));
            }
        }
    }

    #[test]
    fn test_partial_edge_cells() {
        // width 30, step 20 -> 6px cells: 5 columns, and 31px of height gives
        // 5 full rows plus a 1px strip at the bottom
        let gray = flat(30, 31, 255);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mesh = density_adaptive_mesh(&gray, &mut rng, 20).unwrap();
        assert_eq!(mesh.len(), 5 * 6 + 4);
    }

    #[test]
    fn test_determinism() {
        let gray = GrayImage::from_fn(40, 40, |x, _| Luma([(x * 6) as u8]));
        let a = density_adaptive_mesh(&gray, &mut ChaCha8Rng::seed_from_u64(42), 10).unwrap();
        let b = density_adaptive_mesh(&gray, &mut ChaCha8Rng::seed_from_u64(42), 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tiny_image_cell_floor() {
        // 5px wide at step 1 -> 0px, clamped to 1px cells
        assert_eq!(cell_size(5, 1), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mesh = density_adaptive_mesh(&flat(5, 2, 255), &mut rng, 1).unwrap();
        assert_eq!(mesh.len(), 10 + 4);
    }
}
