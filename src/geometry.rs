//! Geometry utilities shared by the mesh generators
//!
//! Range mapping, random integer sampling, point-set normalisation and the
//! edge-buffer points that keep downstream Voronoi/Delaunay regions bounded.

use glam::{IVec2, Vec2};
use image::{GrayImage, RgbImage};
use rand::Rng;
use std::ops::RangeInclusive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};

/// Distance the four edge-buffer points are pushed outside the image
///
/// Region construction only produces bounded cells for the visible image if
/// these points are far enough away; 512 keeps every visible cell finite for
/// any site placed inside the image.
pub const EDGE_OFFSET: i32 = 512;

/// An ordered collection of integer sample points
///
/// Order carries no meaning for consumers, but is deterministic for a given
/// seeded computation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet {
    points: Vec<IVec2>,
}

impl PointSet {
    /// Create an empty point set
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create an empty point set with room for `capacity` points
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Wrap an existing vector of points
    pub fn from_points(points: Vec<IVec2>) -> Self {
        Self { points }
    }

    /// Concatenate two point sets without deduplication (`a ++ b`)
    pub fn concat(a: &PointSet, b: &PointSet) -> PointSet {
        let mut points = Vec::with_capacity(a.len() + b.len());
        points.extend_from_slice(&a.points);
        points.extend_from_slice(&b.points);
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn push(&mut self, point: IVec2) {
        self.points.push(point);
    }

    #[inline]
    pub fn as_slice(&self) -> &[IVec2] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IVec2> {
        self.points.iter()
    }

    pub fn into_vec(self) -> Vec<IVec2> {
        self.points
    }
}

impl FromIterator<IVec2> for PointSet {
    fn from_iter<I: IntoIterator<Item = IVec2>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<IVec2> for PointSet {
    fn extend<I: IntoIterator<Item = IVec2>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a IVec2;
    type IntoIter = std::slice::Iter<'a, IVec2>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Map a value from one range to another
///
/// Affine change of basis: `src_lo` maps to `dst_lo` and `src_hi` to `dst_hi`.
/// Inverted destination ranges are allowed, e.g. `map_range(0.0, 0.0, 255.0, 10.0, 0.0) == 10.0`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the source range is empty (`src_lo == src_hi`).
pub fn map_range(value: f64, src_lo: f64, src_hi: f64, dst_lo: f64, dst_hi: f64) -> Result<f64> {
    if src_hi == src_lo {
        return Err(MosaicError::InvalidArgument(format!(
            "cannot map from empty range [{}, {}]",
            src_lo, src_hi
        )));
    }
    Ok(dst_lo + (dst_hi - dst_lo) * ((value - src_lo) / (src_hi - src_lo)))
}

/// Sample `count` uniform random integer points within inclusive ranges
///
/// Points are independent; duplicates are possible.
///
/// # Errors
///
/// Returns `InvalidArgument` if either range is empty.
pub fn random_points_2d<R: Rng + ?Sized>(
    rng: &mut R,
    x_range: RangeInclusive<i32>,
    y_range: RangeInclusive<i32>,
    count: usize,
) -> Result<PointSet> {
    if x_range.is_empty() || y_range.is_empty() {
        return Err(MosaicError::InvalidArgument(format!(
            "empty sampling range x={:?} y={:?}",
            x_range, y_range
        )));
    }

    Ok((0..count)
        .map(|_| {
            IVec2::new(
                rng.gen_range(x_range.clone()),
                rng.gen_range(y_range.clone()),
            )
        })
        .collect())
}

/// Bring a point set into pixel space
///
/// If every coordinate lies in `[0, 1)` the set is treated as fractional and
/// scaled by `width`/`height`; otherwise it is assumed to already be in pixel
/// space. Either way coordinates are truncated to integers.
pub fn normalize_points(points: &[Vec2], width: u32, height: u32) -> PointSet {
    let unit = 0.0..1.0;
    let fractional = points
        .iter()
        .all(|p| unit.contains(&p.x) && unit.contains(&p.y));

    if !fractional {
        return points.iter().map(|p| p.as_ivec2()).collect();
    }

    let scale = Vec2::new(width as f32, height as f32);
    // f32 rounding can land a product on the far edge itself
    let last = IVec2::new(width.max(1) as i32 - 1, height.max(1) as i32 - 1);
    points
        .iter()
        .map(|&p| (p * scale).as_ivec2().min(last))
        .collect()
}

/// The four edge-buffer points for an image of the given size
///
/// Ordered top-left, top-right, bottom-left, bottom-right.
pub fn edge_points(width: u32, height: u32) -> [IVec2; 4] {
    let (w, h) = (width as i32, height as i32);
    [
        IVec2::new(-EDGE_OFFSET, -EDGE_OFFSET),
        IVec2::new(w + EDGE_OFFSET, -EDGE_OFFSET),
        IVec2::new(-EDGE_OFFSET, h + EDGE_OFFSET),
        IVec2::new(w + EDGE_OFFSET, h + EDGE_OFFSET),
    ]
}

/// Append the four edge-buffer points to a point set
pub fn add_edge_points(mut points: PointSet, width: u32, height: u32) -> PointSet {
    points.extend(edge_points(width, height));
    points
}

/// Whether a point lies inside `[0, width) x [0, height)`
#[inline]
pub fn in_bounds(point: IVec2, width: u32, height: u32) -> bool {
    point.x >= 0 && point.y >= 0 && (point.x as u32) < width && (point.y as u32) < height
}

/// Grayscale intensity field of an image
pub fn intensity(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Mean intensity of a window, clipped to the image bounds
///
/// Returns 0.0 for a window that lies entirely outside the image.
pub fn mean_intensity(gray: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let x_end = x.saturating_add(w).min(gray.width());
    let y_end = y.saturating_add(h).min(gray.height());
    if x >= x_end || y >= y_end {
        return 0.0;
    }

    let mut sum: u64 = 0;
    for py in y..y_end {
        for px in x..x_end {
            sum += gray.get_pixel(px, py).0[0] as u64;
        }
    }
    let count = ((x_end - x) as u64) * ((y_end - y) as u64);
    sum as f64 / count as f64
}
