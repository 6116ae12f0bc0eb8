//! Delaunay triangulation via convex hull
//!
//! Lifting 2D points onto the paraboloid `z = x² + y²` turns the Delaunay
//! triangulation into the lower faces of their 3D convex hull. The hull
//! itself comes from parry3d.

use glam::{IVec2, Vec2, Vec3};
use parry3d::math::Point;
use parry3d::transformation;
use std::collections::HashSet;

/// Minimum downward tilt of a hull face to count as part of the lower hull
const LOWER_FACE_EPSILON: f32 = 1e-9;

/// Triangulate a point set
///
/// Duplicate points are ignored. Triangles are returned as corner positions
/// so callers never deal with the hull's internal vertex order.
///
/// # Example
///
/// ```rust
/// use voronoi_mosaic::generation::triangulate;
/// use glam::IVec2;
///
/// let square = [IVec2::new(0, 0), IVec2::new(10, 0), IVec2::new(0, 10), IVec2::new(10, 10)];
/// assert_eq!(triangulate(&square).len(), 2);
/// ```
pub fn triangulate(points: &[IVec2]) -> Vec<[IVec2; 3]> {
    let mut seen = HashSet::with_capacity(points.len());
    let unique: Vec<IVec2> = points.iter().copied().filter(|p| seen.insert(*p)).collect();

    match unique.len() {
        0..=2 => return Vec::new(),
        3 => return vec![[unique[0], unique[1], unique[2]]],
        // Four points are cocircular when they form the edge rectangle, which
        // lifts to a flat hull, so fan them around their centroid instead
        4 => return fan_quad(&unique),
        _ => {}
    }

    // Normalise into [-1, 1] before lifting to keep f32 precision
    let (min, max) = unique.iter().fold(
        (IVec2::splat(i32::MAX), IVec2::splat(i32::MIN)),
        |(min, max), &p| (min.min(p), max.max(p)),
    );
    let center = (min + max).as_vec2() * 0.5;
    let scale = ((max - min).max_element() as f32 * 0.5).max(1.0);

    let lifted: Vec<Point<f32>> = unique
        .iter()
        .map(|p| {
            let q = (p.as_vec2() - center) / scale;
            Point::new(q.x, q.y, q.length_squared())
        })
        .collect();

    let (vertices, triangle_indices) = transformation::convex_hull(&lifted);

    let unlift = |idx: u32| -> IVec2 {
        let v = &vertices[idx as usize];
        (Vec2::new(v.x, v.y) * scale + center).round().as_ivec2()
    };

    triangle_indices
        .iter()
        .filter(|tri| {
            let a = to_vec3(&vertices[tri[0] as usize]);
            let b = to_vec3(&vertices[tri[1] as usize]);
            let c = to_vec3(&vertices[tri[2] as usize]);
            (b - a).cross(c - a).z < -LOWER_FACE_EPSILON
        })
        .map(|tri| [unlift(tri[0]), unlift(tri[1]), unlift(tri[2])])
        .collect()
}

fn to_vec3(point: &Point<f32>) -> Vec3 {
    Vec3::new(point.x, point.y, point.z)
}

fn fan_quad(points: &[IVec2]) -> Vec<[IVec2; 3]> {
    // One point inside the triangle of the other three: fan from it
    for i in 0..4 {
        let others: Vec<IVec2> = (0..4).filter(|&j| j != i).map(|j| points[j]).collect();
        if inside_triangle(points[i], others[0], others[1], others[2]) {
            return vec![
                [points[i], others[0], others[1]],
                [points[i], others[1], others[2]],
                [points[i], others[2], others[0]],
            ];
        }
    }

    let centroid = points.iter().map(|p| p.as_vec2()).sum::<Vec2>() / points.len() as f32;
    let mut ordered = points.to_vec();
    ordered.sort_by(|a, b| {
        let da = a.as_vec2() - centroid;
        let db = b.as_vec2() - centroid;
        let angle_a = da.y.atan2(da.x);
        let angle_b = db.y.atan2(db.x);
        angle_a.partial_cmp(&angle_b).unwrap_or(std::cmp::Ordering::Equal)
    });
    vec![
        [ordered[0], ordered[1], ordered[2]],
        [ordered[0], ordered[2], ordered[3]],
    ]
}

fn inside_triangle(p: IVec2, a: IVec2, b: IVec2, c: IVec2) -> bool {
    let side = |u: IVec2, v: IVec2| {
        let (e, f) = ((v - u).as_i64vec2(), (p - u).as_i64vec2());
        e.x * f.y - e.y * f.x
    };
    let (d1, d2, d3) = (side(a, b), side(b, c), side(c, a));
    (d1 > 0 && d2 > 0 && d3 > 0) || (d1 < 0 && d2 < 0 && d3 < 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::add_edge_points;
    use crate::geometry::PointSet;

    fn twice_area(tri: &[IVec2; 3]) -> i64 {
        let [a, b, c] = *tri;
        let ab = (b - a).as_i64vec2();
        let ac = (c - a).as_i64vec2();
        (ab.x * ac.y - ab.y * ac.x).abs()
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(triangulate(&[]).is_empty());
        assert!(triangulate(&[IVec2::ZERO, IVec2::ZERO, IVec2::ONE]).is_empty());
        assert_eq!(triangulate(&[IVec2::ZERO, IVec2::X, IVec2::Y]).len(), 1);
    }

    #[test]
    fn test_four_points_with_one_inside() {
        let points = [IVec2::new(0, 0), IVec2::new(30, 0), IVec2::new(0, 30), IVec2::new(5, 5)];
        let triangles = triangulate(&points);
        assert_eq!(triangles.len(), 3);
        assert_eq!(triangles.iter().map(twice_area).sum::<i64>(), 900);
    }

    #[test]
    fn test_edge_rectangle_only() {
        let points = add_edge_points(PointSet::new(), 100, 50);
        let triangles = triangulate(points.as_slice());
        assert_eq!(triangles.len(), 2);
        let total: i64 = triangles.iter().map(twice_area).sum();
        // (100 + 1024) x (50 + 1024)
        assert_eq!(total, 2 * 1124 * 1074);
    }

    #[test]
    fn test_triangulation_covers_hull() {
        let inner = PointSet::from_points(vec![
            IVec2::new(10, 10),
            IVec2::new(60, 15),
            IVec2::new(30, 40),
            IVec2::new(80, 45),
        ]);
        let points = add_edge_points(inner, 100, 50);
        let triangles = triangulate(points.as_slice());

        // n points with h on the hull give 2n - h - 2 triangles
        assert_eq!(triangles.len(), 2 * 8 - 4 - 2);

        let total: i64 = triangles.iter().map(twice_area).sum();
        assert_eq!(total, 2 * 1124 * 1074);

        for tri in &triangles {
            for corner in tri {
                assert!(points.as_slice().contains(corner));
            }
        }
    }
}
