use image::{Rgb, RgbImage};

use super::fill::{line_pixels, mean_color, triangle_pixels};
use super::{Outline, RenderedTile};
use crate::generation::triangulate;
use crate::geometry::PointSet;

const OUTLINE_DARKEN: u8 = 16;

/// Fill the Delaunay triangles of `points` with their mean color
///
/// Colors are sampled from the untouched source, so the fill order does not
/// bleed between neighbouring triangles. With [`Outline::only`] the source is
/// left as-is and only the triangle edges are drawn.
pub fn render_triangles(
    image: &RgbImage,
    points: &PointSet,
    fib_step: Option<u32>,
    outline: Outline,
) -> RenderedTile {
    let (width, height) = image.dimensions();
    let mut out = image.clone();

    for tri in triangulate(points.as_slice()) {
        let edge = if outline.only {
            outline.edge_color(Rgb([0, 0, 0]), OUTLINE_DARKEN)
        } else {
            let pixels = triangle_pixels(&tri, width, height);
            let Some(color) = mean_color(image, pixels.iter().copied()) else {
                continue;
            };
            for &(x, y) in &pixels {
                out.put_pixel(x, y, color);
            }
            outline.edge_color(color, OUTLINE_DARKEN)
        };

        for i in 0..3 {
            for (x, y) in line_pixels(tri[i], tri[(i + 1) % 3], width, height) {
                out.put_pixel(x, y, edge);
            }
        }
    }

    let label = match fib_step {
        Some(step) => format!("Triangles: Fibonacci-Steps: {}", step),
        None => "Triangles: Random-Steps: true".to_string(),
    };
    let label = label + outline.label_suffix();
    RenderedTile::new(label, out)
}
