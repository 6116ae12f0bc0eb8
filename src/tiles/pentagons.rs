use glam::Vec2;
use image::{Rgb, RgbImage};
use std::collections::HashSet;

use super::{Outline, PentagonMesh, RenderedTile};
use crate::error::Result;
use crate::geometry::PointSet;
use crate::spatial::SpatialIndex;

const OUTLINE_DARKEN: u8 = 16;

/// Fill the Voronoi regions of `points` with their mean color
///
/// Every pixel belongs to its nearest site. Pixels whose right or lower
/// neighbour belongs to another region form the outline. With
/// [`Outline::only`] the source is kept and only the outline is drawn.
pub fn render_pentagons(
    image: &RgbImage,
    points: &PointSet,
    source: PentagonMesh,
    outline: Outline,
) -> Result<RenderedTile> {
    let (width, height) = image.dimensions();
    // Coincident sites share one region
    let mut seen = HashSet::with_capacity(points.len());
    let sites: Vec<Vec2> = points
        .iter()
        .filter(|p| seen.insert(**p))
        .map(|p| p.as_vec2())
        .collect();
    let index = SpatialIndex::new(&sites)?;

    let owner: Vec<usize> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| index.find_nearest(Vec2::new(x as f32, y as f32)))
        .collect();

    let colors = if outline.only {
        Vec::new()
    } else {
        region_colors(image, &owner, sites.len())
    };

    let w = width as usize;
    let out = RgbImage::from_fn(width, height, |x, y| {
        let i = y as usize * w + x as usize;
        let region = owner[i];
        let fill = match colors.get(region) {
            Some(&color) => color,
            None => *image.get_pixel(x, y),
        };
        let right = x + 1 < width && owner[i + 1] != region;
        let below = y + 1 < height && owner[i + w] != region;
        if right || below {
            outline.edge_color(fill, OUTLINE_DARKEN)
        } else {
            fill
        }
    });

    let label = match source {
        PentagonMesh::Fibonacci(step) => format!("Pentagons: Fibonacci-Steps: {}", step),
        PentagonMesh::Lloyd(cells) => format!("Pentagons: Lloyd-Cell-Size: {}", cells),
        PentagonMesh::Random => "Pentagons: Random-Steps: true".to_string(),
    };
    Ok(RenderedTile::new(label + outline.label_suffix(), out))
}

/// Mean color of every region, indexed like the sites
fn region_colors(image: &RgbImage, owner: &[usize], regions: usize) -> Vec<Rgb<u8>> {
    let mut sums = vec![[0u64; 4]; regions];
    for (i, pixel) in image.pixels().enumerate() {
        let sum = &mut sums[owner[i]];
        for c in 0..3 {
            sum[c] += pixel.0[c] as u64;
        }
        sum[3] += 1;
    }
    sums.iter()
        .map(|s| {
            let n = s[3].max(1);
            Rgb([(s[0] / n) as u8, (s[1] / n) as u8, (s[2] / n) as u8])
        })
        .collect()
}
