use glam::IVec2;
use image::{GrayImage, Luma, Rgb, RgbImage};

use super::fill::{equalize_histogram, fill_disc};
use super::RenderedTile;
use crate::error::Result;
use crate::geometry::{intensity, map_range, mean_intensity};

/// Spacing as a percentage of the longer image side
pub const DEFAULT_SPACING_PERCENT: f32 = 0.6;
const FALLBACK_SPACING_PERCENT: f32 = 2.0;
const MAX_SPACING_PERCENT: f32 = 50.0;

const CANVAS_WEIGHT: f64 = 0.9;
const SOURCE_WEIGHT: f64 = 0.1;
const BLEND_BIAS: f64 = 2.0;

/// Halftone rendering: one disc per cell, larger and darker where the image is dark
pub fn render_circles(image: &RgbImage, spacing_percent: Option<f32>) -> Result<RenderedTile> {
    let spacing = spacing_percent.unwrap_or(DEFAULT_SPACING_PERCENT);
    let spacing = if spacing > 0.0 && spacing < MAX_SPACING_PERCENT {
        spacing
    } else {
        FALLBACK_SPACING_PERCENT
    };

    let gray = equalize_histogram(&intensity(image));
    let (width, height) = gray.dimensions();
    let longest = width.max(height) as f64;
    let cell = map_range(spacing as f64, 0.0, MAX_SPACING_PERCENT as f64, 0.0, longest)? as u32;
    let cell = cell.max(1);

    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    for y in (0..height).step_by(cell as usize) {
        for x in (0..width).step_by(cell as usize) {
            let avg = mean_intensity(&gray, x, y, cell, cell);
            let radius = map_range(avg, 0.0, 255.0, (cell / 2) as f64, 2.0)? as i32;
            let level = map_range(avg, 0.0, 255.0, 5.0, 200.0)? as u8;
            let center = IVec2::new((2 * x + cell) as i32 / 2, (2 * y + cell) as i32 / 2);
            fill_disc(&mut canvas, center, radius, level);
        }
    }

    let out = RgbImage::from_fn(width, height, |x, y| {
        let c = canvas.get_pixel(x, y).0[0] as f64;
        let g = gray.get_pixel(x, y).0[0] as f64;
        let v = (CANVAS_WEIGHT * c + SOURCE_WEIGHT * g + BLEND_BIAS)
            .round()
            .clamp(0.0, 255.0) as u8;
        Rgb([v, v, v])
    });

    Ok(RenderedTile::new(
        format!("Circles: Steps: {} Spacing: {}%", cell, spacing),
        out,
    ))
}
