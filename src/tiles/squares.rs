use image::RgbImage;

use super::fill::{darken, mean_block_color};
use super::RenderedTile;

/// Side length as a percentage of the longer image side
pub const DEFAULT_SIZE_PERCENT: u32 = 2;
const MAX_SIZE_PERCENT: u32 = 50;
const OUTLINE_DARKEN: u8 = 30;

/// Fill square blocks with their mean color and outline each one
///
/// Out-of-range sizes fall back to [`DEFAULT_SIZE_PERCENT`]. Blocks at the
/// right and bottom edges are clipped.
pub fn render_squares(image: &RgbImage, size_percent: Option<u32>) -> RenderedTile {
    let percent = size_percent
        .filter(|p| (1..=MAX_SIZE_PERCENT).contains(p))
        .unwrap_or(DEFAULT_SIZE_PERCENT);
    let (width, height) = image.dimensions();
    let side = (percent * width.max(height) / 100).max(1);

    let mut out = image.clone();
    for y in (0..height).step_by(side as usize) {
        for x in (0..width).step_by(side as usize) {
            let Some(color) = mean_block_color(image, x, y, side, side) else {
                continue;
            };
            let outline = darken(color, OUTLINE_DARKEN);
            let (x_end, y_end) = ((x + side).min(width), (y + side).min(height));
            for py in y..y_end {
                for px in x..x_end {
                    let border = px == x || py == y || px + 1 == x_end || py + 1 == y_end;
                    out.put_pixel(px, py, if border { outline } else { color });
                }
            }
        }
    }

    RenderedTile::new(
        format!("Squares: Size: {}% Tile-Size: {}", percent, side),
        out,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_half_size_blocks() {
        let image = RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                Rgb([100, 100, 100])
            } else {
                Rgb([200, 10, 50])
            }
        });
        let tile = render_squares(&image, Some(50));
        assert!(tile.label.contains("50"));
        assert_eq!(tile.label, "Squares: Size: 50% Tile-Size: 50");
        assert_eq!(tile.image.get_pixel(10, 10), &Rgb([100, 100, 100]));
        assert_eq!(tile.image.get_pixel(0, 10), &Rgb([70, 70, 70]));
        assert_eq!(tile.image.get_pixel(60, 60), &Rgb([200, 10, 50]));
        assert_eq!(tile.image.get_pixel(50, 60), &Rgb([170, 0, 20]));
    }

    #[test]
    fn test_out_of_range_falls_back() {
        let image = RgbImage::new(200, 100);
        assert!(render_squares(&image, Some(0)).label.contains("Size: 2%"));
        assert!(render_squares(&image, Some(51)).label.contains("Tile-Size: 4"));
        assert!(render_squares(&image, None).label.contains("Size: 2%"));
    }

    #[test]
    fn test_tiny_image() {
        let image = RgbImage::from_pixel(3, 2, Rgb([9, 9, 9]));
        let tile = render_squares(&image, Some(5));
        assert_eq!(tile.image.dimensions(), (3, 2));
        assert!(tile.label.ends_with("Tile-Size: 1"));
    }
}
