//! Rasterisation helpers shared by the tile renderers

use glam::IVec2;
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Mean color over a set of pixel coordinates, `None` if the set is empty
pub fn mean_color<I>(image: &RgbImage, pixels: I) -> Option<Rgb<u8>>
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (x, y) in pixels {
        let p = image.get_pixel(x, y).0;
        sum[0] += p[0] as u64;
        sum[1] += p[1] as u64;
        sum[2] += p[2] as u64;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(Rgb([
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ]))
}

/// Mean color of an axis-aligned block, clipped to the image
pub fn mean_block_color(image: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> Option<Rgb<u8>> {
    let x_end = x.saturating_add(w).min(image.width());
    let y_end = y.saturating_add(h).min(image.height());
    mean_color(
        image,
        (y..y_end).flat_map(move |py| (x..x_end).map(move |px| (px, py))),
    )
}

/// Color darkened by `amount` on every channel
#[inline]
pub fn darken(color: Rgb<u8>, amount: u8) -> Rgb<u8> {
    Rgb(color.0.map(|c| c.saturating_sub(amount)))
}

/// Pixels covered by a triangle (edges included), clipped to the image
pub fn triangle_pixels(tri: &[IVec2; 3], width: u32, height: u32) -> Vec<(u32, u32)> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let [a, b, c] = *tri;
    let min = a.min(b).min(c).max(IVec2::ZERO);
    let max = a
        .max(b)
        .max(c)
        .min(IVec2::new(width as i32 - 1, height as i32 - 1));
    if min.x > max.x || min.y > max.y {
        return Vec::new();
    }

    let edge = |u: IVec2, v: IVec2, p: IVec2| -> i64 {
        let (e, f) = ((v - u).as_i64vec2(), (p - u).as_i64vec2());
        e.x * f.y - e.y * f.x
    };

    let mut pixels = Vec::new();
    for y in min.y..=max.y {
        for x in min.x..=max.x {
            let p = IVec2::new(x, y);
            let (w0, w1, w2) = (edge(a, b, p), edge(b, c, p), edge(c, a, p));
            let inside = (w0 >= 0 && w1 >= 0 && w2 >= 0) || (w0 <= 0 && w1 <= 0 && w2 <= 0);
            if inside {
                pixels.push((x as u32, y as u32));
            }
        }
    }
    pixels
}

/// Pixels on the segment `a`-`b` (Bresenham), clipped to the image
pub fn line_pixels(a: IVec2, b: IVec2, width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut pixels = Vec::new();
    let delta = (b - a).abs();
    let step = IVec2::new(if a.x < b.x { 1 } else { -1 }, if a.y < b.y { 1 } else { -1 });
    let mut err = delta.x - delta.y;
    let mut p = a;

    loop {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
            pixels.push((p.x as u32, p.y as u32));
        }
        if p == b {
            break;
        }
        let e2 = 2 * err;
        if e2 > -delta.y {
            err -= delta.y;
            p.x += step.x;
        }
        if e2 < delta.x {
            err += delta.x;
            p.y += step.y;
        }
    }
    pixels
}

/// Draw a filled disc on a grayscale canvas
pub fn fill_disc(canvas: &mut GrayImage, center: IVec2, radius: i32, value: u8) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let r2 = radius * radius;
    for y in (center.y - radius).max(0)..=(center.y + radius).min(height - 1) {
        for x in (center.x - radius).max(0)..=(center.x + radius).min(width - 1) {
            let d = IVec2::new(x, y) - center;
            if d.length_squared() <= r2 {
                canvas.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}

/// Histogram-equalise a grayscale image
pub fn equalize_histogram(gray: &GrayImage) -> GrayImage {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cdf_min = histogram.iter().copied().find(|&n| n > 0).unwrap_or(0);
    if total == cdf_min {
        return gray.clone();
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (level, &count) in histogram.iter().enumerate() {
        cdf += count;
        let scaled = (cdf.saturating_sub(cdf_min)) as f64 / (total - cdf_min) as f64 * 255.0;
        lut[level] = scaled.round() as u8;
    }

    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}
