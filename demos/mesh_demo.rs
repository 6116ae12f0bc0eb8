//! Demonstration of mesh generation and caching

use image::{Rgb, RgbImage};
use std::time::Instant;
use voronoi_mosaic::*;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // A radial gradient: dark centre, bright rim
    let (width, height) = (640u32, 480u32);
    let image = RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - width as f32 / 2.0;
        let dy = y as f32 - height as f32 / 2.0;
        let v = ((dx * dx + dy * dy).sqrt() / 400.0 * 255.0).min(255.0) as u8;
        Rgb([v, v / 2, 255 - v])
    });
    println!("Image: {}x{}", width, height);

    let cache = MeshCache::for_image(&image, 42);

    println!("\n=== Density-adaptive meshes ===");
    for step in [7, 11, 17, 23, 31] {
        let start = Instant::now();
        let mesh = cache.get_or_compute_adaptive(step)?;
        println!("  step {:>2}: {:>6} points in {:?}", step, mesh.len(), start.elapsed());
    }

    println!("\n=== Relaxed meshes ===");
    for cells in [2, 47, 97] {
        let start = Instant::now();
        let mesh = cache.get_or_compute_relaxed(cells, 10)?;
        println!("  cells {:>2}: {:>6} points in {:?}", cells, mesh.len(), start.elapsed());
    }

    // Cached lookups come back without recomputing
    let start = Instant::now();
    let again = cache.get(&MeshKey::Fibonacci { step: 7 })?;
    println!("\nCached step 7: {} points in {:?}", again.len(), start.elapsed());
    println!("Cache holds {} meshes", cache.len());

    println!("\n=== Approximated meshes ===");
    let approx = MeshCache::for_image(&image, 42).with_approximation(DEFAULT_APPROXIMATION_FLOOR);
    for step in [19, 18, 15] {
        let mesh = approx.get(&MeshKey::Fibonacci { step })?;
        println!("  step {:>2}: {:>6} points", step, mesh.len());
    }

    println!("\n=== Triangulation ===");
    let mesh = cache.get_or_compute_adaptive(31)?;
    let triangles = generation::triangulate(mesh.as_slice());
    println!("  {} points -> {} triangles", mesh.len(), triangles.len());

    Ok(())
}
