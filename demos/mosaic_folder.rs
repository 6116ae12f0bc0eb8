//! Turn every photo in a folder into mosaics
//!
//! Usage: `cargo run --example mosaic_folder -- <input dir> [output dir] [texture dir]`

use std::path::PathBuf;
use std::time::Duration;
use voronoi_mosaic::*;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let input = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("photos"));
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("mosaics"));
    let textures = args.next().map(PathBuf::from);

    let images = load_images(&input, Some(rand::random()))?;
    if images.is_empty() {
        log::warn!("No images found in {}", input.display());
        return Ok(());
    }

    let mut builder = MosaicConfigBuilder::new()
        .pacing(PacingPolicy::Fixed(Duration::from_millis(200)))
        .fan_in_timeout(Duration::from_secs(300));
    if let Some(dir) = textures {
        builder = builder.blend_dir(dir);
    }
    let config = builder.build()?;
    log::info!(
        "Rendering {} variants for {} images (seed {})",
        config.variants.len(),
        images.len(),
        config.seed
    );

    let mut sink = CompositeWriter::new(&output)?;
    let summary = run(images, &config, &mut sink)?;

    println!(
        "Wrote {} files for {} batches ({} degraded, peak {} in flight)",
        sink.written().len(),
        summary.batches,
        summary.degraded,
        summary.peak_in_flight
    );
    Ok(())
}
