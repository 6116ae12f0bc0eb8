//! Image folder loading

use image::RgbImage;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};

use crate::error::{MosaicError, Result};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A decoded source image and the file name it came from
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub image: RgbImage,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, image: RgbImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

/// Decode a single image file into RGB
pub fn load_image(path: &Path) -> Result<SourceImage> {
    let image = image::open(path).map_err(|e| MosaicError::ImageDecode {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceImage::new(name, image.to_rgb8()))
}

/// Image files directly inside `dir`, sorted by path
pub fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MosaicError::InvalidArgument(format!("cannot read {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every decodable image in `dir`
///
/// Files are visited in path order, or shuffled when `shuffle_seed` is set.
/// Files that fail to decode are logged and skipped.
pub fn load_images(dir: &Path, shuffle_seed: Option<u64>) -> Result<Vec<SourceImage>> {
    let mut paths = image_paths(dir)?;
    if let Some(seed) = shuffle_seed {
        paths.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_image(path) {
            Ok(image) => images.push(image),
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    log::info!("Loaded {} of {} images from {}", images.len(), paths.len(), dir.display());
    Ok(images)
}
