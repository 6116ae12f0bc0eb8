//! Batch display
//!
//! The consumer side of the pipeline. A [`Display`] shows a slice of a
//! [`WorkBatch`] next to the original frame; [`show_in_groups`] splits a batch
//! into slices small enough to show together.

use image::RgbImage;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::WorkBatch;
use crate::error::{MosaicError, Result};
use crate::tiles::RenderedTile;

/// A sink for rendered batches
pub trait Display {
    /// Show tiles `low..high` of `batch` alongside its original frame
    fn show(&mut self, batch: &WorkBatch, low: usize, high: usize) -> Result<()>;
}

/// Show `[low, high)` in leaves of fewer than `group_size` tiles
///
/// Each leaf is shown together with the original frame, so no leaf puts more
/// than `group_size` images on screen. Empty ranges are skipped.
///
/// # Errors
///
/// Returns `InvalidArgument` for a group size below 2, which could never fit
/// the original frame and a tile.
pub fn show_in_groups<D: Display + ?Sized>(
    display: &mut D,
    batch: &WorkBatch,
    low: usize,
    high: usize,
    group_size: usize,
) -> Result<()> {
    if group_size < 2 {
        return Err(MosaicError::InvalidArgument(format!(
            "display group size must be >= 2 (got {})",
            group_size
        )));
    }
    split_groups(display, batch, low, high, group_size)
}

fn split_groups<D: Display + ?Sized>(
    display: &mut D,
    batch: &WorkBatch,
    low: usize,
    high: usize,
    group_size: usize,
) -> Result<()> {
    if low >= high {
        return Ok(());
    }
    if high - low < group_size {
        return display.show(batch, low, high);
    }
    let mid = low + (high - low) / 2;
    split_groups(display, batch, low, mid, group_size)?;
    split_groups(display, batch, mid, high, group_size)
}

/// Clamp `low..high` to a list of `len` tiles
fn clamp(low: usize, high: usize, len: usize) -> Range<usize> {
    low.min(len)..high.min(len)
}

/// Lay images out left to right, top-aligned
fn side_by_side<'a, I>(images: I) -> RgbImage
where
    I: IntoIterator<Item = &'a RgbImage> + Clone,
{
    let width = images.clone().into_iter().map(|i| i.width()).sum();
    let height = images.clone().into_iter().map(|i| i.height()).max().unwrap_or(0);

    let mut canvas = RgbImage::new(width, height);
    let mut x = 0i64;
    for image in images {
        image::imageops::replace(&mut canvas, image, x, 0);
        x += image.width() as i64;
    }
    canvas
}

/// Writes each group as composite PNGs: the original followed by the tiles
#[derive(Debug)]
pub struct CompositeWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CompositeWriter {
    /// Create a writer targeting `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| MosaicError::Output {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Paths written so far, in order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_group(
        &mut self,
        batch: &WorkBatch,
        tiles: &[RenderedTile],
        kind: &str,
        low: usize,
        high: usize,
    ) -> Result<()> {
        if tiles.is_empty() {
            return Ok(());
        }
        let stem = Path::new(&batch.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| batch.name.clone());
        let path = self
            .dir
            .join(format!("{}_{}_{:02}-{:02}.png", stem, kind, low, high));

        let composite = side_by_side(
            std::iter::once(&*batch.original).chain(tiles.iter().map(|t| &t.image)),
        );
        composite.save(&path).map_err(|e| MosaicError::Output {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        for tile in tiles {
            log::debug!("{}: wrote {} ({})", batch.name, path.display(), tile.label);
        }
        self.written.push(path);
        Ok(())
    }
}

impl Display for CompositeWriter {
    fn show(&mut self, batch: &WorkBatch, low: usize, high: usize) -> Result<()> {
        let mosaics = &batch.mosaics[clamp(low, high, batch.mosaics.len())];
        let gradients = &batch.gradients[clamp(low, high, batch.gradients.len())];
        self.write_group(batch, mosaics, "mosaics", low, high)?;
        self.write_group(batch, gradients, "gradients", low, high)
    }
}

/// Logs tile labels instead of showing anything
///
/// Keeps every shown range, which makes it handy as a test sink.
#[derive(Debug, Default)]
pub struct LogDisplay {
    shown: Vec<(String, Range<usize>)>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(image name, tile range)` shown so far
    pub fn shown(&self) -> &[(String, Range<usize>)] {
        &self.shown
    }
}

impl Display for LogDisplay {
    fn show(&mut self, batch: &WorkBatch, low: usize, high: usize) -> Result<()> {
        let labels: Vec<&str> = batch.mosaics[clamp(low, high, batch.mosaics.len())]
            .iter()
            .chain(&batch.gradients[clamp(low, high, batch.gradients.len())])
            .map(|t| t.label.as_str())
            .collect();
        log::info!("{} [{}..{}]: {}", batch.name, low, high, labels.join(" | "));
        self.shown.push((batch.name.clone(), low..high));
        Ok(())
    }
}
