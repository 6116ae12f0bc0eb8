//! Work-distribution pipeline
//!
//! One worker thread per source image:
//!
//! 1. takes a permit from the shared [`AdmissionGate`];
//! 2. fans out one rendering task per [`TileVariant`], resolving meshes
//!    through the image's own [`MeshCache`];
//! 3. fans the rendered tiles back in, starting a gradient remap task for
//!    each one as it arrives;
//! 4. fans the remapped tiles in;
//! 5. delivers a [`WorkBatch`] to the single display consumer;
//! 6. paces itself, then releases the permit.
//!
//! Task panics and timeouts become recorded failures, so a worker always
//! delivers a (possibly degraded) batch.

pub mod display;
pub mod gate;
pub mod source;

pub use display::{show_in_groups, CompositeWriter, Display, LogDisplay};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use source::{load_images, SourceImage};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cache::MeshCache;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, Result};
use crate::stylise::{map_gradient, BlendTextures};
use crate::tiles::{RenderOptions, RenderedTile, TileVariant};

/// Which fan-in a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Render,
    Remap,
}

/// A task that produced no tile
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub stage: Stage,
    /// Variant or tile the task was working on
    pub task: String,
    pub error: MosaicError,
}

/// Result of one rendering or remap task
#[derive(Debug)]
pub enum TaskOutcome {
    Done(RenderedTile),
    Failed(TaskFailure),
}

/// Everything produced for one source image
#[derive(Debug, Clone)]
pub struct WorkBatch {
    pub name: String,
    pub original: Arc<RgbImage>,
    pub mosaics: Vec<RenderedTile>,
    pub gradients: Vec<RenderedTile>,
    pub failures: Vec<TaskFailure>,
}

impl WorkBatch {
    /// Whether any task failed or timed out
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of tile slots to display
    pub fn tile_count(&self) -> usize {
        self.mosaics.len().max(self.gradients.len())
    }
}

/// Totals reported by [`run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches handed to the display
    pub batches: usize,
    /// Batches that carried at least one failure
    pub degraded: usize,
    /// Workers that never delivered a batch
    pub lost: usize,
    /// Highest number of workers admitted at once
    pub peak_in_flight: usize,
}

fn task_seed(base: u64, image: usize, task: usize, stage: Stage) -> u64 {
    let stage = match stage {
        Stage::Render => 0x5245_4e44,
        Stage::Remap => 0x5245_4d50,
    };
    base.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (image as u64).rotate_left(40)
        ^ (task as u64).rotate_left(20)
        ^ stage
}

/// Run `task`, turning errors and panics into a failure outcome
fn run_task<F>(stage: Stage, name: String, task: F) -> TaskOutcome
where
    F: FnOnce() -> Result<RenderedTile>,
{
    let error = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(tile)) => return TaskOutcome::Done(tile),
        Ok(Err(e)) => e,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            MosaicError::TaskFailed(format!("{} panicked: {}", name, message))
        }
    };
    TaskOutcome::Failed(TaskFailure {
        stage,
        task: name,
        error,
    })
}

/// Receive `expected` outcomes, recording anything missing as a failure
///
/// Each outcome goes to `on_outcome` as it arrives. Returns one failure per
/// outcome that never arrived, on timeout or disconnect.
fn fan_in(
    rx: &Receiver<TaskOutcome>,
    expected: usize,
    timeout: Option<Duration>,
    stage: Stage,
    name: &str,
    mut on_outcome: impl FnMut(TaskOutcome),
) -> Vec<TaskFailure> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut missing = Vec::new();

    for received in 0..expected {
        let outcome = match deadline {
            Some(deadline) => rx.recv_deadline(deadline).map_err(|e| match e {
                RecvTimeoutError::Timeout => MosaicError::TaskFailed(format!(
                    "{:?} fan-in timed out after {:?}",
                    stage,
                    timeout.unwrap_or_default()
                )),
                RecvTimeoutError::Disconnected => MosaicError::ChannelClosed("task"),
            }),
            None => rx.recv().map_err(|_| MosaicError::ChannelClosed("task")),
        };

        match outcome {
            Ok(outcome) => on_outcome(outcome),
            Err(error) => {
                let lost = expected - received;
                log::warn!(
                    "{}: {} of {} {:?} results missing: {}",
                    name,
                    lost,
                    expected,
                    stage,
                    error
                );
                missing.extend((0..lost).map(|_| TaskFailure {
                    stage,
                    task: "missing".to_string(),
                    error: error.clone(),
                }));
                break;
            }
        }
    }
    missing
}

/// Render, remap and collect every configured variant for one image
///
/// Rendering tasks look their meshes up in `cache` concurrently. `index`
/// distinguishes images that share the same base seed.
pub fn render_batch(
    name: &str,
    image: Arc<RgbImage>,
    cache: &Arc<MeshCache>,
    textures: &Arc<BlendTextures>,
    config: &MosaicConfig,
    index: usize,
) -> WorkBatch {
    let mut failures = Vec::new();
    let (render_tx, render_rx) = unbounded::<TaskOutcome>();

    let launched = config.variants.len();
    for (i, &variant) in config.variants.iter().enumerate() {
        let tx = render_tx.clone();
        let image = Arc::clone(&image);
        let cache = Arc::clone(cache);
        let textures = Arc::clone(textures);
        let seed = task_seed(config.seed, index, i, Stage::Render);
        let lloyd_iterations = config.lloyd_iterations;
        let outline = config.outline;
        let name = name.to_string();
        thread::spawn(move || {
            let outcome = run_task(Stage::Render, variant.to_string(), || {
                let mesh = variant
                    .mesh_key(lloyd_iterations)
                    .map(|key| cache.get(&key))
                    .transpose()?;
                let options = RenderOptions {
                    outline,
                    textures: Some(&*textures),
                };
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                variant.render_with(&image, mesh.as_deref(), &options, &mut rng)
            });
            if tx.send(outcome).is_err() {
                log::debug!("{}: {} finished after its fan-in gave up", name, variant);
            }
        });
    }
    drop(render_tx);
    log::info!("{}: fanned out {} tasks", name, launched);

    let (remap_tx, remap_rx) = unbounded::<TaskOutcome>();
    let mut mosaics = Vec::with_capacity(launched);
    let mut remaps = 0;
    let missing = fan_in(
        &render_rx,
        launched,
        config.fan_in_timeout,
        Stage::Render,
        name,
        |outcome| match outcome {
            TaskOutcome::Done(tile) => {
                let tx = remap_tx.clone();
                let source = tile.image.clone();
                let label = tile.label.clone();
                let seed = task_seed(config.seed, index, remaps, Stage::Remap);
                let name = name.to_string();
                thread::spawn(move || {
                    let outcome = run_task(Stage::Remap, label.clone(), || {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed);
                        let (map, image) = map_gradient(&source, &mut rng);
                        Ok(RenderedTile::new(format!("Gradient: {}", map), image))
                    });
                    if tx.send(outcome).is_err() {
                        log::debug!(
                            "{}: remap of {} finished after its fan-in gave up",
                            name,
                            label
                        );
                    }
                });
                remaps += 1;
                mosaics.push(tile);
            }
            TaskOutcome::Failed(failure) => {
                log::warn!("{}: {} failed: {}", name, failure.task, failure.error);
                failures.push(failure);
            }
        },
    );
    failures.extend(missing);
    drop(remap_tx);
    log::info!(
        "{}: render stage drained ({} tiles, {} cached meshes)",
        name,
        mosaics.len(),
        cache.len()
    );

    let mut gradients = Vec::with_capacity(remaps);
    let missing = fan_in(
        &remap_rx,
        remaps,
        config.fan_in_timeout,
        Stage::Remap,
        name,
        |outcome| match outcome {
            TaskOutcome::Done(tile) => gradients.push(tile),
            TaskOutcome::Failed(failure) => {
                log::warn!("{}: remap of {} failed: {}", name, failure.task, failure.error);
                failures.push(failure);
            }
        },
    );
    failures.extend(missing);
    log::info!("{}: remap stage drained ({} gradients)", name, gradients.len());

    WorkBatch {
        name: name.to_string(),
        original: image,
        mosaics,
        gradients,
        failures,
    }
}

/// Full per-image worker: admission, fan-out/fan-in, delivery and pacing
pub fn process_image(
    source: SourceImage,
    index: usize,
    config: &MosaicConfig,
    textures: &Arc<BlendTextures>,
    gate: &AdmissionGate,
    delivery: &Sender<WorkBatch>,
) -> Result<()> {
    let _permit = gate.acquire();
    log::info!("{}: admitted ({} in flight)", source.name, gate.in_flight());

    let image = Arc::new(source.image);
    let mut cache = MeshCache::for_image(&image, config.seed.wrapping_add(index as u64));
    if let Some(floor) = config.approximation_floor {
        cache = cache.with_approximation(floor);
    }
    let cache = Arc::new(cache);

    let batch = render_batch(&source.name, image, &cache, textures, config, index);
    if batch.is_degraded() {
        log::warn!(
            "{}: delivering degraded batch ({} failures)",
            source.name,
            batch.failures.len()
        );
    }
    delivery
        .send(batch)
        .map_err(|_| MosaicError::ChannelClosed("delivery"))?;
    log::info!("{}: batch delivered", source.name);

    let delay = config.pacing.delay(config.variants.len());
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    Ok(())
}

/// Turn every image into a batch and show it on `sink`
///
/// Workers run concurrently, bounded by `config.max_in_flight`. Batches are
/// shown one at a time in delivery order.
///
/// # Errors
///
/// Returns the first error from the display sink, or `InvalidArgument` for
/// an unusable configuration.
pub fn run<D: Display + ?Sized>(
    images: Vec<SourceImage>,
    config: &MosaicConfig,
    sink: &mut D,
) -> Result<RunSummary> {
    let gate = AdmissionGate::new(config.max_in_flight)?;
    if config.delivery_capacity == 0 {
        return Err(MosaicError::InvalidArgument(
            "delivery capacity must be at least 1".to_string(),
        ));
    }
    let textures = Arc::new(match &config.blend_dir {
        Some(dir) => BlendTextures::load(dir)?,
        None => BlendTextures::default(),
    });
    let lost = AtomicUsize::new(0);
    let total = images.len();

    let mut summary = thread::scope(|scope| -> Result<RunSummary> {
        let (tx, rx) = bounded::<WorkBatch>(config.delivery_capacity);
        for (index, source) in images.into_iter().enumerate() {
            let tx = tx.clone();
            let (gate, lost, textures) = (&gate, &lost, &textures);
            scope.spawn(move || {
                let name = source.name.clone();
                if let Err(e) = process_image(source, index, config, textures, gate, &tx) {
                    log::warn!("{}: worker stopped: {}", name, e);
                    lost.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        drop(tx);

        let mut summary = RunSummary::default();
        for batch in rx.iter() {
            show_in_groups(sink, &batch, 0, batch.tile_count(), config.display_group_size)?;
            summary.batches += 1;
            if batch.is_degraded() {
                summary.degraded += 1;
            }
        }
        Ok(summary)
    })?;

    summary.lost = lost.load(Ordering::Relaxed);
    summary.peak_in_flight = gate.peak_in_flight();
    log::info!(
        "Displayed {} of {} batches ({} degraded)",
        summary.batches,
        total,
        summary.degraded
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MosaicConfigBuilder, PacingPolicy};
    use crate::tiles::PentagonMesh;
    use image::Rgb;

    fn photo(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn config_with(variants: Vec<TileVariant>) -> MosaicConfig {
        MosaicConfigBuilder::new()
            .seed(9)
            .variants(variants)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_batch_collects_both_stages() {
        let config = config_with(vec![
            TileVariant::Squares { size_percent: Some(10) },
            TileVariant::Triangles { fib_step: Some(20) },
            TileVariant::Circles { spacing_percent: Some(5.0) },
            TileVariant::Pentagons { mesh: PentagonMesh::Lloyd(60) },
        ]);
        let image = Arc::new(photo(64, 48));
        let cache = Arc::new(MeshCache::for_image(&image, 1));
        let textures = Arc::new(BlendTextures::default());

        let batch = render_batch("photo.png", image, &cache, &textures, &config, 0);
        assert_eq!(batch.mosaics.len(), 4);
        assert_eq!(batch.gradients.len(), 4);
        assert!(!batch.is_degraded());
        assert_eq!(cache.len(), 2);
        assert!(batch.gradients.iter().all(|g| g.label.starts_with("Gradient: ")));
    }

    /// Keeps what each shown batch carried
    #[derive(Default)]
    struct Recorder {
        shown: Vec<(String, usize, usize, Vec<String>)>,
    }

    impl Display for Recorder {
        fn show(&mut self, batch: &WorkBatch, _: usize, _: usize) -> Result<()> {
            let labels = batch.mosaics.iter().map(|t| t.label.clone()).collect();
            self.shown.push((
                batch.name.clone(),
                batch.mosaics.len(),
                batch.gradients.len(),
                labels,
            ));
            Ok(())
        }
    }

    #[test]
    fn test_end_to_end_single_square_variant() {
        let config = config_with(vec![TileVariant::Squares { size_percent: Some(50) }]);
        let mut sink = Recorder::default();
        let images = vec![SourceImage::new("square.png", photo(100, 100))];

        let summary = run(images, &config, &mut sink).unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.degraded, 0);

        assert_eq!(sink.shown.len(), 1);
        let (name, mosaics, gradients, labels) = &sink.shown[0];
        assert_eq!(name, "square.png");
        assert_eq!((*mosaics, *gradients), (1, 1));
        assert!(labels[0].contains("50"), "{}", labels[0]);
    }

    #[test]
    fn test_run_applies_outline_and_missing_blend_dir() {
        let config = MosaicConfigBuilder::new()
            .seed(4)
            .variants(vec![
                TileVariant::Triangles { fib_step: Some(20) },
                TileVariant::Circles { spacing_percent: Some(5.0) },
            ])
            .unwrap()
            .outline(crate::tiles::Outline::wireframe(None))
            .blend_dir(std::env::temp_dir().join("voronoi_mosaic_no_blend_dir"))
            .build()
            .unwrap();
        let mut sink = Recorder::default();
        let images = vec![SourceImage::new("wire.png", photo(40, 40))];

        run(images, &config, &mut sink).unwrap();
        let labels = &sink.shown[0].3;
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().any(|l| l.ends_with("Outline-Only")));
        assert!(labels.iter().all(|l| !l.contains("Blend")));
    }

    #[test]
    fn test_admission_gate_bounds_workers() {
        let config = MosaicConfigBuilder::new()
            .seed(1)
            .variants(vec![TileVariant::Squares { size_percent: Some(25) }])
            .unwrap()
            .max_in_flight(3)
            .unwrap()
            .pacing(PacingPolicy::Fixed(Duration::from_millis(30)))
            .build()
            .unwrap();
        let images = (0..5)
            .map(|i| SourceImage::new(format!("{}.png", i), photo(20, 20)))
            .collect();

        let mut sink = LogDisplay::new();
        let summary = run(images, &config, &mut sink).unwrap();
        assert_eq!(summary.batches, 5);
        assert!(summary.peak_in_flight <= 3);
        assert!(summary.peak_in_flight >= 1);
        assert_eq!(summary.lost, 0);
    }

    #[test]
    fn test_invalid_mesh_degrades_batch() {
        // Build the config by hand to get an out-of-range step past the builder
        let mut config = config_with(vec![TileVariant::Squares { size_percent: None }]);
        config.variants.push(TileVariant::Triangles { fib_step: Some(0) });

        let image = Arc::new(photo(30, 30));
        let cache = Arc::new(MeshCache::for_image(&image, 0));
        let textures = Arc::new(BlendTextures::default());
        let batch = render_batch("bad.png", image, &cache, &textures, &config, 0);

        assert_eq!(batch.mosaics.len(), 1);
        assert_eq!(batch.gradients.len(), 1);
        assert!(batch.is_degraded());
        assert_eq!(batch.failures[0].stage, Stage::Render);
        assert_eq!(batch.failures[0].task, "triangles(step=0)");
        assert!(matches!(batch.failures[0].error, MosaicError::InvalidArgument(_)));
    }

    #[test]
    fn test_results_after_timeout_are_dropped() {
        let config = MosaicConfigBuilder::new()
            .seed(2)
            .variants(vec![TileVariant::Pentagons { mesh: PentagonMesh::Lloyd(80) }])
            .unwrap()
            .fan_in_timeout(Duration::ZERO)
            .build()
            .unwrap();
        let image = Arc::new(photo(64, 64));
        let cache = Arc::new(MeshCache::for_image(&image, 0));
        let textures = Arc::new(BlendTextures::default());

        let batch = render_batch("late.png", image, &cache, &textures, &config, 0);
        let render_failures = batch
            .failures
            .iter()
            .filter(|f| f.stage == Stage::Render)
            .count();
        assert_eq!(batch.mosaics.len() + render_failures, 1);
        assert!(batch.is_degraded());

        // the abandoned task still finishes and sends into a closed channel
        thread::sleep(Duration::from_millis(200));
    }

    #[test]
    fn test_run_task_catches_panics() {
        let outcome = run_task(Stage::Render, "boom".to_string(), || panic!("exploded"));
        match outcome {
            TaskOutcome::Failed(failure) => {
                assert_eq!(failure.task, "boom");
                let MosaicError::TaskFailed(message) = &failure.error else {
                    panic!("unexpected error {:?}", failure.error);
                };
                assert!(message.contains("exploded"));
            }
            TaskOutcome::Done(_) => panic!("panic was not caught"),
        }
    }

    #[test]
    fn test_fan_in_timeout_records_missing_results() {
        let (tx, rx) = unbounded::<TaskOutcome>();
        tx.send(TaskOutcome::Done(RenderedTile::new("one", RgbImage::new(1, 1))))
            .unwrap();

        let mut received = 0;
        let missing = fan_in(
            &rx,
            3,
            Some(Duration::from_millis(20)),
            Stage::Remap,
            "slow.png",
            |_| received += 1,
        );
        assert_eq!(received, 1);
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().all(|f| f.stage == Stage::Remap));
        drop(tx);
    }

    #[test]
    fn test_fan_in_without_timeout_detects_closed_channel() {
        let (tx, rx) = unbounded::<TaskOutcome>();
        drop(tx);
        let missing = fan_in(&rx, 2, None, Stage::Render, "gone.png", |_| {});
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].error, MosaicError::ChannelClosed("task"));
    }

    #[test]
    fn test_display_error_stops_run() {
        struct Failing;
        impl Display for Failing {
            fn show(&mut self, _: &WorkBatch, _: usize, _: usize) -> Result<()> {
                Err(MosaicError::Output {
                    path: "screen".to_string(),
                    reason: "unplugged".to_string(),
                })
            }
        }

        let config = config_with(vec![TileVariant::Squares { size_percent: Some(20) }]);
        let images = (0..4)
            .map(|i| SourceImage::new(format!("{}.png", i), photo(10, 10)))
            .collect();
        assert!(run(images, &config, &mut Failing).is_err());
    }
}
