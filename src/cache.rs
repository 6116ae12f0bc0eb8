//! Per-image mesh cache
//!
//! Meshes are expensive and many tile variants share them, so each image
//! worker owns one [`MeshCache`] and hands it to every task that needs a mesh.
//! Each distinct [`MeshKey`] is computed at most once per cache.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use image::RgbImage;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::generation::{MeshGenerator, SeededMeshGenerator};
use crate::geometry::PointSet;

/// Default step at which the adaptive recurrence bottoms out
pub const DEFAULT_APPROXIMATION_FLOOR: u32 = 20;

/// Identifies one cached mesh
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKey {
    /// Density-adaptive mesh, `step` in `(0, 50]`
    Fibonacci { step: u32 },
    /// Relaxed mesh, `cell_density` in `[1, 100]`, `iterations` in `(0, 50)`
    Lloyd { cell_density: u32, iterations: usize },
}

impl fmt::Display for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshKey::Fibonacci { step } => write!(f, "fibonacci(step={})", step),
            MeshKey::Lloyd {
                cell_density,
                iterations,
            } => write!(f, "lloyd(cells={}, iterations={})", cell_density, iterations),
        }
    }
}

struct Slot<V> {
    value: OnceLock<Arc<V>>,
    guard: Mutex<()>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: OnceLock::new(),
            guard: Mutex::new(()),
        }
    }
}

/// Map whose values are each computed at most once
///
/// Completed entries are read without touching the per-key guard. Concurrent
/// callers for a missing key queue on that key's guard; the first computes,
/// the rest wake up to the stored value. A failed computation releases the
/// guard and stores nothing, so a later caller retries.
pub struct OnceMap<K, V> {
    slots: RwLock<HashMap<K, Arc<Slot<V>>>>,
}

impl<K: Eq + Hash + Clone, V> OnceMap<K, V> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Completed value for `key`, if any
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.slots
            .read()
            .get(key)
            .and_then(|slot| slot.value.get().cloned())
    }

    /// Number of completed entries
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.value.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the value for `key`, computing it with `compute` if needed
    ///
    /// `compute` may itself call `compute_or_wait` for other keys, as long as
    /// those calls never cycle back to `key`.
    pub fn compute_or_wait<F>(&self, key: K, compute: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let slot = self.slot(key);
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _guard = slot.guard.lock();
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let value = Arc::new(compute()?);
        let stored = slot.value.get_or_init(|| value);
        Ok(stored.clone())
    }

    fn slot(&self, key: K) -> Arc<Slot<V>> {
        if let Some(slot) = self.slots.read().get(&key) {
            return slot.clone();
        }
        self.slots.write().entry(key).or_default().clone()
    }
}

impl<K: Eq + Hash + Clone, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Store that serialises every lookup and computation behind one lock
pub struct SerialStore<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash, V> SerialStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Check-and-compute under the store lock
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&key) {
            return Ok(value.clone());
        }
        let value = Arc::new(compute()?);
        entries.insert(key, value.clone());
        Ok(value)
    }
}

impl<K: Eq + Hash, V> Default for SerialStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Memoising mesh store for a single image
///
/// Density-adaptive meshes use per-key exclusion; relaxed meshes serialise
/// on the whole store.
///
/// # Example
///
/// ```rust
/// use voronoi_mosaic::{MeshCache, MeshKey};
/// use image::RgbImage;
///
/// let image = RgbImage::new(64, 48);
/// let cache = MeshCache::for_image(&image, 42);
///
/// let first = cache.get(&MeshKey::Fibonacci { step: 10 }).unwrap();
/// let again = cache.get(&MeshKey::Fibonacci { step: 10 }).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &again));
/// ```
pub struct MeshCache<G: MeshGenerator = SeededMeshGenerator> {
    generator: G,
    adaptive: OnceMap<u32, PointSet>,
    relaxed: SerialStore<(u32, usize), PointSet>,
    approximation_floor: Option<u32>,
}

impl MeshCache<SeededMeshGenerator> {
    /// Cache backed by the default seeded generators
    pub fn for_image(image: &RgbImage, seed: u64) -> Self {
        Self::new(SeededMeshGenerator::new(image, seed))
    }
}

impl<G: MeshGenerator> MeshCache<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            adaptive: OnceMap::new(),
            relaxed: SerialStore::new(),
            approximation_floor: None,
        }
    }

    /// Route [`MeshCache::get`] through the adaptive recurrence
    pub fn with_approximation(mut self, floor: u32) -> Self {
        self.approximation_floor = Some(floor);
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Number of meshes computed so far
    pub fn len(&self) -> usize {
        self.adaptive.len() + self.relaxed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch or compute the mesh for any key
    pub fn get(&self, key: &MeshKey) -> Result<Arc<PointSet>> {
        match *key {
            MeshKey::Fibonacci { step } => match self.approximation_floor {
                Some(floor) => self.get_or_compute_adaptive_with(step, true, floor),
                None => self.get_or_compute_adaptive(step),
            },
            MeshKey::Lloyd {
                cell_density,
                iterations,
            } => self.get_or_compute_relaxed(cell_density, iterations),
        }
    }

    /// Density-adaptive mesh for `step`, computed directly on a miss
    pub fn get_or_compute_adaptive(&self, step: u32) -> Result<Arc<PointSet>> {
        self.get_or_compute_adaptive_with(step, false, DEFAULT_APPROXIMATION_FLOOR)
    }

    /// Density-adaptive mesh for `step`, optionally via the recurrence
    ///
    /// With `allow_approximation`, a miss below `floor - 1` is filled with
    /// `mesh(step + 1) ++ mesh(step + 2)`; `floor - 1` is computed directly
    /// and anything at or above `floor` is computed at `floor`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a step outside `(0, 50]` or a zero floor.
    pub fn get_or_compute_adaptive_with(
        &self,
        step: u32,
        allow_approximation: bool,
        floor: u32,
    ) -> Result<Arc<PointSet>> {
        crate::generation::validate_step(step)?;

        if let Some(hit) = self.adaptive.get(&step) {
            log::debug!("reusing fibonacci mesh step {}", step);
            return Ok(hit);
        }

        if !allow_approximation {
            return self
                .adaptive
                .compute_or_wait(step, || self.generator.density_adaptive(step));
        }

        if floor == 0 {
            return Err(MosaicError::InvalidArgument(
                "approximation floor must be positive".to_string(),
            ));
        }

        if step >= floor {
            self.adaptive
                .compute_or_wait(step, || self.generator.density_adaptive(floor))
        } else if step == floor - 1 {
            self.adaptive
                .compute_or_wait(step, || self.generator.density_adaptive(step))
        } else {
            self.adaptive.compute_or_wait(step, || {
                let one = self.get_or_compute_adaptive_with(step + 1, true, floor)?;
                let two = self.get_or_compute_adaptive_with(step + 2, true, floor)?;
                Ok(PointSet::concat(&one, &two))
            })
        }
    }

    /// Relaxed mesh for `(cell_density, iterations)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for out-of-range parameters.
    pub fn get_or_compute_relaxed(
        &self,
        cell_density: u32,
        iterations: usize,
    ) -> Result<Arc<PointSet>> {
        crate::generation::validate_relaxed(cell_density, iterations)?;
        self.relaxed.get_or_compute((cell_density, iterations), || {
            log::debug!(
                "computing lloyd mesh cells={} iterations={}",
                cell_density,
                iterations
            );
            self.generator.relaxed(cell_density, iterations)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;
    use image::Rgb;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Generator double that counts calls and records requested steps
    #[derive(Default)]
    struct CountingGenerator {
        adaptive_calls: AtomicUsize,
        relaxed_calls: AtomicUsize,
        steps: Mutex<Vec<u32>>,
        fail_next: AtomicBool,
        delay: Option<Duration>,
    }

    impl CountingGenerator {
        fn slow() -> Self {
            Self {
                delay: Some(Duration::from_millis(50)),
                ..Default::default()
            }
        }
    }

    impl MeshGenerator for CountingGenerator {
        fn dimensions(&self) -> (u32, u32) {
            (100, 100)
        }

        fn density_adaptive(&self, step: u32) -> Result<PointSet> {
            self.adaptive_calls.fetch_add(1, Ordering::SeqCst);
            self.steps.lock().push(step);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(MosaicError::GenerationFailed("injected".to_string()));
            }
            Ok(PointSet::from_points(vec![IVec2::new(step as i32, 0); step as usize]))
        }

        fn relaxed(&self, cell_density: u32, iterations: usize) -> Result<PointSet> {
            self.relaxed_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            Ok(PointSet::from_points(vec![IVec2::new(
                cell_density as i32,
                iterations as i32,
            )]))
        }
    }

    #[test]
    fn test_concurrent_adaptive_computes_once() {
        let cache = MeshCache::new(CountingGenerator::slow());

        let results: Vec<Arc<PointSet>> = thread::scope(|s| {
            let handles: Vec<_> = (0..6)
                .map(|_| s.spawn(|| cache.get_or_compute_adaptive(10).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.generator().adaptive_calls.load(Ordering::SeqCst), 1);
        for result in &results {
            assert_eq!(**result, *results[0]);
        }
    }

    #[test]
    fn test_concurrent_relaxed_computes_once() {
        let cache = MeshCache::new(CountingGenerator::slow());

        let results: Vec<Arc<PointSet>> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| cache.get_or_compute_relaxed(47, 10).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.generator().relaxed_calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn test_distinct_keys_compute_separately() {
        let cache = MeshCache::new(CountingGenerator::default());
        cache.get(&MeshKey::Fibonacci { step: 7 }).unwrap();
        cache.get(&MeshKey::Fibonacci { step: 11 }).unwrap();
        cache.get(&MeshKey::Fibonacci { step: 7 }).unwrap();
        cache
            .get(&MeshKey::Lloyd {
                cell_density: 2,
                iterations: 10,
            })
            .unwrap();

        assert_eq!(cache.generator().adaptive_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.generator().relaxed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_recurrence_matches_concatenation() {
        let image = RgbImage::from_fn(60, 40, |x, y| Rgb([(x * 4) as u8, (y * 6) as u8, 90]));
        let cache = MeshCache::for_image(&image, 3);

        let c18 = cache.get_or_compute_adaptive_with(18, true, 20).unwrap();
        let c19 = cache.get_or_compute_adaptive_with(19, true, 20).unwrap();
        let c20 = cache.get_or_compute_adaptive_with(20, true, 20).unwrap();

        assert_eq!(*c18, PointSet::concat(&c19, &c20));
    }

    #[test]
    fn test_recurrence_only_computes_base_cases() {
        let cache = MeshCache::new(CountingGenerator::default());
        let mesh = cache.get_or_compute_adaptive_with(15, true, 20).unwrap();

        let mut steps = cache.generator().steps.lock().clone();
        steps.sort_unstable();
        assert_eq!(steps, vec![19, 20]);

        // |m(n)| follows the Fibonacci recurrence from |m(19)| = 19, |m(20)| = 20
        let mut sizes = [19usize, 20];
        for _ in 15..19 {
            sizes = [sizes[0] + sizes[1], sizes[0]];
        }
        assert_eq!(mesh.len(), sizes[0]);
    }

    #[test]
    fn test_recurrence_clamps_to_floor() {
        let cache = MeshCache::new(CountingGenerator::default());
        let mesh = cache.get_or_compute_adaptive_with(30, true, 20).unwrap();
        assert_eq!(*cache.generator().steps.lock(), vec![20]);
        assert_eq!(mesh.len(), 20);
    }

    #[test]
    fn test_direct_path_ignores_recurrence() {
        let cache = MeshCache::new(CountingGenerator::default());
        cache.get_or_compute_adaptive(5).unwrap();
        assert_eq!(*cache.generator().steps.lock(), vec![5]);
    }

    #[test]
    fn test_with_approximation_routes_get() {
        let cache = MeshCache::new(CountingGenerator::default()).with_approximation(20);
        cache.get(&MeshKey::Fibonacci { step: 18 }).unwrap();
        assert_eq!(cache.generator().adaptive_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_releases_key() {
        let cache = MeshCache::new(CountingGenerator::default());
        cache.generator().fail_next.store(true, Ordering::SeqCst);

        assert!(cache.get_or_compute_adaptive(9).is_err());
        assert!(cache.is_empty());

        let retried = cache.get_or_compute_adaptive(9).unwrap();
        assert_eq!(retried.len(), 9);
        assert_eq!(cache.generator().adaptive_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_keys_rejected_before_compute() {
        let cache = MeshCache::new(CountingGenerator::default());
        assert!(matches!(
            cache.get_or_compute_adaptive(0),
            Err(MosaicError::InvalidArgument(_))
        ));
        assert!(cache.get_or_compute_adaptive(51).is_err());
        assert!(cache.get_or_compute_relaxed(0, 10).is_err());
        assert!(cache.get_or_compute_relaxed(10, 50).is_err());
        assert!(cache.get_or_compute_adaptive_with(10, true, 0).is_err());
        assert_eq!(cache.generator().adaptive_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.generator().relaxed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_once_map_direct() {
        let map: OnceMap<&str, usize> = OnceMap::new();
        assert!(map.get(&"a").is_none());
        assert_eq!(*map.compute_or_wait("a", || Ok(1)).unwrap(), 1);
        assert_eq!(*map.compute_or_wait("a", || Ok(2)).unwrap(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_mesh_key_display() {
        assert_eq!(MeshKey::Fibonacci { step: 7 }.to_string(), "fibonacci(step=7)");
        assert_eq!(
            MeshKey::Lloyd {
                cell_density: 47,
                iterations: 10
            }
            .to_string(),
            "lloyd(cells=47, iterations=10)"
        );
    }
}
