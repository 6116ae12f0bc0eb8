//! Mosaic pipeline configuration and builder
//!
//! Everything a run needs besides the images themselves: which tile variants
//! to render, how many images may be in flight, how batches are grouped for
//! display, pacing and timeouts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MosaicError, Result};
use crate::generation::validate_relaxed;
use crate::tiles::{Outline, PentagonMesh, TileVariant};

/// Delay a worker observes after delivering its batch, while still holding its permit
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingPolicy {
    /// Release the permit immediately
    #[default]
    None,
    /// Sleep a fixed duration per image
    Fixed(Duration),
    /// Sleep the given duration once per configured variant
    PerVariant(Duration),
}

impl PacingPolicy {
    /// Delay for a batch of `variant_count` tiles
    pub fn delay(&self, variant_count: usize) -> Duration {
        match *self {
            PacingPolicy::None => Duration::ZERO,
            PacingPolicy::Fixed(d) => d,
            PacingPolicy::PerVariant(d) => d.saturating_mul(variant_count as u32),
        }
    }
}

/// Configuration for a mosaic run
///
/// # Example
///
/// ```rust
/// use voronoi_mosaic::*;
///
/// let config = MosaicConfigBuilder::new()
///     .seed(42)
///     .max_in_flight(2)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.variants.len(), 19);
///
/// # #[cfg(feature = "serde")]
/// # {
/// let json = serde_json::to_string(&config).unwrap();
/// let restored: MosaicConfig = serde_json::from_str(&json).unwrap();
/// assert_eq!(config, restored);
/// # }
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicConfig {
    /// Tile variants rendered for every image, in fan-out order
    pub variants: Vec<TileVariant>,

    /// Maximum number of images whose tasks run at the same time
    pub max_in_flight: usize,

    /// Upper bound on images shown together, original frame included
    pub display_group_size: usize,

    /// Pause after each delivered batch
    pub pacing: PacingPolicy,

    /// How long a fan-in waits for outstanding results; `None` waits forever
    pub fan_in_timeout: Option<Duration>,

    /// Base seed for meshes, random points and gradient choice
    pub seed: u64,

    /// k-means iterations used for Lloyd meshes
    pub lloyd_iterations: usize,

    /// When set, fibonacci meshes below this step are built from the two steps above
    pub approximation_floor: Option<u32>,

    /// Capacity of the channel between image workers and the display consumer
    pub delivery_capacity: usize,

    /// Edge drawing for triangle and pentagon tiles
    pub outline: Outline,

    /// Folder of textures blended into circle tiles; `None` disables blending
    pub blend_dir: Option<PathBuf>,
}

impl MosaicConfig {
    /// The full variant set: 4 squares, 5 triangles, 4 circles and 6 pentagons
    pub fn default_variants() -> Vec<TileVariant> {
        let mut variants = Vec::with_capacity(19);
        variants.extend(
            [None, Some(5), Some(30), Some(50)]
                .into_iter()
                .map(|size_percent| TileVariant::Squares { size_percent }),
        );
        variants.extend(
            [None, Some(7), Some(11), Some(17), Some(31)]
                .into_iter()
                .map(|fib_step| TileVariant::Triangles { fib_step }),
        );
        variants.extend(
            [None, Some(0.5), Some(2.0), Some(7.0)]
                .into_iter()
                .map(|spacing_percent| TileVariant::Circles { spacing_percent }),
        );
        variants.extend(
            [
                PentagonMesh::Random,
                PentagonMesh::Fibonacci(7),
                PentagonMesh::Fibonacci(23),
                PentagonMesh::Lloyd(2),
                PentagonMesh::Lloyd(47),
                PentagonMesh::Lloyd(97),
            ]
            .into_iter()
            .map(|mesh| TileVariant::Pentagons { mesh }),
        );
        variants
    }
}

impl Default for MosaicConfig {
    fn default() -> Self {
        MosaicConfigBuilder::new().finish()
    }
}

/// Builder for [`MosaicConfig`] with validation
///
/// # Example
///
/// ```rust
/// use voronoi_mosaic::*;
/// use std::time::Duration;
///
/// let config = MosaicConfigBuilder::new()
///     .variants(vec![TileVariant::Squares { size_percent: Some(50) }])
///     .unwrap()
///     .pacing(PacingPolicy::Fixed(Duration::from_millis(5)))
///     .fan_in_timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.variants.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MosaicConfigBuilder {
    variants: Vec<TileVariant>,
    max_in_flight: usize,
    display_group_size: usize,
    pacing: PacingPolicy,
    fan_in_timeout: Option<Duration>,
    seed: Option<u64>,
    lloyd_iterations: usize,
    approximation_floor: Option<u32>,
    delivery_capacity: usize,
    outline: Outline,
    blend_dir: Option<PathBuf>,
}

impl MosaicConfigBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - variants: [`MosaicConfig::default_variants`]
    /// - max_in_flight: 3
    /// - display_group_size: 3
    /// - pacing: none
    /// - fan_in_timeout: none (wait forever)
    /// - seed: random
    /// - lloyd_iterations: 10
    /// - approximation_floor: none (always compute meshes directly)
    /// - delivery_capacity: 3
    /// - outline: darkened region color, fill on
    /// - blend_dir: none
    pub fn new() -> Self {
        Self {
            variants: MosaicConfig::default_variants(),
            max_in_flight: 3,
            display_group_size: 3,
            pacing: PacingPolicy::None,
            fan_in_timeout: None,
            seed: None,
            lloyd_iterations: 10,
            approximation_floor: None,
            delivery_capacity: 3,
            outline: Outline::default(),
            blend_dir: None,
        }
    }

    /// Replace the variant list
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty list
    pub fn variants(mut self, variants: Vec<TileVariant>) -> Result<Self> {
        if variants.is_empty() {
            return Err(MosaicError::InvalidArgument(
                "at least one tile variant is required".to_string(),
            ));
        }
        self.variants = variants;
        Ok(self)
    }

    /// Set how many images may run their fan-out at once
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `count` is 0
    pub fn max_in_flight(mut self, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(MosaicError::InvalidArgument(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        self.max_in_flight = count;
        Ok(self)
    }

    /// Set the display group size
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `size` < 2; a group must fit the original and one tile
    pub fn display_group_size(mut self, size: usize) -> Result<Self> {
        if size < 2 {
            return Err(MosaicError::InvalidArgument(format!(
                "display group size must be >= 2 (got {})",
                size
            )));
        }
        self.display_group_size = size;
        Ok(self)
    }

    pub fn pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    /// Give up on outstanding task results after `timeout` per fan-in stage
    pub fn fan_in_timeout(mut self, timeout: Duration) -> Self {
        self.fan_in_timeout = Some(timeout);
        self
    }

    /// Set the base seed
    ///
    /// The same seed, images and variants always produce the same meshes.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the k-means iteration count for Lloyd meshes
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless `0 < iterations < 50`
    pub fn lloyd_iterations(mut self, iterations: usize) -> Result<Self> {
        validate_relaxed(1, iterations)?;
        self.lloyd_iterations = iterations;
        Ok(self)
    }

    /// Approximate fibonacci meshes below `floor` from the two steps above
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `floor` is 0
    pub fn approximation_floor(mut self, floor: u32) -> Result<Self> {
        if floor == 0 {
            return Err(MosaicError::InvalidArgument(
                "approximation floor must be at least 1".to_string(),
            ));
        }
        self.approximation_floor = Some(floor);
        Ok(self)
    }

    /// Set the delivery channel capacity
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `capacity` is 0
    pub fn delivery_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MosaicError::InvalidArgument(
                "delivery capacity must be at least 1".to_string(),
            ));
        }
        self.delivery_capacity = capacity;
        Ok(self)
    }

    pub fn outline(mut self, outline: Outline) -> Self {
        self.outline = outline;
        self
    }

    /// Blend circle tiles with textures from `dir`
    ///
    /// An empty or missing folder leaves circle tiles unblended.
    pub fn blend_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.blend_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    ///
    /// If no seed was provided, a random one is drawn.
    pub fn build(self) -> Result<MosaicConfig> {
        if self.variants.is_empty() {
            return Err(MosaicError::InvalidArgument(
                "at least one tile variant is required".to_string(),
            ));
        }
        Ok(self.finish())
    }

    fn finish(self) -> MosaicConfig {
        MosaicConfig {
            variants: self.variants,
            max_in_flight: self.max_in_flight,
            display_group_size: self.display_group_size,
            pacing: self.pacing,
            fan_in_timeout: self.fan_in_timeout,
            seed: self.seed.unwrap_or_else(rand::random),
            lloyd_iterations: self.lloyd_iterations,
            approximation_floor: self.approximation_floor,
            delivery_capacity: self.delivery_capacity,
            outline: self.outline,
            blend_dir: self.blend_dir,
        }
    }
}

impl Default for MosaicConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
