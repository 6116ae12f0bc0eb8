//! Mesh-driven mosaic stylisation of photographs
//!
//! Partitions an image into squares, Delaunay triangles, Voronoi cells or
//! halftone circles, fills every region with its mean color and remaps the
//! result through a color gradient. Sample points come from three mesh
//! generators (uniform random, density-adaptive and k-means relaxed), shared
//! between tile variants through a per-image [`MeshCache`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voronoi_mosaic::*;
//! use std::path::Path;
//!
//! let images = load_images(Path::new("photos"), Some(7)).unwrap();
//! let config = MosaicConfigBuilder::new().seed(42).build().unwrap();
//! let mut sink = CompositeWriter::new("out").unwrap();
//!
//! let summary = run(images, &config, &mut sink).unwrap();
//! println!("{} batches, {} degraded", summary.batches, summary.degraded);
//! ```
//!
//! Meshes can also be used on their own:
//!
//! ```rust
//! use voronoi_mosaic::*;
//! use image::RgbImage;
//!
//! let image = RgbImage::new(120, 80);
//! let cache = MeshCache::for_image(&image, 1);
//! let mesh = cache.get(&MeshKey::Fibonacci { step: 10 }).unwrap();
//! assert!(mesh.len() >= 4);
//! ```
//!
//! # Features
//!
//! - `spatial-index` (default): KD-tree nearest-site lookups instead of a linear scan
//! - `serde`: Serialization support for configuration, mesh keys and point sets

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod geometry;
pub mod pipeline;
pub mod spatial;
pub mod stylise;
pub mod tiles;

pub use cache::{MeshCache, MeshKey, OnceMap, SerialStore, DEFAULT_APPROXIMATION_FLOOR};
pub use config::{MosaicConfig, MosaicConfigBuilder, PacingPolicy};
pub use error::{MosaicError, Result};
pub use generation::{
    density_adaptive_mesh, relaxed_mesh, uniform_random_mesh, LloydOptions, MeshGenerator,
    SeededMeshGenerator,
};
pub use geometry::{add_edge_points, map_range, normalize_points, random_points_2d, PointSet};
pub use pipeline::{
    load_images, run, show_in_groups, CompositeWriter, Display, LogDisplay, RunSummary,
    SourceImage, WorkBatch,
};
pub use spatial::SpatialIndex;
pub use stylise::{map_gradient, BlendTextures, ColorMap};
pub use tiles::{Outline, PentagonMesh, RenderOptions, RenderedTile, TileVariant};

// Re-export glam vectors for convenience
pub use glam::{IVec2, Vec2};
