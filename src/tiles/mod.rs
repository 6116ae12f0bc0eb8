//! Tile renderers
//!
//! Each [`TileVariant`] partitions an image into regions and fills them with
//! a representative color. Mesh-based variants take their sample points from
//! the per-image [`crate::MeshCache`]; when no mesh is supplied they generate
//! one themselves.
//!
//! [`RenderOptions`] carries the settings shared by every variant of a run:
//! how mesh edges are drawn and which textures circles are blended with.

mod circles;
pub mod fill;
mod pentagons;
mod squares;
mod triangles;

pub use circles::render_circles;
pub use pentagons::render_pentagons;
pub use squares::render_squares;
pub use triangles::render_triangles;

use image::{Rgb, RgbImage};
use rand::Rng;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cache::MeshKey;
use crate::error::Result;
use crate::generation::{density_adaptive_mesh, relaxed_mesh, uniform_random_mesh, LloydOptions};
use crate::geometry::{intensity, PointSet};
use crate::stylise::BlendTextures;

/// A rendered image together with a description of how it was made
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub label: String,
    pub image: RgbImage,
}

impl RenderedTile {
    pub fn new(label: impl Into<String>, image: RgbImage) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// How triangle and pentagon tiles draw region edges
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outline {
    /// Edge color; `None` darkens each region's fill, or uses black when `only` is set
    pub color: Option<[u8; 3]>,
    /// Skip the fill and draw just the mesh edges over the source
    pub only: bool,
}

impl Outline {
    /// Mesh edges only, in `color` or black
    pub fn wireframe(color: Option<[u8; 3]>) -> Self {
        Self { color, only: true }
    }

    /// Edge color for a region filled with `fill`
    pub(crate) fn edge_color(&self, fill: Rgb<u8>, darken_by: u8) -> Rgb<u8> {
        match self.color {
            Some(color) => Rgb(color),
            None if self.only => Rgb([0, 0, 0]),
            None => fill::darken(fill, darken_by),
        }
    }

    pub(crate) fn label_suffix(&self) -> &'static str {
        if self.only {
            " Outline-Only"
        } else {
            ""
        }
    }
}

/// Run-wide rendering settings
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    pub outline: Outline,
    /// Textures blended into circle tiles
    pub textures: Option<&'a BlendTextures>,
}

/// Point source for the pentagon (Voronoi) renderer
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PentagonMesh {
    Random,
    Fibonacci(u32),
    Lloyd(u32),
}

/// One way of turning an image into a mosaic
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileVariant {
    /// Square blocks, `size_percent`% of the longer side; `None` uses the default
    Squares { size_percent: Option<u32> },
    /// Delaunay triangles over a fibonacci mesh, or a random one when `fib_step` is unset
    Triangles { fib_step: Option<u32> },
    /// Halftone discs; `None` uses the default spacing
    Circles { spacing_percent: Option<f32> },
    /// Voronoi regions
    Pentagons { mesh: PentagonMesh },
}

impl TileVariant {
    /// Cache key of the mesh this variant needs, if it uses a cacheable one
    ///
    /// Random meshes are drawn per task and never cached.
    pub fn mesh_key(&self, lloyd_iterations: usize) -> Option<MeshKey> {
        match *self {
            TileVariant::Triangles { fib_step: Some(step) }
            | TileVariant::Pentagons {
                mesh: PentagonMesh::Fibonacci(step),
            } => Some(MeshKey::Fibonacci { step }),
            TileVariant::Pentagons {
                mesh: PentagonMesh::Lloyd(cell_density),
            } => Some(MeshKey::Lloyd {
                cell_density,
                iterations: lloyd_iterations,
            }),
            _ => None,
        }
    }

    /// Render the variant over `image` with default options
    ///
    /// `mesh` is used as-is when given. Otherwise mesh-based variants build
    /// their own points from `rng`.
    pub fn render<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        mesh: Option<&PointSet>,
        rng: &mut R,
    ) -> Result<RenderedTile> {
        self.render_with(image, mesh, &RenderOptions::default(), rng)
    }

    /// Render the variant over `image`
    pub fn render_with<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        mesh: Option<&PointSet>,
        options: &RenderOptions<'_>,
        rng: &mut R,
    ) -> Result<RenderedTile> {
        match *self {
            TileVariant::Squares { size_percent } => Ok(render_squares(image, size_percent)),
            TileVariant::Circles { spacing_percent } => {
                let mut tile = render_circles(image, spacing_percent)?;
                if let Some(textures) = options.textures {
                    let (blend, image) = textures.blend(&tile.image, rng);
                    if !blend.is_empty() {
                        tile.label = format!("{} Blend: {}", tile.label, blend);
                    }
                    tile.image = image;
                }
                Ok(tile)
            }
            TileVariant::Triangles { fib_step } => {
                let points = self.resolve_mesh(image, mesh, rng)?;
                Ok(render_triangles(image, &points, fib_step, options.outline))
            }
            TileVariant::Pentagons { mesh: source } => {
                let points = self.resolve_mesh(image, mesh, rng)?;
                render_pentagons(image, &points, source, options.outline)
            }
        }
    }

    fn resolve_mesh<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        mesh: Option<&PointSet>,
        rng: &mut R,
    ) -> Result<PointSet> {
        if let Some(points) = mesh {
            return Ok(points.clone());
        }

        let (width, height) = image.dimensions();
        match self.mesh_key(LloydOptions::default().max_iterations) {
            Some(MeshKey::Fibonacci { step }) => {
                density_adaptive_mesh(&intensity(image), rng, step)
            }
            Some(MeshKey::Lloyd {
                cell_density,
                iterations,
            }) => relaxed_mesh(width, height, rng, cell_density, iterations),
            None => Ok(uniform_random_mesh(width, height, rng, true)),
        }
    }
}

impl fmt::Display for TileVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileVariant::Squares { size_percent: Some(s) } => write!(f, "squares({}%)", s),
            TileVariant::Squares { size_percent: None } => write!(f, "squares"),
            TileVariant::Triangles { fib_step: Some(s) } => write!(f, "triangles(step={})", s),
            TileVariant::Triangles { fib_step: None } => write!(f, "triangles(random)"),
            TileVariant::Circles {
                spacing_percent: Some(s),
            } => write!(f, "circles({}%)", s),
            TileVariant::Circles {
                spacing_percent: None,
            } => write!(f, "circles"),
            TileVariant::Pentagons { mesh } => match mesh {
                PentagonMesh::Random => write!(f, "pentagons(random)"),
                PentagonMesh::Fibonacci(s) => write!(f, "pentagons(step={})", s),
                PentagonMesh::Lloyd(c) => write!(f, "pentagons(cells={})", c),
            },
        }
    }
}
