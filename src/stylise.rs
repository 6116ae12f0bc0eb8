//! Color-gradient remapping
//!
//! Each [`ColorMap`] is a 256-entry lookup table built from piecewise-linear
//! control points. Remapping replaces every pixel by the table entry at its
//! luminance.
//!
//! [`BlendTextures`] overlays a texture from a folder with a bitwise blend.

use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::pipeline::source::{image_paths, load_image};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Named color gradients
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMap {
    Autumn,
    Bone,
    Jet,
    Winter,
    Rainbow,
    Ocean,
    Summer,
    Spring,
    Cool,
    Hsv,
    Pink,
    Hot,
}

type ControlPoint = (f32, [u8; 3]);

impl ColorMap {
    pub const ALL: [ColorMap; 12] = [
        ColorMap::Autumn,
        ColorMap::Bone,
        ColorMap::Jet,
        ColorMap::Winter,
        ColorMap::Rainbow,
        ColorMap::Ocean,
        ColorMap::Summer,
        ColorMap::Spring,
        ColorMap::Cool,
        ColorMap::Hsv,
        ColorMap::Pink,
        ColorMap::Hot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColorMap::Autumn => "AUTUMN",
            ColorMap::Bone => "BONE",
            ColorMap::Jet => "JET",
            ColorMap::Winter => "WINTER",
            ColorMap::Rainbow => "RAINBOW",
            ColorMap::Ocean => "OCEAN",
            ColorMap::Summer => "SUMMER",
            ColorMap::Spring => "SPRING",
            ColorMap::Cool => "COOL",
            ColorMap::Hsv => "HSV",
            ColorMap::Pink => "PINK",
            ColorMap::Hot => "HOT",
        }
    }

    /// Control points sorted by position in `[0, 1]`
    fn control_points(&self) -> &'static [ControlPoint] {
        match self {
            ColorMap::Autumn => &[(0.0, [255, 0, 0]), (1.0, [255, 255, 0])],
            ColorMap::Bone => &[
                (0.0, [0, 0, 0]),
                (0.375, [81, 81, 113]),
                (0.75, [166, 198, 198]),
                (1.0, [255, 255, 255]),
            ],
            ColorMap::Jet => &[
                (0.0, [0, 0, 128]),
                (0.125, [0, 0, 255]),
                (0.375, [0, 255, 255]),
                (0.625, [255, 255, 0]),
                (0.875, [255, 0, 0]),
                (1.0, [128, 0, 0]),
            ],
            ColorMap::Winter => &[(0.0, [0, 0, 255]), (1.0, [0, 255, 128])],
            ColorMap::Rainbow => &[
                (0.0, [255, 0, 0]),
                (0.2, [255, 255, 0]),
                (0.4, [0, 255, 0]),
                (0.6, [0, 255, 255]),
                (0.8, [0, 0, 255]),
                (1.0, [128, 0, 255]),
            ],
            ColorMap::Ocean => &[
                (0.0, [0, 128, 0]),
                (0.333, [0, 0, 85]),
                (0.667, [0, 128, 170]),
                (1.0, [255, 255, 255]),
            ],
            ColorMap::Summer => &[(0.0, [0, 128, 102]), (1.0, [255, 255, 102])],
            ColorMap::Spring => &[(0.0, [255, 0, 255]), (1.0, [255, 255, 0])],
            ColorMap::Cool => &[(0.0, [0, 255, 255]), (1.0, [255, 0, 255])],
            ColorMap::Hsv => &[
                (0.0, [255, 0, 0]),
                (1.0 / 6.0, [255, 255, 0]),
                (2.0 / 6.0, [0, 255, 0]),
                (3.0 / 6.0, [0, 255, 255]),
                (4.0 / 6.0, [0, 0, 255]),
                (5.0 / 6.0, [255, 0, 255]),
                (1.0, [255, 0, 0]),
            ],
            ColorMap::Pink => &[
                (0.0, [30, 0, 0]),
                (0.375, [195, 128, 128]),
                (0.75, [220, 220, 180]),
                (1.0, [255, 255, 255]),
            ],
            ColorMap::Hot => &[
                (0.0, [0, 0, 0]),
                (0.375, [255, 0, 0]),
                (0.75, [255, 255, 0]),
                (1.0, [255, 255, 255]),
            ],
        }
    }

    /// The 256-entry lookup table
    pub fn lut(&self) -> [Rgb<u8>; 256] {
        let points = self.control_points();
        let mut lut = [Rgb([0, 0, 0]); 256];
        for (level, entry) in lut.iter_mut().enumerate() {
            let t = level as f32 / 255.0;
            let upper = points
                .iter()
                .position(|&(pos, _)| pos >= t)
                .unwrap_or(points.len() - 1)
                .max(1);
            let (p0, c0) = points[upper - 1];
            let (p1, c1) = points[upper];
            let f = if p1 > p0 { ((t - p0) / (p1 - p0)).clamp(0.0, 1.0) } else { 0.0 };
            *entry = Rgb(std::array::from_fn(|c| {
                (c0[c] as f32 + (c1[c] as f32 - c0[c] as f32) * f).round() as u8
            }));
        }
        lut
    }

    /// Remap an image through this gradient by luminance
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let lut = self.lut();
        let gray = image::imageops::grayscale(image);
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            lut[gray.get_pixel(x, y).0[0] as usize]
        })
    }
}

impl fmt::Display for ColorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remap `image` through a uniformly chosen gradient
///
/// Returns the gradient's name alongside the remapped image.
pub fn map_gradient<R: Rng + ?Sized>(image: &RgbImage, rng: &mut R) -> (&'static str, RgbImage) {
    let map = ColorMap::ALL.choose(rng).copied().unwrap_or(ColorMap::Jet);
    (map.name(), map.apply(image))
}

/// Bitwise operator combining an image with a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    And,
    Or,
    Xor,
}

impl BlendOp {
    pub const ALL: [BlendOp; 3] = [BlendOp::And, BlendOp::Or, BlendOp::Xor];

    pub fn name(&self) -> &'static str {
        match self {
            BlendOp::And => "AND",
            BlendOp::Or => "OR",
            BlendOp::Xor => "XOR",
        }
    }

    fn apply(&self, a: u8, b: u8) -> u8 {
        match self {
            BlendOp::And => a & b,
            BlendOp::Or => a | b,
            BlendOp::Xor => a ^ b,
        }
    }
}

/// Label used when the draw picks no blend at all
pub const NO_FILTER: &str = "NO FILTER";

/// Textures available for [`BlendTextures::blend`]
#[derive(Debug, Clone, Default)]
pub struct BlendTextures {
    textures: Vec<(String, RgbImage)>,
}

impl BlendTextures {
    pub fn new(textures: Vec<(String, RgbImage)>) -> Self {
        Self { textures }
    }

    /// Load every decodable image in `dir`
    ///
    /// A missing or unreadable folder yields an empty set, so blending turns
    /// into a no-op.
    pub fn load(dir: &Path) -> Result<Self> {
        let paths = match image_paths(dir) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("No blend textures: {}", e);
                return Ok(Self::default());
            }
        };
        let mut textures = Vec::with_capacity(paths.len());
        for path in &paths {
            match load_image(path) {
                Ok(source) => textures.push((source.name, source.image)),
                Err(e) => log::warn!("Skipping texture {}: {}", path.display(), e),
            }
        }
        log::info!("Loaded {} blend textures from {}", textures.len(), dir.display());
        Ok(Self { textures })
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Blend `image` with a random texture large enough to cover it
    ///
    /// The operator is drawn uniformly from the three blends plus "no blend".
    /// Returns `"OP:texture"`, [`NO_FILTER`], or an empty label when there are
    /// no textures or none is large enough; the image is unchanged in the
    /// last three cases.
    pub fn blend<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> (String, RgbImage) {
        if self.textures.is_empty() {
            return (String::new(), image.clone());
        }
        let Some(op) = rng.gen_range(0..=BlendOp::ALL.len()).checked_sub(1) else {
            return (NO_FILTER.to_string(), image.clone());
        };
        let op = BlendOp::ALL[op];

        let (width, height) = image.dimensions();
        let mut order: Vec<usize> = (0..self.textures.len()).collect();
        order.shuffle(rng);
        let fitting = order.into_iter().map(|i| &self.textures[i]).find(|(_, texture)| {
            texture.width() >= width && texture.height() >= height
        });
        let Some((name, texture)) = fitting else {
            return (String::new(), image.clone());
        };

        let out = RgbImage::from_fn(width, height, |x, y| {
            let (a, b) = (image.get_pixel(x, y).0, texture.get_pixel(x, y).0);
            Rgb([op.apply(a[0], b[0]), op.apply(a[1], b[1]), op.apply(a[2], b[2])])
        });
        (format!("{}:{}", op.name(), name), out)
    }
}
