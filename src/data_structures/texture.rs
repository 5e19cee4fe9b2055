//! Environment textures.
//!
//! - [`HdrImage`] is a raw equirectangular radiance image as loaded from disk.
//! - [`EnvironmentTexture`] is the prefiltered result that scenes and materials
//!   share: a chain of progressively blurrier radiance levels, one per
//!   roughness step, plus the average radiance of each level.

use image::{Rgba, Rgba32FImage};

use crate::data_structures::color::Color;

/// Linear RGBA f32 equirectangular image.
#[derive(Clone, Debug)]
pub struct HdrImage {
    pub pixels: Rgba32FImage,
}

impl HdrImage {
    pub fn new(pixels: Rgba32FImage) -> Self {
        Self { pixels }
    }

    /// Uniformly coloured image, mostly useful for procedural skies and tests.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let pixel = Rgba([color.r, color.g, color.b, 1.0]);
        Self::new(Rgba32FImage::from_pixel(width.max(1), height.max(1), pixel))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// A generated environment, ready to be shared between scenes.
///
/// Level 0 is the full resolution radiance map, the last level approximates the
/// diffuse irradiance. Textures are only ever shared through `Rc`, so two scenes
/// that received the same texture can be compared with `Rc::ptr_eq`.
#[derive(Debug)]
pub struct EnvironmentTexture {
    pub source: String,
    pub levels: Vec<Rgba32FImage>,
    pub level_means: Vec<Color>,
}

impl EnvironmentTexture {
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Average radiance for a surface of the given roughness in [0, 1].
    pub fn radiance(&self, roughness: f32) -> Color {
        if self.level_means.is_empty() {
            return Color::BLACK;
        }
        let last = self.level_means.len() - 1;
        let idx = (roughness.clamp(0.0, 1.0) * last as f32).round() as usize;
        self.level_means[idx.min(last)]
    }

    pub fn irradiance(&self) -> Color {
        self.radiance(1.0)
    }
}
