//! Configuration for the viewport, the post-processing chain and the stage
//! driver. Component configs live next to their components; all of them
//! follow the same pattern of a plain struct with a documented `Default`.

use crate::data_structures::{color::Color, scene_graph::Fog};

/// Operator used to map linear HDR radiance into displayable range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToneMapping {
    /// Clamp only.
    Linear,
    Reinhard,
    #[default]
    AcesFilmic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomConfig {
    pub strength: f32,
    /// Blur radius as a fraction of a fixed kernel; 0 gives the tightest glow.
    pub radius: f32,
    /// Luminance above which pixels start to bloom.
    pub threshold: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            strength: 0.5,
            radius: 0.4,
            threshold: 0.85,
        }
    }
}

/// Base render, then optional bloom, then the tone-mapped output pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostProcessConfig {
    pub bloom: Option<BloomConfig>,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            bloom: Some(BloomConfig::default()),
            tone_mapping: ToneMapping::AcesFilmic,
            exposure: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportConfig {
    pub background: Color,
    pub fog: Option<Fog>,
    /// Vertical calibration added to projected screen positions, in pixels.
    pub screen_offset_y: f32,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    /// Size used for projection until the first draw reports the real one.
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            background: Color::BLACK,
            fog: None,
            screen_offset_y: 475.0,
            tone_mapping: ToneMapping::AcesFilmic,
            exposure: 1.0,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageConfig {
    /// Canvas size used by [`crate::flow::Stage::headless`].
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Hard stop for `play` in case a script never finishes.
    pub max_frames: u64,
    pub viewport: ViewportConfig,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60.0,
            max_frames: 3600,
            viewport: ViewportConfig::default(),
        }
    }
}
