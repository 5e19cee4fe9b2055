//! Post-processing on rendered frames.
//!
//! A [`Composer`] is a fixed, linear chain of [`Pass`]es run over the
//! renderer's frame after the base render: an optional [`BloomPass`] and then
//! the [`OutputPass`], which tone maps and sRGB encodes so the viewport can
//! copy the result straight to the canvas.

use cgmath::{Matrix3, Vector3};
use image::{Rgba, Rgba32FImage, imageops};

use crate::{
    config::{BloomConfig, PostProcessConfig, ToneMapping},
    data_structures::color::linear_to_srgb,
    render::{Encoding, Frame},
};

pub trait Pass {
    fn name(&self) -> &'static str;

    fn apply(&mut self, frame: &mut Frame) -> anyhow::Result<()>;
}

/// Map linear radiance into [0, 1].
pub fn tone_map(rgb: [f32; 3], mode: ToneMapping, exposure: f32) -> [f32; 3] {
    let c = Vector3::from(rgb) * exposure;
    let mapped = match mode {
        ToneMapping::Linear => c,
        ToneMapping::Reinhard => c.map(|v| v / (1.0 + v)),
        ToneMapping::AcesFilmic => aces_filmic(c),
    };
    mapped.map(|v| v.clamp(0.0, 1.0)).into()
}

/// Fitted ACES curve (RRT + ODT) with sRGB primaries in and out.
fn aces_filmic(c: Vector3<f32>) -> Vector3<f32> {
    // column-major
    let input = Matrix3::new(
        0.59719, 0.07600, 0.02840, 0.35458, 0.90834, 0.13383, 0.04823, 0.01566, 0.83777,
    );
    let output = Matrix3::new(
        1.60475, -0.10208, -0.00327, -0.53108, 1.10813, -0.07276, -0.07367, -0.00605, 1.07602,
    );
    let fit = |v: f32| (v * (v + 0.0245786) - 0.000090537) / (v * (0.983729 * v + 0.4329510) + 0.238081);
    let v = input * (c / 0.6);
    output * v.map(fit)
}

const BLOOM_LEVELS: [(f32, f32); 3] = [(1.0, 1.0), (0.8, 2.0), (0.6, 3.0)];

/// Glow around bright areas.
///
/// Pixels above the luminance threshold are blurred at three progressively
/// coarser resolutions. `radius` shifts weight from the tight levels to the
/// wide ones.
pub struct BloomPass {
    config: BloomConfig,
}

impl BloomPass {
    pub fn new(config: BloomConfig) -> Self {
        Self { config }
    }

    fn high_pass(&self, frame: &Rgba32FImage) -> Rgba32FImage {
        let threshold = self.config.threshold;
        let mut bright = frame.clone();
        for pixel in bright.pixels_mut() {
            let [r, g, b, _] = pixel.0;
            let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
            let alpha = smoothstep(threshold, threshold + 0.01, luminance);
            *pixel = Rgba([r * alpha, g * alpha, b * alpha, 1.0]);
        }
        bright
    }

    fn level_factor(&self, base: f32) -> f32 {
        let radius = self.config.radius;
        base + (1.2 - 2.0 * base) * radius
    }
}

impl Pass for BloomPass {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn apply(&mut self, frame: &mut Frame) -> anyhow::Result<()> {
        let (width, height) = (frame.width(), frame.height());
        let mut level = self.high_pass(&frame.pixels);
        let mut glow = vec![[0.0f32; 3]; (width * height) as usize];

        for (i, (base, sigma)) in BLOOM_LEVELS.iter().enumerate() {
            let lw = (width >> (i + 1)).max(1);
            let lh = (height >> (i + 1)).max(1);
            level = imageops::resize(&level, lw, lh, imageops::FilterType::Triangle);
            let blurred = imageops::blur(&level, *sigma);
            let up = imageops::resize(&blurred, width, height, imageops::FilterType::Triangle);
            let factor = self.level_factor(*base);
            for (acc, pixel) in glow.iter_mut().zip(up.pixels()) {
                acc[0] += pixel.0[0] * factor;
                acc[1] += pixel.0[1] * factor;
                acc[2] += pixel.0[2] * factor;
            }
        }

        let strength = self.config.strength;
        for (pixel, add) in frame.pixels.pixels_mut().zip(glow) {
            pixel.0[0] += add[0] * strength;
            pixel.0[1] += add[1] * strength;
            pixel.0[2] += add[2] * strength;
        }
        Ok(())
    }
}

/// Tone mapping and sRGB encoding. Leaves the frame display-ready.
pub struct OutputPass {
    tone_mapping: ToneMapping,
    exposure: f32,
}

impl OutputPass {
    pub fn new(tone_mapping: ToneMapping, exposure: f32) -> Self {
        Self {
            tone_mapping,
            exposure,
        }
    }
}

impl Pass for OutputPass {
    fn name(&self) -> &'static str {
        "output"
    }

    fn apply(&mut self, frame: &mut Frame) -> anyhow::Result<()> {
        if frame.encoding == Encoding::Display {
            log::warn!("Output pass ran on a frame that is already display encoded.");
            return Ok(());
        }
        for pixel in frame.pixels.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let [r, g, b] = tone_map([r, g, b], self.tone_mapping, self.exposure).map(linear_to_srgb);
            *pixel = Rgba([r, g, b, a]);
        }
        frame.encoding = Encoding::Display;
        Ok(())
    }
}

/// Ordered pass chain run after the base render.
#[derive(Default)]
pub struct Composer {
    passes: Vec<Box<dyn Pass>>,
}

impl Composer {
    pub fn new(config: &PostProcessConfig) -> Self {
        let mut composer = Self::default();
        if let Some(bloom) = config.bloom {
            composer.add_pass(BloomPass::new(bloom));
        }
        composer.add_pass(OutputPass::new(config.tone_mapping, config.exposure));
        composer
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn process(&mut self, frame: &mut Frame) -> anyhow::Result<()> {
        for pass in self.passes.iter_mut() {
            pass.apply(frame)?;
        }
        Ok(())
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
