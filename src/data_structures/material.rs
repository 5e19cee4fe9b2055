//! Surface descriptions attached to meshes and instanced meshes.

use std::rc::Rc;

use crate::data_structures::{color::Color, texture::EnvironmentTexture};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialKind {
    /// Lit PBR-ish surface; the only kind that reads environment maps.
    Standard { metalness: f32, roughness: f32 },
    /// Unlit, flat colour.
    Basic,
    Line { width: f32, dashed: bool },
}

#[derive(Clone, Debug)]
pub struct Material {
    pub kind: MaterialKind,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub depth_test: bool,
    pub vertex_colors: bool,
    pub env_map: Option<Rc<EnvironmentTexture>>,
    pub env_map_intensity: f32,
    version: u64,
}

impl Material {
    pub fn new(kind: MaterialKind, color: Color) -> Self {
        Self {
            kind,
            color,
            opacity: 1.0,
            transparent: false,
            depth_test: true,
            vertex_colors: false,
            env_map: None,
            env_map_intensity: 1.0,
            version: 0,
        }
    }

    pub fn standard(color: Color) -> Self {
        Self::new(
            MaterialKind::Standard {
                metalness: 0.0,
                roughness: 0.5,
            },
            color,
        )
    }

    pub fn basic(color: Color) -> Self {
        Self::new(MaterialKind::Basic, color)
    }

    pub fn line(color: Color, width: f32, dashed: bool) -> Self {
        Self::new(MaterialKind::Line { width, dashed }, color)
    }

    pub fn supports_env_map(&self) -> bool {
        matches!(self.kind, MaterialKind::Standard { .. })
    }

    /// Mark the material changed so renderers re-upload its uniforms.
    pub fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
        self.transparent = true;
        self.touch();
    }

    pub fn line_width(&self) -> Option<f32> {
        match self.kind {
            MaterialKind::Line { width, .. } => Some(width),
            _ => None,
        }
    }

    pub fn set_line_width(&mut self, new_width: f32) {
        if let MaterialKind::Line { width, .. } = &mut self.kind {
            *width = new_width;
            self.touch();
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent && self.opacity < 1.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::standard(Color::WHITE)
    }
}
