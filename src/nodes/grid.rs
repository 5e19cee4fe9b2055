//! Floor grid.

use std::{ops::Deref, rc::Rc};

use crate::{
    data_structures::{color::Color, geometry::Geometry, material::Material},
    nodes::{
        mesh::{Mesh, MeshConfig},
        spatial::{Node3d, SpatialNode, Transform},
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    pub transform: Transform,
    pub size: f32,
    pub divisions: u32,
    /// Colour of the two centre lines.
    pub color1: Color,
    pub color2: Color,
    pub alpha: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            size: 10.0,
            divisions: 10,
            color1: Color::from_hex(0xffffff),
            color2: Color::from_hex(0x444444),
            alpha: 1.0,
        }
    }
}

/// Square line grid on the XZ plane, lifted a hair above y = 0 so it does not
/// z-fight with a floor at the same height.
#[derive(Clone)]
pub struct Grid(Mesh);

impl Grid {
    pub fn new(config: GridConfig) -> Self {
        let geometry = Geometry::grid(config.size, config.divisions, config.color1, config.color2);
        let mut material = Material::line(Color::WHITE, 1.0, false);
        material.vertex_colors = true;
        let mesh = Mesh::new(MeshConfig {
            transform: config.transform,
            geometry: Some(Rc::new(geometry)),
            material: Some(material),
            alpha: config.alpha,
            ..Default::default()
        });
        if let Some(content) = mesh.content() {
            content.data_mut().position.y += 0.0001;
        }
        Self(mesh)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

impl Deref for Grid {
    type Target = Mesh;

    fn deref(&self) -> &Mesh {
        &self.0
    }
}

impl Node3d for Grid {
    fn spatial(&self) -> &SpatialNode {
        self.0.spatial()
    }
}
