//! Glossy studio floor.
//!
//! Two stacked planes: a dark metallic tint that takes the shadows, and just
//! above it a faint mirror that picks up the scene environment.

use std::rc::Rc;

use cgmath::Vector3;

use crate::{
    data_structures::{
        color::Color,
        geometry::Geometry,
        material::{Material, MaterialKind},
    },
    nodes::{
        mesh::{Mesh, MeshConfig},
        spatial::{Node3d, SpatialNode, Transform},
    },
};

/// Height of the mirror above the tint plane.
const MIRROR_LIFT: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloorConfig {
    pub transform: Transform,
    /// Edge length of both planes.
    pub size: f32,
    pub mirror_opacity: f32,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            transform: Transform::at(Vector3::new(0.0, -0.4, 0.0)),
            size: 30.0,
            mirror_opacity: 0.3,
        }
    }
}

#[derive(Clone)]
pub struct Floor {
    spatial: SpatialNode,
    tint: Mesh,
    mirror: Mesh,
}

impl Floor {
    pub fn new(config: FloorConfig) -> Self {
        let spatial = SpatialNode::group(config.transform);
        let plane = Rc::new(Geometry::plane(config.size, config.size));

        let mut tint_material = Material::new(
            MaterialKind::Standard {
                metalness: 1.0,
                roughness: 0.6,
            },
            Color::BLACK,
        );
        tint_material.env_map_intensity = 0.1;
        let tint = Mesh::new(MeshConfig {
            geometry: Some(plane.clone()),
            material: Some(tint_material),
            receive_shadow: true,
            ..Default::default()
        });

        let mirror = Mesh::new(MeshConfig {
            transform: Transform::at(Vector3::new(0.0, MIRROR_LIFT, 0.0)),
            geometry: Some(plane),
            material: Some(Material::standard(Color::WHITE)),
            alpha: config.mirror_opacity,
            reflective: true,
            receive_shadow: true,
            ..Default::default()
        });
        if let Some(content) = mirror.content() {
            content.data_mut().render_order = 1;
        }

        spatial.add(&tint);
        spatial.add(&mirror);
        Self {
            spatial,
            tint,
            mirror,
        }
    }

    pub fn tint(&self) -> &Mesh {
        &self.tint
    }

    pub fn mirror(&self) -> &Mesh {
        &self.mirror
    }
}

impl Default for Floor {
    fn default() -> Self {
        Self::new(FloorConfig::default())
    }
}

impl Node3d for Floor {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }
}
