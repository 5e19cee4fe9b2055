//! Meshes: a spatial node with optional drawable content.
//!
//! The mesh core is a plain group. Once both a geometry and a material are
//! known, a mesh object is built beneath it and the opacity channel starts
//! writing into that object's material. A mesh without content still animates
//! its transform, it just issues no draw call.

use std::{cell::RefCell, rc::Rc};

use cgmath::Vector3;

use crate::{
    anim::{
        ease::Ease,
        tween::tween_property,
    },
    data_structures::{
        geometry::Geometry,
        material::{Material, MaterialKind},
        scene_graph::Object3d,
    },
    nodes::spatial::{Node3d, SpatialNode, Transform},
    reactive::{Channel, Property},
};

#[derive(Clone, Debug)]
pub struct MeshConfig {
    pub transform: Transform,
    pub geometry: Option<Rc<Geometry>>,
    pub material: Option<Material>,
    /// Initial opacity.
    pub alpha: f32,
    /// Turn a standard material into a polished metal that mirrors the scene
    /// environment.
    pub reflective: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            geometry: None,
            material: None,
            alpha: 1.0,
            reflective: false,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

#[derive(Clone)]
pub struct Mesh {
    spatial: SpatialNode,
    content: Rc<RefCell<Option<Object3d>>>,
    opacity: Property<f32>,
    reflective: bool,
    cast_shadow: bool,
    receive_shadow: bool,
}

impl Mesh {
    pub fn new(config: MeshConfig) -> Self {
        let spatial = SpatialNode::new(Object3d::group().named("mesh"), config.transform);
        let content: Rc<RefCell<Option<Object3d>>> = Rc::default();
        let opacity = {
            let content = content.clone();
            Property::new(Channel::Opacity, config.alpha, move |v| {
                if let Some(object) = content.borrow().as_ref() {
                    object.with_material_mut(|m| m.set_opacity(v));
                }
            })
        };
        let mesh = Self {
            spatial,
            content,
            opacity,
            reflective: config.reflective,
            cast_shadow: config.cast_shadow,
            receive_shadow: config.receive_shadow,
        };
        mesh.set_content(config.geometry, config.material);
        mesh
    }

    /// Shorthand for a mesh with content at `transform`.
    pub fn with_content(geometry: Rc<Geometry>, material: Material, transform: Transform) -> Self {
        Self::new(MeshConfig {
            transform,
            geometry: Some(geometry),
            material: Some(material),
            ..Default::default()
        })
    }

    /// Build the drawable object. Does nothing unless both parts are given.
    /// Replaces any earlier content.
    pub fn set_content(&self, geometry: Option<Rc<Geometry>>, material: Option<Material>) -> bool {
        let (Some(geometry), Some(mut material)) = (geometry, material) else {
            return false;
        };
        if self.reflective {
            if let MaterialKind::Standard {
                metalness,
                roughness,
            } = &mut material.kind
            {
                *metalness = 1.0;
                *roughness = 0.0;
            }
        }
        let object = Object3d::mesh(geometry, material);
        {
            let mut data = object.data_mut();
            data.cast_shadow = self.cast_shadow;
            data.receive_shadow = self.receive_shadow;
        }
        let core = self.spatial.core();
        if let Some(old) = self.content.replace(Some(object.clone())) {
            core.remove(&old);
        }
        core.add(&object);
        self.opacity.sync();
        true
    }

    /// The drawable object, if content was supplied.
    pub fn content(&self) -> Option<Object3d> {
        self.content.borrow().clone()
    }

    pub fn material(&self) -> Option<Material> {
        self.content().and_then(|object| object.material())
    }

    pub fn with_material_mut<R>(&self, f: impl FnOnce(&mut Material) -> R) -> Option<R> {
        self.content().and_then(|object| {
            object.with_material_mut(|m| {
                let result = f(m);
                m.touch();
                result
            })
        })
    }

    pub fn opacity(&self) -> &Property<f32> {
        &self.opacity
    }

    pub async fn opacity_to(&self, value: f32, duration: f32, ease: Ease) {
        tween_property(&self.opacity, value, duration, ease).await
    }

    /// Same as [`Mesh::opacity_to`].
    pub async fn fade_to(&self, value: f32, duration: f32, ease: Ease) {
        self.opacity_to(value, duration, ease).await
    }

    pub async fn fade_in(&self, duration: f32, ease: Ease) {
        self.opacity_to(1.0, duration, ease).await
    }

    pub async fn fade_out(&self, duration: f32, ease: Ease) {
        self.opacity_to(0.0, duration, ease).await
    }

    /// Jump to a position without animating.
    pub fn place(&self, position: Vector3<f32>) {
        self.spatial.position().set(position);
    }
}

impl Node3d for Mesh {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }
}

impl std::ops::Deref for Mesh {
    type Target = SpatialNode;

    fn deref(&self) -> &SpatialNode {
        &self.spatial
    }
}

/// A unit cube that casts and receives shadows.
#[derive(Clone)]
pub struct Cuboid(Mesh);

impl Cuboid {
    pub fn new(material: Material, transform: Transform) -> Self {
        Self(Mesh::new(MeshConfig {
            transform,
            geometry: Some(Rc::new(Geometry::cuboid(1.0, 1.0, 1.0))),
            material: Some(material),
            cast_shadow: true,
            receive_shadow: true,
            ..Default::default()
        }))
    }
}

impl std::ops::Deref for Cuboid {
    type Target = Mesh;

    fn deref(&self) -> &Mesh {
        &self.0
    }
}

impl Node3d for Cuboid {
    fn spatial(&self) -> &SpatialNode {
        self.0.spatial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::color::Color;

    #[test]
    fn missing_content_builds_nothing() {
        let mesh = Mesh::new(MeshConfig {
            geometry: Some(Rc::new(Geometry::cuboid(1.0, 1.0, 1.0))),
            ..Default::default()
        });
        assert!(mesh.content().is_none());
        assert_eq!(mesh.spatial().core().child_count(), 0);
    }

    #[test]
    fn opacity_reaches_the_material() {
        let mesh = Mesh::with_content(
            Rc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
            Material::standard(Color::WHITE),
            Transform::default(),
        );
        mesh.opacity().set(0.25);
        let material = mesh.material().expect("mesh has content");
        assert_eq!(material.opacity, 0.25);
        assert!(material.is_transparent());
    }

    #[test]
    fn cuboids_cast_and_receive_shadows() {
        let cuboid = Cuboid::new(Material::standard(Color::WHITE), Transform::default());
        let content = cuboid.content().expect("cuboid has content");
        assert!(content.data().cast_shadow);
        assert!(content.data().receive_shadow);
    }
}
