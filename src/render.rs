//! Renderer seam and draw-list composition.
//!
//! The viewport never talks to a graphics API directly. It drives a
//! [`Renderer`] through a swappable [`RenderCallback`] and reads the result
//! back as a [`Frame`]. Renderers that want a flat description of the scene
//! call [`collect_draws`], which walks the graph once and batches everything
//! by pipeline:
//!
//! - `opaque` triangles, in graph order
//! - `transparent` triangles, sorted by render order then back to front
//! - `lines` for line strips and line lists
//! - `lights` with their world-space placement

use std::rc::Rc;

use cgmath::{InnerSpace, Matrix4, Vector3};
use image::{Rgba, Rgba32FImage, RgbaImage};

use crate::{
    config::ToneMapping,
    data_structures::{
        color::{Color, linear_to_srgb},
        geometry::{Geometry, Topology},
        material::Material,
        scene_graph::{LightKind, Object3d, ObjectKind, Scene3d},
    },
    postprocess::tone_map,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Scene-referred linear radiance.
    Linear,
    /// Tone mapped and sRGB encoded, ready to show.
    Display,
}

/// The renderer's output image.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: Rgba32FImage,
    pub encoding: Encoding,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: Rgba32FImage::new(width.max(1), height.max(1)),
            encoding: Encoding::Linear,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width(), self.height()) {
            self.pixels = Rgba32FImage::new(width.max(1), height.max(1));
        }
    }

    pub fn clear(&mut self, color: Color, alpha: f32) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([color.r, color.g, color.b, alpha]);
        }
        self.encoding = Encoding::Linear;
    }

    /// 8-bit display image. Linear frames are tone mapped and sRGB encoded on
    /// the way out; display frames are only quantised.
    pub fn to_rgba8(&self, tone_mapping: ToneMapping, exposure: f32) -> RgbaImage {
        let quantise = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut out = RgbaImage::new(self.width(), self.height());
        for (dst, src) in out.pixels_mut().zip(self.pixels.pixels()) {
            let [r, g, b, a] = src.0;
            let rgb = match self.encoding {
                Encoding::Display => [r, g, b],
                Encoding::Linear => {
                    tone_map([r, g, b], tone_mapping, exposure).map(linear_to_srgb)
                }
            };
            *dst = Rgba([quantise(rgb[0]), quantise(rgb[1]), quantise(rgb[2]), quantise(a)]);
        }
        out
    }
}

/// Something that can draw a scene through a camera into a [`Frame`].
pub trait Renderer {
    fn set_size(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    fn render(&mut self, scene: &Scene3d, camera: &Object3d) -> anyhow::Result<()>;

    fn frame(&self) -> &Frame;

    fn frame_mut(&mut self) -> &mut Frame;
}

/// What a viewport runs each frame to fill the renderer's frame.
pub type RenderCallback = Rc<dyn Fn(&mut dyn Renderer, &Scene3d, &Object3d) -> anyhow::Result<()>>;

/// Plain `renderer.render(scene, camera)`.
pub fn default_render_callback() -> RenderCallback {
    Rc::new(|renderer, scene, camera| renderer.render(scene, camera))
}

/// One draw call: a geometry drawn once per instance matrix.
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub object_id: u64,
    pub geometry: Rc<Geometry>,
    pub material: Material,
    /// World matrices, one per instance.
    pub instances: Vec<Matrix4<f32>>,
    pub instance_colors: Option<Vec<Color>>,
    pub render_order: i32,
    /// Distance from the camera, used for transparent sorting.
    pub depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightItem {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    pub position: Vector3<f32>,
    /// Unit vector from the light towards what it shines at.
    pub direction: Vector3<f32>,
    pub cast_shadow: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DrawList {
    pub opaque: Vec<DrawItem>,
    pub transparent: Vec<DrawItem>,
    pub lines: Vec<DrawItem>,
    pub lights: Vec<LightItem>,
}

impl DrawList {
    pub fn draw_count(&self) -> usize {
        self.opaque.len() + self.transparent.len() + self.lines.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &DrawItem> {
        self.opaque
            .iter()
            .chain(self.transparent.iter())
            .chain(self.lines.iter())
    }
}

/// Flatten the visible part of `scene` into draw calls and lights.
pub fn collect_draws(scene: &Scene3d, camera: &Object3d) -> DrawList {
    let mut list = DrawList::default();
    let eye = camera.world_position();
    visit(scene.root(), Matrix4::from_scale(1.0), eye, &mut list);
    list.transparent.sort_by(|a, b| {
        a.render_order
            .cmp(&b.render_order)
            .then(b.depth.total_cmp(&a.depth))
    });
    list
}

fn visit(object: &Object3d, parent: Matrix4<f32>, eye: Vector3<f32>, list: &mut DrawList) {
    let world = parent * object.local_matrix();
    {
        let data = object.data();
        if !data.visible {
            return;
        }
        let position = world.w.truncate();
        let depth = (position - eye).magnitude();
        match &data.kind {
            ObjectKind::Group | ObjectKind::Camera(_) => {}
            ObjectKind::Mesh(mesh) => {
                let item = DrawItem {
                    object_id: data.id(),
                    geometry: mesh.geometry.clone(),
                    material: mesh.material.clone(),
                    instances: vec![world],
                    instance_colors: None,
                    render_order: data.render_order,
                    depth,
                };
                push(list, item);
            }
            ObjectKind::Instanced(instanced) => {
                if instanced.count() == 0 {
                    log::debug!("Skipping instanced mesh {} with zero instances.", data.name);
                } else {
                    let item = DrawItem {
                        object_id: data.id(),
                        geometry: instanced.geometry.clone(),
                        material: instanced.material.clone(),
                        instances: instanced.matrices.iter().map(|m| world * m).collect(),
                        instance_colors: Some(instanced.colors.clone()),
                        render_order: data.render_order,
                        depth,
                    };
                    push(list, item);
                }
            }
            ObjectKind::Light(light) => {
                let target = light
                    .target
                    .as_ref()
                    .map(Object3d::world_position)
                    .unwrap_or(Vector3::new(0.0, 0.0, 0.0));
                let to_target = target - position;
                let direction = if to_target.magnitude2() > 0.0 {
                    to_target.normalize()
                } else {
                    -Vector3::unit_y()
                };
                list.lights.push(LightItem {
                    kind: light.kind,
                    color: light.color,
                    intensity: light.intensity,
                    position,
                    direction,
                    cast_shadow: light.shadow.is_some(),
                });
            }
        }
    }
    for child in object.children() {
        visit(&child, world, eye, list);
    }
}

fn push(list: &mut DrawList, item: DrawItem) {
    match item.geometry.topology {
        Topology::Lines | Topology::LineStrip => list.lines.push(item),
        Topology::Triangles if item.material.is_transparent() => list.transparent.push(item),
        Topology::Triangles => list.opaque.push(item),
    }
}
