//! Many copies of one model in a single draw call.
//!
//! The template model is loaded once, when the batch is attached. Every index
//! in `0..amount` then gets a base position from the position function, in the
//! batch's local frame:
//!
//! - regular indices become slots of one instanced draw call per template
//!   mesh, filled in ascending index order
//! - special indices become full [`Mesh`] components that can be animated on
//!   their own
//!
//! [`InstancedBatch::move_all`] animates one shared offset. Every tick it
//! rewrites every regular instance matrix as `base + offset` and flags the
//! instance buffers for upload.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use cgmath::{Matrix4, Vector3};

use crate::{
    anim::{
        clock::next_frame,
        ease::Ease,
        tween::{tween, tween_property},
    },
    data_structures::{
        color::Color,
        geometry::Geometry,
        instance::Instance,
        material::Material,
        scene_graph::{InstancedData, Object3d, ObjectKind},
    },
    nodes::{
        mesh::{Mesh, MeshConfig},
        spatial::{Node3d, SpatialNode, Transform},
    },
    reactive::{Channel, Property},
    resources::{AssetLoader, ModelData, default_loader},
    viewport::Viewport,
};

pub type PositionFn = Rc<dyn Fn(usize) -> Vector3<f32>>;

/// Hook run on a copied geometry and material together with an index.
///
/// As `modify` it sees every template mesh with its index in the template,
/// before anything is instanced. As `modify_special` it sees the copy made
/// for each special mesh with the batch index.
pub type ModifyFn = Rc<dyn Fn(&mut Geometry, &mut Material, usize)>;

#[derive(Clone)]
pub struct InstancedBatchConfig {
    pub transform: Transform,
    pub src: String,
    /// Defaults to the thread's [`default_loader`].
    pub loader: Option<Rc<dyn AssetLoader>>,
    pub amount: usize,
    /// Per-instance colour of the regular instances.
    pub color: Color,
    pub fixed_rotation: Vector3<f32>,
    pub fixed_scale: Vector3<f32>,
    pub special_indices: Vec<usize>,
    pub position_fn: PositionFn,
    pub modify: Option<ModifyFn>,
    pub modify_special: Option<ModifyFn>,
}

impl Default for InstancedBatchConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            src: String::new(),
            loader: None,
            amount: 100,
            color: Color::WHITE,
            fixed_rotation: Vector3::new(0.0, 0.0, 0.0),
            fixed_scale: Vector3::new(1.0, 1.0, 1.0),
            special_indices: Vec::new(),
            position_fn: Rc::new(|i| Vector3::new(0.0, 0.0, i as f32)),
            modify: None,
            modify_special: None,
        }
    }
}

/// Layout fixed at construction.
struct Layout {
    src: String,
    loader: Rc<dyn AssetLoader>,
    amount: usize,
    color: Color,
    rotation: Vector3<f32>,
    scale: Vector3<f32>,
    specials: BTreeSet<usize>,
    regular: Vec<usize>,
    base_positions: Vec<Vector3<f32>>,
    position_fn: PositionFn,
    modify: Option<ModifyFn>,
    modify_special: Option<ModifyFn>,
}

impl Layout {
    fn matrix(&self, position: Vector3<f32>) -> Matrix4<f32> {
        Instance::from_euler(position, self.rotation, self.scale).to_matrix()
    }

    fn matrices(&self, offset: Vector3<f32>) -> Vec<Matrix4<f32>> {
        self.base_positions
            .iter()
            .map(|base| self.matrix(*base + offset))
            .collect()
    }
}

#[derive(Default)]
struct Loaded {
    instancers: Vec<Object3d>,
    specials: BTreeMap<usize, Vec<Mesh>>,
    done: bool,
    failed: bool,
}

#[derive(Clone)]
pub struct InstancedBatch {
    spatial: SpatialNode,
    layout: Rc<Layout>,
    loaded: Rc<RefCell<Loaded>>,
    offset: Property<Vector3<f32>>,
}

impl InstancedBatch {
    pub fn new(config: InstancedBatchConfig) -> Self {
        let mut specials = BTreeSet::new();
        for &index in &config.special_indices {
            if index < config.amount {
                specials.insert(index);
            } else {
                log::warn!(
                    "Special index {} is outside of 0..{} and is ignored.",
                    index,
                    config.amount
                );
            }
        }
        let regular: Vec<usize> = (0..config.amount).filter(|i| !specials.contains(i)).collect();
        let base_positions = regular.iter().map(|&i| (config.position_fn)(i)).collect();
        let layout = Rc::new(Layout {
            src: config.src,
            loader: config.loader.unwrap_or_else(default_loader),
            amount: config.amount,
            color: config.color,
            rotation: config.fixed_rotation,
            scale: config.fixed_scale,
            specials,
            regular,
            base_positions,
            position_fn: config.position_fn,
            modify: config.modify,
            modify_special: config.modify_special,
        });

        let loaded: Rc<RefCell<Loaded>> = Rc::default();
        let offset = {
            let (layout, loaded) = (layout.clone(), loaded.clone());
            Property::new(Channel::Offset, Vector3::new(0.0, 0.0, 0.0), move |offset| {
                let matrices = layout.matrices(offset);
                for instancer in &loaded.borrow().instancers {
                    instancer.with_instanced_mut(|data| {
                        data.matrices.clone_from(&matrices);
                        data.mark_dirty();
                    });
                }
            })
        };

        Self {
            spatial: SpatialNode::new(Object3d::group().named("instanced batch"), config.transform),
            layout,
            loaded,
            offset,
        }
    }

    pub fn amount(&self) -> usize {
        self.layout.amount
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.borrow().done
    }

    /// Wait until the template settled. Returns whether it loaded.
    pub async fn until_loaded(&self) -> bool {
        loop {
            {
                let loaded = self.loaded.borrow();
                if loaded.done || loaded.failed {
                    return loaded.done;
                }
            }
            next_frame().await;
        }
    }

    /// Base position of index `i`, before any offset.
    pub fn position_at(&self, i: usize) -> Vector3<f32> {
        (self.layout.position_fn)(i)
    }

    pub fn regular_count(&self) -> usize {
        self.layout.regular.len()
    }

    /// Indices drawn by the instanced call, in slot order.
    pub fn regular_indices(&self) -> &[usize] {
        &self.layout.regular
    }

    pub fn special_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.layout.specials.iter().copied()
    }

    pub fn offset(&self) -> &Property<Vector3<f32>> {
        &self.offset
    }

    /// Current instance matrices of the first instanced draw call. Empty
    /// until loaded.
    pub fn instance_matrices(&self) -> Vec<Matrix4<f32>> {
        self.loaded
            .borrow()
            .instancers
            .first()
            .and_then(|instancer| instancer.with_instanced(|data| data.matrices.clone()))
            .unwrap_or_default()
    }

    /// The instanced draw calls, one per template mesh.
    pub fn instancers(&self) -> Vec<Object3d> {
        self.loaded.borrow().instancers.clone()
    }

    /// The first special mesh built for index `i`.
    pub fn special(&self, i: usize) -> Option<Mesh> {
        self.loaded.borrow().specials.get(&i)?.first().cloned()
    }

    /// Every special mesh built for index `i`, one per template mesh.
    pub fn special_meshes(&self, i: usize) -> Vec<Mesh> {
        self.loaded
            .borrow()
            .specials
            .get(&i)
            .cloned()
            .unwrap_or_default()
    }

    fn build(&self, data: &ModelData) {
        let layout = &self.layout;
        let templates: Vec<(String, Rc<Geometry>, Material)> = data
            .primitives()
            .into_iter()
            .enumerate()
            .map(|(i, primitive)| {
                let mut material = primitive.material.clone();
                let geometry = match &layout.modify {
                    Some(modify) => {
                        let mut geometry = primitive.geometry.duplicate();
                        modify(&mut geometry, &mut material, i);
                        Rc::new(geometry)
                    }
                    None => primitive.geometry.clone(),
                };
                (primitive.name.clone(), geometry, material)
            })
            .collect();
        if templates.is_empty() {
            log::warn!("Template {} has no meshes to instance.", layout.src);
        }

        let matrices = layout.matrices(self.offset.get());
        let group = Object3d::group().named("instances");
        let mut instancers = Vec::with_capacity(templates.len());
        for (name, geometry, material) in &templates {
            let mut instanced = InstancedData::new(geometry.clone(), material.clone(), matrices.len());
            instanced.matrices.clone_from(&matrices);
            instanced.colors = vec![layout.color; matrices.len()];
            instanced.mark_dirty();
            let instancer = Object3d::new(ObjectKind::Instanced(instanced)).named(name.clone());
            {
                let mut d = instancer.data_mut();
                d.cast_shadow = true;
                d.receive_shadow = true;
            }
            group.add(&instancer);
            instancers.push(instancer);
        }
        self.spatial.core().add(&group);

        let mut specials = BTreeMap::new();
        for &index in &layout.specials {
            let meshes: Vec<Mesh> = templates
                .iter()
                .map(|(_, geometry, material)| {
                    let mut material = material.clone();
                    let geometry = match &layout.modify_special {
                        Some(modify) => {
                            let mut geometry = geometry.duplicate();
                            modify(&mut geometry, &mut material, index);
                            Rc::new(geometry)
                        }
                        None => geometry.clone(),
                    };
                    Mesh::new(MeshConfig {
                        transform: Transform {
                            position: (layout.position_fn)(index),
                            rotation: layout.rotation,
                            scale: layout.scale,
                        },
                        geometry: Some(geometry),
                        material: Some(material),
                        cast_shadow: true,
                        receive_shadow: true,
                        ..Default::default()
                    })
                })
                .collect();
            specials.insert(index, meshes);
        }

        {
            let mut loaded = self.loaded.borrow_mut();
            loaded.instancers = instancers;
            loaded.specials = specials.clone();
            loaded.done = true;
        }
        for mesh in specials.values().flatten() {
            self.spatial.add(mesh);
        }
    }

    /// Shift every regular instance by `delta`, on top of earlier moves.
    pub async fn move_all(&self, delta: Vector3<f32>, duration: f32, ease: Ease) {
        let to = self.offset.get() + delta;
        tween_property(&self.offset, to, duration, ease).await
    }

    pub async fn move_all_up(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_all_down(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(-Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_all_left(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(-Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_all_right(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_all_forward(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(-Vector3::unit_z() * amount, duration, ease).await
    }

    pub async fn move_all_back(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_all(Vector3::unit_z() * amount, duration, ease).await
    }

    /// Lower the named special meshes to `base.y - amount` from their base
    /// positions. Indices that are not special are skipped.
    pub async fn move_selected_down(&self, indices: &[usize], amount: f32, duration: f32, ease: Ease) {
        let selected: Vec<(f32, Vec<Mesh>)> = indices
            .iter()
            .filter_map(|&i| {
                let meshes = self.special_meshes(i);
                if meshes.is_empty() {
                    log::warn!("Index {} has no special mesh to move.", i);
                    return None;
                }
                Some(((self.layout.position_fn)(i).y, meshes))
            })
            .collect();
        tween(duration, |t| {
            let drop = amount * ease(t);
            for (base_y, meshes) in &selected {
                for mesh in meshes {
                    let position = mesh.spatial().position();
                    let p = position.get();
                    position.set(Vector3::new(p.x, base_y - drop, p.z));
                }
            }
        })
        .await
    }
}

impl Node3d for InstancedBatch {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }

    fn on_attach(&self, viewport: &Viewport) {
        let load = self.layout.loader.load_model(&self.layout.src);
        let batch = self.clone();
        viewport.spawn(async move {
            match load.await {
                Ok(data) => {
                    batch.build(&data);
                    log::info!(
                        "Instanced {} loaded: {} instances, {} special",
                        batch.layout.src,
                        batch.regular_count(),
                        batch.layout.specials.len()
                    );
                }
                Err(e) => {
                    batch.loaded.borrow_mut().failed = true;
                    log::error!("Could not load instanced template {}: {:#}", batch.layout.src, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_skips_special_indices_in_order() {
        let batch = InstancedBatch::new(InstancedBatchConfig {
            amount: 6,
            special_indices: vec![4, 1, 4, 9],
            ..Default::default()
        });
        assert_eq!(batch.regular_indices(), &[0, 2, 3, 5]);
        assert_eq!(batch.regular_count(), 4);
        assert_eq!(batch.special_indices().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn default_positions_run_along_z() {
        let batch = InstancedBatch::new(InstancedBatchConfig::default());
        assert_eq!(batch.amount(), 100);
        assert_eq!(batch.position_at(7), Vector3::new(0.0, 0.0, 7.0));
    }
}
