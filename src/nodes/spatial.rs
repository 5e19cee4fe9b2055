//! Spatial nodes: reactive transforms wrapped around one 3D graph handle.
//!
//! A [`SpatialNode`] owns a *core* [`Object3d`] that is created up front but
//! only joins a hierarchy during [`init_node`], exactly once. Its position,
//! rotation and scale are [`Property`] channels that write through to a
//! *transform target*: usually the core itself, but cameras and lights keep an
//! identity core and move the wrapped camera or light object instead.
//!
//! Composition (which nodes a node was built from) is tracked separately from
//! the 3D graph's own parent/child lists.

use std::{
    cell::{Cell, RefCell},
    f32::consts::PI,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use cgmath::{InnerSpace, Vector3};

use crate::{
    anim::{
        clock::next_frame,
        ease::{self, Ease},
        tween::tween_property,
    },
    data_structures::scene_graph::Object3d,
    nodes::camera::Camera,
    reactive::{Channel, Property},
    viewport::{Viewport, WeakViewport},
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Initial local transform of a node. Rotation is Euler XYZ in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vector3<f32> {
        match self {
            Axis::X => Vector3::unit_x(),
            Axis::Y => Vector3::unit_y(),
            Axis::Z => Vector3::unit_z(),
        }
    }
}

/// Anything that can be attached beneath a viewport.
pub trait Node3d {
    fn spatial(&self) -> &SpatialNode;

    /// Called once, right after the node's core joined the 3D graph and before
    /// its children are attached.
    fn on_attach(&self, _viewport: &Viewport) {}

    fn as_camera(&self) -> Option<&Camera> {
        None
    }
}

struct SpatialInner {
    id: u64,
    core: Object3d,
    target: Object3d,
    position: Property<Vector3<f32>>,
    rotation: Property<Vector3<f32>>,
    scale: Property<Vector3<f32>>,
    attached: Cell<bool>,
    viewport: RefCell<Option<WeakViewport>>,
    children: RefCell<Vec<Rc<dyn Node3d>>>,
}

#[derive(Clone)]
pub struct SpatialNode(Rc<SpatialInner>);

impl SpatialNode {
    pub fn new(core: Object3d, transform: Transform) -> Self {
        Self::with_target(core.clone(), core, transform)
    }

    /// A node whose transform channels drive `target` rather than `core`.
    pub fn with_target(core: Object3d, target: Object3d, transform: Transform) -> Self {
        let position = {
            let target = target.clone();
            Property::new(Channel::Position, transform.position, move |v| {
                target.set_position(v)
            })
        };
        let rotation = {
            let target = target.clone();
            Property::new(Channel::Rotation, transform.rotation, move |v| {
                target.set_rotation(v)
            })
        };
        let scale = {
            let target = target.clone();
            Property::new(Channel::Scale, transform.scale, move |v| target.set_scale(v))
        };
        Self(Rc::new(SpatialInner {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            core,
            target,
            position,
            rotation,
            scale,
            attached: Cell::new(false),
            viewport: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn group(transform: Transform) -> Self {
        Self::new(Object3d::group(), transform)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn core(&self) -> &Object3d {
        &self.0.core
    }

    pub fn target(&self) -> &Object3d {
        &self.0.target
    }

    pub fn position(&self) -> &Property<Vector3<f32>> {
        &self.0.position
    }

    pub fn rotation(&self) -> &Property<Vector3<f32>> {
        &self.0.rotation
    }

    pub fn scale(&self) -> &Property<Vector3<f32>> {
        &self.0.scale
    }

    pub fn is_attached(&self) -> bool {
        self.0.attached.get()
    }

    /// The viewport this node was attached under, if it is still alive.
    pub fn viewport(&self) -> Option<Viewport> {
        self.0.viewport.borrow().as_ref().and_then(WeakViewport::upgrade)
    }

    /// Append a child to the composition list. Children added after `init`
    /// are attached right away.
    pub fn add<N: Node3d + Clone + 'static>(&self, child: &N) {
        let child: Rc<dyn Node3d> = Rc::new(child.clone());
        self.0.children.borrow_mut().push(child.clone());
        if self.is_attached() {
            match self.viewport() {
                Some(viewport) => init_node(child.as_ref(), &viewport, &self.0.core),
                None => log::warn!("Node {} is attached but its viewport is gone.", self.id()),
            }
        }
    }

    pub fn children(&self) -> Vec<Rc<dyn Node3d>> {
        self.0.children.borrow().clone()
    }

    /// World position of the transform target.
    pub fn global_position(&self) -> Vector3<f32> {
        self.0.target.world_position()
    }

    pub async fn reposition(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        tween_property(&self.0.position, to, duration, ease).await
    }

    pub async fn rotate_to(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        tween_property(&self.0.rotation, to, duration, ease).await
    }

    pub async fn scale_to(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        tween_property(&self.0.scale, to, duration, ease).await
    }

    pub async fn move_by(&self, delta: Vector3<f32>, duration: f32, ease: Ease) {
        let to = self.0.position.get() + delta;
        self.reposition(to, duration, ease).await
    }

    pub async fn move_right(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_left(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(-Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_up(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_down(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(-Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_forward(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(-Vector3::unit_z() * amount, duration, ease).await
    }

    pub async fn move_back(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_by(Vector3::unit_z() * amount, duration, ease).await
    }

    /// Scale the current scale by `factor`, e.g. 1.1 to emphasise.
    pub async fn expand(&self, factor: f32, duration: f32, ease: Ease) {
        let to = self.0.scale.get() * factor;
        self.scale_to(to, duration, ease).await
    }

    pub async fn shrink(&self, factor: f32, duration: f32, ease: Ease) {
        self.expand(factor, duration, ease).await
    }

    /// Spin in from half a turn of yaw while scaling up to `end_scale`.
    pub async fn pop_in(&self, duration: f32, end_scale: f32, ease: Ease) {
        let rotation = self.0.rotation.get();
        self.0.rotation.set(rotation + Vector3::unit_y());
        futures::join!(
            self.scale_to(Vector3::new(end_scale, end_scale, end_scale), duration, ease),
            self.rotate_to(rotation, duration, ease),
        );
    }

    pub async fn pop_out(&self, duration: f32, ease: Ease) {
        let spun = self.0.rotation.get() + Vector3::unit_y();
        futures::join!(
            self.scale_to(Vector3::new(0.0, 0.0, 0.0), duration, ease),
            self.rotate_to(spun, duration, ease),
        );
    }

    /// Rotate forever by half a turn per `speed` seconds around each axis.
    /// While the node is scaled to nothing it just idles.
    pub async fn idle_rotation(&self, axes: &[Axis], speed: f32) {
        let step: Vector3<f32> = axes.iter().map(|a| a.unit() * PI).sum();
        loop {
            if self.0.scale.get().magnitude2() < 1e-8 {
                next_frame().await;
                continue;
            }
            let to = self.0.rotation.get() + step;
            self.rotate_to(to, speed, ease::linear).await;
        }
    }
}

impl Node3d for SpatialNode {
    fn spatial(&self) -> &SpatialNode {
        self
    }
}

/// Attach `node` beneath `parent`, then its composition children beneath it.
/// A node that is already attached is left alone.
pub fn init_node(node: &dyn Node3d, viewport: &Viewport, parent: &Object3d) {
    let spatial = node.spatial();
    if spatial.0.attached.replace(true) {
        log::debug!("Node {} is already attached, skipping init.", spatial.id());
        return;
    }
    *spatial.0.viewport.borrow_mut() = Some(viewport.downgrade());
    parent.add(&spatial.0.core);
    node.on_attach(viewport);
    for child in spatial.children() {
        init_node(child.as_ref(), viewport, &spatial.0.core);
    }
}
