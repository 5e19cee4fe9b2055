//! The 3D object graph components attach into.
//!
//! [`Object3d`] is a cheap, clonable handle to a node in a retained hierarchy:
//! every node has a local transform, a parent (held weakly) and an ordered
//! child list, and carries one [`ObjectKind`] payload that renderers read.
//! World transforms are derived on demand by walking the parent chain, so a
//! moved group moves everything beneath it without any propagation step.
//!
//! - [`Object3d`] is the node handle
//! - [`ObjectKind`] is the payload (group, mesh, instanced mesh, light, camera)
//! - [`Scene3d`] is a root node plus background/environment/fog settings

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt::Debug,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

use cgmath::{
    Deg, EuclideanSpace, Euler, InnerSpace, Matrix3, Matrix4, Point3, Quaternion, Rad,
    SquareMatrix, Transform, Vector3, Zero,
};

use crate::data_structures::{
    color::Color,
    geometry::Geometry,
    instance::euler_to_quaternion,
    material::Material,
    texture::EnvironmentTexture,
};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug)]
pub struct MeshData {
    pub geometry: Rc<Geometry>,
    pub material: Material,
}

/// One geometry drawn `matrices.len()` times in a single call.
#[derive(Clone, Debug)]
pub struct InstancedData {
    pub geometry: Rc<Geometry>,
    pub material: Material,
    pub matrices: Vec<Matrix4<f32>>,
    pub colors: Vec<Color>,
    version: u64,
}

impl InstancedData {
    pub fn new(geometry: Rc<Geometry>, material: Material, capacity: usize) -> Self {
        Self {
            geometry,
            material,
            matrices: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            version: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.matrices.len()
    }

    /// Flag the whole instance buffer for re-upload.
    pub fn mark_dirty(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Point { distance: f32, decay: f32 },
    Directional,
    Hemisphere { ground: Color },
    Ambient,
    /// A cone of `angle` radians (half angle) around the line to the target,
    /// softened over the outer `penumbra` fraction.
    Spot {
        distance: f32,
        angle: f32,
        penumbra: f32,
        decay: f32,
    },
}

impl LightKind {
    /// Whether the light shines at a target object.
    pub fn is_aimed(self) -> bool {
        matches!(self, LightKind::Directional | LightKind::Spot { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowSettings {
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 2048,
            near: 1.0,
            far: 50.0,
            bias: -0.0001,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightData {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    pub shadow: Option<ShadowSettings>,
    /// Aim point for directional and spot lights.
    pub target: Option<Object3d>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov: Deg<f32>,
        aspect: f32,
        near: f32,
        far: f32,
        zoom: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
        zoom: f32,
    },
}

impl Projection {
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov: Deg(fov),
            aspect,
            near,
            far,
            zoom: 1.0,
        }
    }

    /// OpenGL-style clip space matrix (z in [-1, 1]).
    pub fn matrix(&self) -> Matrix4<f32> {
        match *self {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
                zoom,
            } => {
                let half = Rad::from(fov).0 / 2.0;
                let fovy = 2.0 * (half.tan() / zoom.max(f32::EPSILON)).atan();
                cgmath::perspective(Rad(fovy), aspect.max(f32::EPSILON), near, far)
            }
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
                zoom,
            } => {
                let zoom = zoom.max(f32::EPSILON);
                let (cx, cy) = ((right + left) / 2.0, (top + bottom) / 2.0);
                let (dx, dy) = ((right - left) / (2.0 * zoom), (top - bottom) / (2.0 * zoom));
                cgmath::ortho(cx - dx, cx + dx, cy - dy, cy + dy, near, far)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraData {
    pub projection: Projection,
    projection_matrix: Matrix4<f32>,
}

impl CameraData {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            projection_matrix: projection.matrix(),
        }
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self.projection.matrix();
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection_matrix
    }
}

#[derive(Clone, Debug)]
pub enum ObjectKind {
    Group,
    Mesh(MeshData),
    Instanced(InstancedData),
    Light(LightData),
    Camera(CameraData),
}

#[derive(Debug)]
pub struct ObjectData {
    pub name: String,
    pub position: Vector3<f32>,
    /// Euler XYZ in radians.
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub render_order: i32,
    pub kind: ObjectKind,
    id: u64,
    parent: Option<Weak<RefCell<ObjectData>>>,
    children: Vec<Object3d>,
}

impl ObjectData {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Shared handle to one node of the 3D graph.
#[derive(Clone)]
pub struct Object3d(Rc<RefCell<ObjectData>>);

impl Object3d {
    pub fn new(kind: ObjectKind) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            name: String::new(),
            position: Vector3::zero(),
            rotation: Vector3::zero(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            visible: true,
            cast_shadow: false,
            receive_shadow: false,
            render_order: 0,
            kind,
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            children: Vec::new(),
        })))
    }

    pub fn group() -> Self {
        Self::new(ObjectKind::Group)
    }

    pub fn mesh(geometry: Rc<Geometry>, material: Material) -> Self {
        Self::new(ObjectKind::Mesh(MeshData { geometry, material }))
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.0.borrow_mut().name = name.into();
        self
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn ptr_eq(&self, other: &Object3d) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn data(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub fn data_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    /// Attach `child` beneath `self`, detaching it from any previous parent.
    pub fn add(&self, child: &Object3d) {
        if child.ptr_eq(self) {
            log::warn!("Refusing to add object {} as a child of itself.", self.id());
            return;
        }
        if let Some(old_parent) = child.parent() {
            old_parent.remove(child);
        }
        child.0.borrow_mut().parent = Some(Rc::downgrade(&self.0));
        self.0.borrow_mut().children.push(child.clone());
    }

    /// Detach `child`. Returns false if it was not a direct child.
    pub fn remove(&self, child: &Object3d) -> bool {
        let mut data = self.0.borrow_mut();
        let before = data.children.len();
        data.children.retain(|c| !c.ptr_eq(child));
        let removed = data.children.len() != before;
        drop(data);
        if removed {
            child.0.borrow_mut().parent = None;
        }
        removed
    }

    pub fn clear(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in children {
            child.0.borrow_mut().parent = None;
        }
    }

    pub fn children(&self) -> Vec<Object3d> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn parent(&self) -> Option<Object3d> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Object3d)
    }

    pub fn position(&self) -> Vector3<f32> {
        self.0.borrow().position
    }

    pub fn set_position(&self, position: Vector3<f32>) {
        self.0.borrow_mut().position = position;
    }

    pub fn rotation(&self) -> Vector3<f32> {
        self.0.borrow().rotation
    }

    pub fn set_rotation(&self, rotation: Vector3<f32>) {
        self.0.borrow_mut().rotation = rotation;
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.0.borrow().scale
    }

    pub fn set_scale(&self, scale: Vector3<f32>) {
        self.0.borrow_mut().scale = scale;
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.borrow_mut().visible = visible;
    }

    pub fn local_matrix(&self) -> Matrix4<f32> {
        let data = self.0.borrow();
        Matrix4::from_translation(data.position)
            * Matrix4::from(euler_to_quaternion(data.rotation))
            * Matrix4::from_nonuniform_scale(data.scale.x, data.scale.y, data.scale.z)
    }

    /// Accumulated transform from the root of whatever tree this node is in.
    pub fn world_matrix(&self) -> Matrix4<f32> {
        let local = self.local_matrix();
        match self.parent() {
            Some(parent) => parent.world_matrix() * local,
            None => local,
        }
    }

    pub fn world_position(&self) -> Vector3<f32> {
        self.world_matrix().w.truncate()
    }

    /// Orient towards a world-space point. Cameras and lights point their -Z
    /// axis at the target, everything else points +Z.
    pub fn look_at(&self, target: Vector3<f32>) {
        let eye = self.world_position();
        let points_negative_z = matches!(
            self.0.borrow().kind,
            ObjectKind::Camera(_) | ObjectKind::Light(_)
        );
        let (from, to) = if points_negative_z {
            (eye, target)
        } else {
            (target, eye)
        };

        let up = Vector3::unit_y();
        let mut z = from - to;
        if z.magnitude2() == 0.0 {
            z.z = 1.0;
        }
        z = z.normalize();
        let mut x = up.cross(z);
        if x.magnitude2() == 0.0 {
            // up and z are parallel, nudge z off the axis
            if up.z.abs() == 1.0 {
                z.x += 0.0001;
            } else {
                z.z += 0.0001;
            }
            z = z.normalize();
            x = up.cross(z);
        }
        x = x.normalize();
        let y = z.cross(x);

        let mut q = Quaternion::from(Matrix3::from_cols(x, y, z));
        if let Some(parent) = self.parent() {
            let parent_rotation = rotation_of(&parent.world_matrix());
            q = parent_rotation.conjugate() * q;
        }
        let euler = Euler::from(q);
        self.set_rotation(Vector3::new(euler.x.0, euler.y.0, euler.z.0));
    }

    /// Depth-first, pre-order walk. The child list is snapshotted per node so
    /// the callback may restructure the graph.
    pub fn traverse(&self, f: &mut dyn FnMut(&Object3d)) {
        f(self);
        for child in self.children() {
            child.traverse(f);
        }
    }

    pub fn find(&self, predicate: &dyn Fn(&Object3d) -> bool) -> Option<Object3d> {
        if predicate(self) {
            return Some(self.clone());
        }
        self.children()
            .into_iter()
            .find_map(|child| child.find(predicate))
    }

    pub fn is_camera(&self) -> bool {
        matches!(self.0.borrow().kind, ObjectKind::Camera(_))
    }

    /// Run `f` against the material of a mesh or instanced mesh.
    pub fn with_material_mut<R>(&self, f: impl FnOnce(&mut Material) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Mesh(mesh) => Some(f(&mut mesh.material)),
            ObjectKind::Instanced(instanced) => Some(f(&mut instanced.material)),
            _ => None,
        }
    }

    pub fn material(&self) -> Option<Material> {
        match &self.0.borrow().kind {
            ObjectKind::Mesh(mesh) => Some(mesh.material.clone()),
            ObjectKind::Instanced(instanced) => Some(instanced.material.clone()),
            _ => None,
        }
    }

    pub fn geometry(&self) -> Option<Rc<Geometry>> {
        match &self.0.borrow().kind {
            ObjectKind::Mesh(mesh) => Some(mesh.geometry.clone()),
            ObjectKind::Instanced(instanced) => Some(instanced.geometry.clone()),
            _ => None,
        }
    }

    pub fn set_geometry(&self, geometry: Rc<Geometry>) {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Mesh(mesh) => mesh.geometry = geometry,
            ObjectKind::Instanced(instanced) => instanced.geometry = geometry,
            _ => log::warn!("Geometry assigned to an object that cannot draw it."),
        }
    }

    pub fn with_light_mut<R>(&self, f: impl FnOnce(&mut LightData) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Light(light) => Some(f(light)),
            _ => None,
        }
    }

    pub fn light(&self) -> Option<LightData> {
        match &self.0.borrow().kind {
            ObjectKind::Light(light) => Some(light.clone()),
            _ => None,
        }
    }

    pub fn with_camera_mut<R>(&self, f: impl FnOnce(&mut CameraData) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Camera(camera) => Some(f(camera)),
            _ => None,
        }
    }

    pub fn camera(&self) -> Option<CameraData> {
        match &self.0.borrow().kind {
            ObjectKind::Camera(camera) => Some(camera.clone()),
            _ => None,
        }
    }

    pub fn with_instanced_mut<R>(&self, f: impl FnOnce(&mut InstancedData) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Instanced(instanced) => Some(f(instanced)),
            _ => None,
        }
    }

    pub fn with_instanced<R>(&self, f: impl FnOnce(&InstancedData) -> R) -> Option<R> {
        match &self.0.borrow().kind {
            ObjectKind::Instanced(instanced) => Some(f(instanced)),
            _ => None,
        }
    }

    /// View matrix of a camera node: the inverse of its world transform.
    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.world_matrix()
            .invert()
            .unwrap_or_else(Matrix4::identity)
    }

    /// Project a world point to normalised device coordinates through this
    /// camera. Non-camera nodes project to the origin.
    pub fn project(&self, world: Vector3<f32>) -> Vector3<f32> {
        let Some(camera) = self.camera() else {
            return Vector3::zero();
        };
        let clip = camera.projection_matrix() * self.view_matrix();
        clip.transform_point(Point3::from_vec(world)).to_vec()
    }
}

impl Debug for Object3d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Object3d")
            .field("id", &data.id)
            .field("name", &data.name)
            .field("children", &data.children.len())
            .finish()
    }
}

/// Rotation part of an affine matrix with scale removed.
fn rotation_of(m: &Matrix4<f32>) -> Quaternion<f32> {
    let norm = |v: Vector3<f32>| {
        if v.magnitude2() > 0.0 {
            v.normalize()
        } else {
            v
        }
    };
    let cols = Matrix3::from_cols(norm(m.x.truncate()), norm(m.y.truncate()), norm(m.z.truncate()));
    Quaternion::from(cols)
}

#[derive(Clone, Debug)]
pub enum Background {
    Color(Color),
    Environment(Rc<EnvironmentTexture>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub near: f32,
    pub far: f32,
}

#[derive(Clone, Debug, Default)]
pub struct SceneSettings {
    pub background: Option<Background>,
    pub environment: Option<Rc<EnvironmentTexture>>,
    pub fog: Option<Fog>,
}

/// A scene root and its global settings.
#[derive(Clone, Debug)]
pub struct Scene3d {
    root: Object3d,
    settings: Rc<RefCell<SceneSettings>>,
}

impl Scene3d {
    pub fn new() -> Self {
        Self {
            root: Object3d::group().named("scene"),
            settings: Default::default(),
        }
    }

    pub fn root(&self) -> &Object3d {
        &self.root
    }

    pub fn settings(&self) -> Ref<'_, SceneSettings> {
        self.settings.borrow()
    }

    pub fn settings_mut(&self) -> RefMut<'_, SceneSettings> {
        self.settings.borrow_mut()
    }

    pub fn environment(&self) -> Option<Rc<EnvironmentTexture>> {
        self.settings.borrow().environment.clone()
    }

    pub fn add(&self, object: &Object3d) {
        self.root.add(object);
    }

    pub fn traverse(&self, f: &mut dyn FnMut(&Object3d)) {
        self.root.traverse(f);
    }
}

impl Default for Scene3d {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reparenting_detaches_from_the_old_parent() {
        let a = Object3d::group();
        let b = Object3d::group();
        let child = Object3d::group();
        a.add(&child);
        b.add(&child);
        assert_eq!(a.child_count(), 0);
        assert_eq!(b.child_count(), 1);
        assert!(child.parent().is_some_and(|p| p.ptr_eq(&b)));
    }

    #[test]
    fn world_position_accumulates_parents() {
        let parent = Object3d::group();
        parent.set_position(Vector3::new(1.0, 0.0, 0.0));
        parent.set_scale(Vector3::new(2.0, 2.0, 2.0));
        let child = Object3d::group();
        child.set_position(Vector3::new(0.0, 1.0, 0.0));
        parent.add(&child);
        let world = child.world_position();
        assert!((world - Vector3::new(1.0, 2.0, 0.0)).magnitude() < 1e-6);
    }

    #[test]
    fn camera_look_at_faces_negative_z() {
        let camera = Object3d::new(ObjectKind::Camera(CameraData::new(Projection::perspective(
            45.0, 1.0, 0.1, 100.0,
        ))));
        camera.set_position(Vector3::new(0.0, 0.0, 5.0));
        camera.look_at(Vector3::new(0.0, 0.0, 0.0));
        let ndc = camera.project(Vector3::new(0.0, 0.0, 0.0));
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5, "{ndc:?}");
    }
}
