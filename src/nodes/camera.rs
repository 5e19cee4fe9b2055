//! Animated camera with weighted targeting.
//!
//! The camera's transform channels drive the wrapped camera object beneath an
//! identity core. `look_at` and `zoom` are properties of their own: the look
//! target is re-applied on every [`Camera::configured_camera`] call, and every
//! zoom write rebuilds the projection from the last known viewport size, so the
//! aspect ratio stays `width / height` through a zoom animation.

use std::{cell::Cell, rc::Rc};

use cgmath::{InnerSpace, Vector3, Zero};

use crate::{
    anim::{
        ease::{self, Ease},
        tween::{Lerp, tween_property},
    },
    data_structures::scene_graph::{CameraData, Object3d, ObjectKind, Projection},
    nodes::spatial::{Node3d, SpatialNode, Transform},
    reactive::{Channel, Property, Signal},
    viewport::Viewport,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CameraKind {
    #[default]
    Perspective,
    Orthographic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraConfig {
    pub kind: CameraKind,
    pub transform: Transform,
    /// Vertical field of view in degrees. Perspective only.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub look_at: Vector3<f32>,
    pub anchor: Vector3<f32>,
    /// 0 leaves targets alone, 1 replaces them with the anchor.
    pub anchor_weight: f32,
}

impl CameraConfig {
    pub fn orthographic() -> Self {
        Self {
            kind: CameraKind::Orthographic,
            near: 0.1,
            ..Default::default()
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Perspective,
            transform: Transform::default(),
            fov: 20.0,
            near: 0.001,
            far: 1000.0,
            zoom: 1.0,
            look_at: Vector3::zero(),
            anchor: Vector3::new(0.0, 1.2, 0.8),
            anchor_weight: 0.0,
        }
    }
}

#[derive(Clone)]
pub struct Camera {
    spatial: SpatialNode,
    camera: Object3d,
    zoom: Property<f32>,
    look_at: Property<Vector3<f32>>,
    anchor: Signal<Vector3<f32>>,
    anchor_weight: Signal<f32>,
    viewport_size: Rc<Cell<(u32, u32)>>,
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        let projection = match config.kind {
            CameraKind::Perspective => {
                Projection::perspective(config.fov, 16.0 / 9.0, config.near, config.far)
            }
            CameraKind::Orthographic => Projection::Orthographic {
                left: -1.0,
                right: 1.0,
                top: 1.0,
                bottom: -1.0,
                near: config.near,
                far: config.far,
                zoom: 1.0,
            },
        };
        let camera = Object3d::new(ObjectKind::Camera(CameraData::new(projection))).named("camera");
        let core = Object3d::group().named("camera rig");
        core.add(&camera);
        let spatial = SpatialNode::with_target(core, camera.clone(), config.transform);

        let viewport_size = Rc::new(Cell::new((16, 9)));
        let zoom = {
            let camera = camera.clone();
            let size = viewport_size.clone();
            Property::new(Channel::Zoom, config.zoom, move |zoom| {
                update_projection(&camera, zoom, size.get())
            })
        };
        let look_at = {
            let camera = camera.clone();
            Property::new(Channel::LookAt, config.look_at, move |target| camera.look_at(target))
        };

        Self {
            spatial,
            camera,
            zoom,
            look_at,
            anchor: Signal::new(config.anchor),
            anchor_weight: Signal::new(config.anchor_weight),
            viewport_size,
        }
    }

    /// The wrapped camera object, as last configured.
    pub fn object(&self) -> &Object3d {
        &self.camera
    }

    pub fn zoom(&self) -> &Property<f32> {
        &self.zoom
    }

    pub fn look_at(&self) -> &Property<Vector3<f32>> {
        &self.look_at
    }

    pub fn anchor(&self) -> &Signal<Vector3<f32>> {
        &self.anchor
    }

    pub fn anchor_weight(&self) -> &Signal<f32> {
        &self.anchor_weight
    }

    pub fn position(&self) -> Vector3<f32> {
        self.spatial.position().get()
    }

    pub fn projection(&self) -> Option<Projection> {
        self.camera.camera().map(|data| data.projection)
    }

    /// Push the reactive state into the camera object for a `width × height`
    /// target and return it, ready to render or project through.
    pub fn configured_camera(&self, width: u32, height: u32) -> Object3d {
        self.viewport_size.set((width, height));
        self.spatial.position().sync();
        self.spatial.rotation().sync();
        self.spatial.scale().sync();
        self.camera.look_at(self.look_at.get());
        update_projection(&self.camera, self.zoom.get(), (width, height));
        self.camera.clone()
    }

    /// Blend `target` towards the anchor by the anchor weight.
    pub fn weighted_target(&self, target: Vector3<f32>) -> Vector3<f32> {
        target.lerp(self.anchor.get(), self.anchor_weight.get())
    }

    pub async fn move_at(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        self.spatial.reposition(to, duration, ease).await
    }

    pub async fn look_to(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        tween_property(&self.look_at, to, duration, ease).await
    }

    pub async fn zoom_to(&self, to: f32, duration: f32, ease: Ease) {
        tween_property(&self.zoom, to, duration, ease).await
    }

    /// Zoom to `zoom * factor`, 0.8 by default.
    pub async fn zoom_in(&self, factor: f32, duration: f32) {
        let to = self.zoom.get() * factor;
        self.zoom_to(to, duration, ease::ease_out_sine).await
    }

    /// Zoom to `zoom * factor`, 1.25 by default.
    pub async fn zoom_out(&self, factor: f32, duration: f32) {
        let to = self.zoom.get() * factor;
        self.zoom_to(to, duration, ease::ease_in_sine).await
    }

    pub async fn move_at_weighted(&self, target: Vector3<f32>, duration: f32, ease: Ease) {
        let blended = self.weighted_target(target);
        self.move_at(blended, duration, ease).await
    }

    pub async fn look_to_weighted(&self, target: Vector3<f32>, duration: f32, ease: Ease) {
        let blended = self.weighted_target(target);
        self.look_to(blended, duration, ease).await
    }

    /// Move and look at the same weighted target. The look runs on an
    /// ease-out so the view settles before the move does.
    pub async fn move_look_weighted(&self, target: Vector3<f32>, duration: f32, ease: Ease) {
        let blended = self.weighted_target(target);
        futures::join!(
            self.move_at(blended, duration, ease),
            self.look_to(blended, duration, ease::ease_out_sine),
        );
    }

    async fn move_relative(&self, delta: Vector3<f32>, duration: f32, ease: Ease) {
        let to = self.spatial.position().get() + delta;
        self.move_at(to, duration, ease).await
    }

    async fn look_relative(&self, delta: Vector3<f32>, duration: f32, ease: Ease) {
        let to = self.look_at.get() + delta;
        self.look_to(to, duration, ease).await
    }

    pub async fn move_right(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_left(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(-Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn move_up(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_down(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(-Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn move_forward(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(-Vector3::unit_z() * amount, duration, ease).await
    }

    pub async fn move_back(&self, amount: f32, duration: f32, ease: Ease) {
        self.move_relative(Vector3::unit_z() * amount, duration, ease).await
    }

    pub async fn look_right(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn look_left(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(-Vector3::unit_x() * amount, duration, ease).await
    }

    pub async fn look_up(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn look_down(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(-Vector3::unit_y() * amount, duration, ease).await
    }

    pub async fn look_forward(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(-Vector3::unit_z() * amount, duration, ease).await
    }

    pub async fn look_back(&self, amount: f32, duration: f32, ease: Ease) {
        self.look_relative(Vector3::unit_z() * amount, duration, ease).await
    }

    /// Rotate the camera object directly. The next configured frame re-aims
    /// it at the look target, so this mostly matters for roll.
    pub async fn rotate_to(&self, to: Vector3<f32>, duration: f32, ease: Ease) {
        let camera = self.camera.clone();
        let from = camera.rotation();
        crate::anim::tween(duration, |t| camera.set_rotation(from.lerp(to, ease(t)))).await;
        self.spatial.rotation().set_signal_only(to);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

impl Node3d for Camera {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }

    fn on_attach(&self, viewport: &Viewport) {
        if self.spatial.position().get().magnitude2() < 1e-4 {
            self.spatial.position().set(Vector3::new(0.0, 1.5, 3.0));
        }
        let (width, height) = viewport.size();
        self.configured_camera(width, height);
    }

    fn as_camera(&self) -> Option<&Camera> {
        Some(self)
    }
}

/// Rebuild the projection of `camera` for a viewport of `size` at `zoom`.
fn update_projection(camera: &Object3d, zoom: f32, (width, height): (u32, u32)) {
    let aspect = width as f32 / height.max(1) as f32;
    camera.with_camera_mut(|data| {
        match &mut data.projection {
            Projection::Perspective {
                aspect: a, zoom: z, ..
            } => {
                *a = aspect;
                *z = zoom;
            }
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                ..
            } => {
                let s = zoom / 2.0;
                *left = -aspect * s;
                *right = aspect * s;
                *top = s;
                *bottom = -s;
            }
        }
        data.update_projection_matrix();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_weight_blends_targets() {
        let camera = Camera::new(CameraConfig {
            anchor: Vector3::new(0.0, 2.0, 0.0),
            ..Default::default()
        });
        let target = Vector3::new(4.0, 0.0, 0.0);
        assert_eq!(camera.weighted_target(target), target);
        camera.anchor_weight().set(1.0);
        assert_eq!(camera.weighted_target(target), Vector3::new(0.0, 2.0, 0.0));
        camera.anchor_weight().set(0.5);
        assert_eq!(camera.weighted_target(target), Vector3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn orthographic_frustum_follows_zoom_and_aspect() {
        let camera = Camera::new(CameraConfig::orthographic());
        camera.zoom().set(4.0);
        camera.configured_camera(200, 100);
        match camera.projection() {
            Some(Projection::Orthographic {
                left, right, top, bottom, ..
            }) => {
                assert_eq!((left, right), (-4.0, 4.0));
                assert_eq!((top, bottom), (2.0, -2.0));
            }
            other => panic!("unexpected projection {other:?}"),
        }
    }
}
