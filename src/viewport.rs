//! The bridge between a 2D canvas and a 3D scene.
//!
//! A [`Viewport`] owns a [`Renderer`] and a [`Scene3d`] for its whole
//! lifetime. Nodes added to it are attached beneath the scene root on
//! [`Viewport::init`]. Every [`Viewport::draw`] resizes the renderer to the
//! canvas, runs the render callback through the active camera and copies the
//! frame into the canvas, centred.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use cgmath::{Vector2, Vector3, Zero};

use crate::{
    anim::{Scheduler, Spawner},
    canvas::Canvas2d,
    config::ViewportConfig,
    data_structures::scene_graph::{Background, CameraData, Object3d, ObjectKind, Projection, Scene3d},
    nodes::{
        camera::Camera,
        spatial::{Node3d, init_node},
    },
    render::{RenderCallback, Renderer, default_render_callback},
};

struct ViewportInner {
    renderer: RefCell<Box<dyn Renderer>>,
    scene: Scene3d,
    children: RefCell<Vec<Rc<dyn Node3d>>>,
    camera: RefCell<Option<Camera>>,
    fallback_camera: Object3d,
    render_callback: RefCell<RenderCallback>,
    spawner: Spawner,
    config: ViewportConfig,
    size: Cell<(u32, u32)>,
    initialized: Cell<bool>,
}

#[derive(Clone)]
pub struct Viewport(Rc<ViewportInner>);

/// Non-owning handle, held by attached nodes.
#[derive(Clone)]
pub struct WeakViewport(Weak<ViewportInner>);

impl WeakViewport {
    pub fn upgrade(&self) -> Option<Viewport> {
        self.0.upgrade().map(Viewport)
    }
}

impl Viewport {
    pub fn new(scheduler: &Scheduler, renderer: Box<dyn Renderer>, config: ViewportConfig) -> Self {
        let scene = Scene3d::new();
        {
            let mut settings = scene.settings_mut();
            settings.background = Some(Background::Color(config.background));
            settings.fog = config.fog;
        }
        let fallback_camera = Object3d::new(ObjectKind::Camera(CameraData::new(
            Projection::perspective(20.0, config.width as f32 / config.height.max(1) as f32, 0.001, 1000.0),
        )))
        .named("fallback camera");
        fallback_camera.set_position(Vector3::new(0.0, 1.5, 3.0));
        fallback_camera.look_at(Vector3::zero());

        Self(Rc::new(ViewportInner {
            renderer: RefCell::new(renderer),
            scene,
            children: RefCell::new(Vec::new()),
            camera: RefCell::new(None),
            fallback_camera,
            render_callback: RefCell::new(default_render_callback()),
            spawner: scheduler.spawner(),
            config,
            size: Cell::new((config.width, config.height)),
            initialized: Cell::new(false),
        }))
    }

    pub fn downgrade(&self) -> WeakViewport {
        WeakViewport(Rc::downgrade(&self.0))
    }

    pub fn scene(&self) -> &Scene3d {
        &self.0.scene
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.0.config
    }

    /// Size of the last draw, or the configured size before the first one.
    pub fn size(&self) -> (u32, u32) {
        self.0.size.get()
    }

    pub fn spawner(&self) -> Spawner {
        self.0.spawner.clone()
    }

    /// Start a task on the scheduler that drives this viewport.
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.0.spawner.spawn(task);
    }

    /// Add a node to the viewport. Nodes added after [`Viewport::init`] are
    /// attached right away.
    pub fn add<N: Node3d + Clone + 'static>(&self, node: &N) {
        let node: Rc<dyn Node3d> = Rc::new(node.clone());
        self.0.children.borrow_mut().push(node.clone());
        if self.0.initialized.get() {
            init_node(node.as_ref(), self, self.0.scene.root());
        }
    }

    /// Attach every added node beneath the scene root.
    pub fn init(&self) {
        self.0.initialized.set(true);
        let children = self.0.children.borrow().clone();
        for child in children {
            init_node(child.as_ref(), self, self.0.scene.root());
        }
    }

    /// The explicitly set camera, or else the first camera found depth first
    /// in the attached tree. Nodes not attached yet are skipped.
    pub fn camera(&self) -> Option<Camera> {
        if let Some(camera) = self.0.camera.borrow().as_ref() {
            return Some(camera.clone());
        }
        fn find(nodes: &[Rc<dyn Node3d>]) -> Option<Camera> {
            nodes
                .iter()
                .filter(|node| node.spatial().is_attached())
                .find_map(|node| {
                    node.as_camera()
                        .cloned()
                        .or_else(|| find(&node.spatial().children()))
                })
        }
        find(&self.0.children.borrow())
    }

    pub fn set_camera(&self, camera: &Camera) {
        *self.0.camera.borrow_mut() = Some(camera.clone());
    }

    pub fn set_render_callback(&self, callback: RenderCallback) {
        *self.0.render_callback.borrow_mut() = callback;
    }

    /// Replace the render callback with one built around the current one.
    pub fn wrap_render_callback(&self, wrap: impl FnOnce(RenderCallback) -> RenderCallback) {
        let current = self.0.render_callback.borrow().clone();
        *self.0.render_callback.borrow_mut() = wrap(current);
    }

    /// Render the scene and composite it into `canvas`.
    pub fn draw(&self, canvas: &mut dyn Canvas2d) {
        let (width, height) = canvas.size();
        if width == 0 || height == 0 {
            log::warn!("Skipping viewport draw into a {}x{} canvas.", width, height);
            return;
        }
        self.0.size.set((width, height));

        let camera = match self.camera() {
            Some(camera) => camera.configured_camera(width, height),
            None => {
                log::debug!("No camera attached, drawing through the fallback camera.");
                self.configured_fallback(width, height)
            }
        };

        let callback = self.0.render_callback.borrow().clone();
        let mut renderer = self.0.renderer.borrow_mut();
        renderer.set_size(width, height);
        if let Err(e) = callback(renderer.as_mut(), &self.0.scene, &camera) {
            log::error!("Render failed, skipping this frame: {:?}", e);
            return;
        }
        let config = &self.0.config;
        let image = renderer.frame().to_rgba8(config.tone_mapping, config.exposure);
        let (w, h) = (width as f32, height as f32);
        canvas.draw_image(&image, -w / 2.0, -h / 2.0, w, h);
    }

    fn configured_fallback(&self, width: u32, height: u32) -> Object3d {
        let camera = self.0.fallback_camera.clone();
        camera.with_camera_mut(|data| {
            if let Projection::Perspective { aspect, .. } = &mut data.projection {
                *aspect = width as f32 / height as f32;
            }
            data.update_projection_matrix();
        });
        camera
    }

    /// Canvas coordinates of a world point as seen by the active camera.
    /// Returns the origin when there is no camera.
    pub fn project_to_screen(&self, world: Vector3<f32>) -> Vector2<f32> {
        let Some(camera) = self.camera() else {
            return Vector2::zero();
        };
        let (width, height) = self.size();
        let ndc = camera.configured_camera(width, height).project(world);
        Vector2::new(
            ndc.x * 0.5 * width as f32,
            -ndc.y * 0.5 * height as f32 + self.0.config.screen_offset_y,
        )
    }

    /// Run `f` against the renderer, e.g. to inspect its last frame.
    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut dyn Renderer) -> R) -> R {
        f(self.0.renderer.borrow_mut().as_mut())
    }
}
