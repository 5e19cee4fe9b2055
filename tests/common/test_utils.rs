use std::{cell::RefCell, rc::Rc};

use stage3d::{
    anim::Scheduler,
    config::ViewportConfig,
    data_structures::{
        color::Color,
        geometry::Geometry,
        material::Material,
        scene_graph::{Object3d, Scene3d},
    },
    render::{Frame, Renderer},
    resources::{MeshPrimitive, ModelData, ModelNode, memory::MemoryLoader},
    viewport::Viewport,
};

/// What a [`FakeRenderer`] saw, shared with the test after the renderer was
/// boxed into a viewport.
#[derive(Default)]
pub(crate) struct RenderLog {
    pub(crate) sizes: Vec<(u32, u32)>,
    pub(crate) renders: usize,
    pub(crate) cameras: Vec<Object3d>,
    pub(crate) scene_children: Vec<usize>,
}

/// Renders nothing but a solid colour and records every call.
pub(crate) struct FakeRenderer {
    color: Color,
    size: (u32, u32),
    frame: Frame,
    log: Rc<RefCell<RenderLog>>,
}

impl FakeRenderer {
    pub(crate) fn new(color: Color) -> (Self, Rc<RefCell<RenderLog>>) {
        let log: Rc<RefCell<RenderLog>> = Rc::default();
        let renderer = Self {
            color,
            size: (1, 1),
            frame: Frame::new(1, 1),
            log: log.clone(),
        };
        (renderer, log)
    }
}

impl Renderer for FakeRenderer {
    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.frame.resize(width, height);
        self.log.borrow_mut().sizes.push((width, height));
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn render(&mut self, scene: &Scene3d, camera: &Object3d) -> anyhow::Result<()> {
        self.frame.clear(self.color, 1.0);
        let mut log = self.log.borrow_mut();
        log.renders += 1;
        log.cameras.push(camera.clone());
        log.scene_children.push(scene.root().child_count());
        Ok(())
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

pub(crate) struct FrameCounter(pub(crate) u32);
impl Default for FrameCounter {
    fn default() -> Self {
        Self(0)
    }
}
impl FrameCounter {
    pub(crate) fn frame(&self) -> u32 {
        return self.0;
    }

    pub(crate) fn progress(&mut self) {
        self.0 += 1;
    }
}

/// A scheduler at 60 fps and a viewport on top of a black [`FakeRenderer`].
pub(crate) fn viewport_with(config: ViewportConfig) -> (Scheduler, Viewport, Rc<RefCell<RenderLog>>) {
    let scheduler = Scheduler::new(60.0);
    let (renderer, log) = FakeRenderer::new(Color::BLACK);
    let viewport = Viewport::new(&scheduler, Box::new(renderer), config);
    (scheduler, viewport, log)
}

pub(crate) fn viewport() -> (Scheduler, Viewport, Rc<RefCell<RenderLog>>) {
    viewport_with(ViewportConfig::default())
}

/// Spawn `script` and tick until it finished. Panics after `max_frames`.
pub(crate) fn drive(
    scheduler: &mut Scheduler,
    script: impl Future<Output = ()> + 'static,
    max_frames: u32,
) -> FrameCounter {
    let done = Rc::new(std::cell::Cell::new(false));
    let flag = done.clone();
    scheduler.spawn(async move {
        script.await;
        flag.set(true);
    });
    scheduler.settle();
    let mut frames = FrameCounter::default();
    while !done.get() {
        assert!(
            frames.frame() < max_frames,
            "script did not finish within {} frames",
            max_frames
        );
        scheduler.tick();
        frames.progress();
    }
    frames
}

/// A model with one unit cube and a standard material.
pub(crate) fn cube_model(source: &str) -> ModelData {
    ModelData {
        source: source.to_string(),
        roots: vec![ModelNode {
            name: "cube".to_string(),
            primitives: vec![MeshPrimitive {
                name: "cube".to_string(),
                geometry: Rc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
                material: Material::standard(Color::from_hex(0x8899aa)),
            }],
            ..Default::default()
        }],
    }
}

/// A model with a body and a lid, nested one level deep.
pub(crate) fn two_part_model(source: &str) -> ModelData {
    let lid = ModelNode {
        name: "lid".to_string(),
        primitives: vec![MeshPrimitive {
            name: "lid".to_string(),
            geometry: Rc::new(Geometry::plane(1.0, 1.0)),
            material: Material::basic(Color::WHITE),
        }],
        ..Default::default()
    };
    let mut model = cube_model(source);
    model.roots[0].children.push(lid);
    model
}

/// A loader serving [`cube_model`] as `crate.glb` and [`two_part_model`] as
/// `box.gltf`.
pub(crate) fn memory_loader() -> Rc<MemoryLoader> {
    let loader = MemoryLoader::new();
    loader.insert_model("crate.glb", cube_model("crate.glb"));
    loader.insert_model("box.gltf", two_part_model("box.gltf"));
    Rc::new(loader)
}

pub(crate) fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}
