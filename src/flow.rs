//! Frame loop driving a scene script.
//!
//! A [`Stage`] ties together the pieces a scene needs: the [`Scheduler`] the
//! script and its animations run on, the [`Viewport`] that renders the 3D
//! scene, the labels overlaid on it and the 2D canvas everything ends up in.
//!
//! # Lifecycle
//!
//! Every frame follows the same pattern:
//! 1. Advance the scheduler one frame, running every task that became ready
//! 2. Clear the canvas to the viewport background
//! 3. Render the viewport into the canvas
//! 4. Move every label to its tracked point and draw it
//!
//! [`Stage::play`] runs a script from its first suspension until it and every
//! task it spawned are done, handing each finished frame to a sink.

use std::{
    cell::Cell,
    path::Path,
    rc::Rc,
};

use anyhow::Context;
use image::Rgba;
use instant::Instant;

use crate::{
    anim::{Barriers, Scheduler},
    canvas::{Canvas2d, ImageCanvas},
    config::StageConfig,
    nodes::label::Label,
    render::Renderer,
    viewport::Viewport,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Install the platform logger. Safe to call more than once.
pub fn init_logger() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&JsValue::from_str(&format!("Could not initialize logger: {e}")));
        }
    }
}

pub struct Stage<C: Canvas2d = ImageCanvas> {
    config: StageConfig,
    scheduler: Scheduler,
    viewport: Viewport,
    canvas: C,
    labels: Vec<Label>,
    frame_index: u64,
}

impl Stage<ImageCanvas> {
    /// A stage drawing into an in-memory canvas of the configured size.
    pub fn headless(config: StageConfig, renderer: Box<dyn Renderer>) -> Self {
        let canvas = ImageCanvas::new(config.width, config.height);
        Self::new(config, renderer, canvas)
    }

    /// Play `script` and write every frame to `dir` as `frame_00000.png`,
    /// `frame_00001.png` and so on. Returns the number of frames written.
    pub fn render_to_dir(
        &mut self,
        script: impl Future<Output = ()> + 'static,
        dir: impl AsRef<Path>,
    ) -> anyhow::Result<u64> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;
        let frames = self.play(script, |index, canvas| {
            let path = dir.join(format!("frame_{:05}.png", index));
            canvas
                .image()
                .save(&path)
                .with_context(|| format!("Could not write {}", path.display()))
        })?;
        log::info!("Wrote {} frames to {}", frames, dir.display());
        Ok(frames)
    }
}

impl<C: Canvas2d> Stage<C> {
    pub fn new(config: StageConfig, renderer: Box<dyn Renderer>, canvas: C) -> Self {
        let scheduler = Scheduler::new(config.fps);
        let viewport = Viewport::new(&scheduler, renderer, config.viewport);
        Self {
            config,
            scheduler,
            viewport,
            canvas,
            labels: Vec::new(),
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn barriers(&self) -> &Barriers {
        self.scheduler.barriers()
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn add_label(&mut self, label: &Label) {
        self.labels.push(label.clone());
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of frames drawn so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Attach everything added to the viewport so far.
    pub fn init(&self) {
        self.viewport.init();
    }

    /// Advance one frame and draw it.
    pub fn frame(&mut self) {
        self.scheduler.tick();
        self.draw();
    }

    fn draw(&mut self) {
        let started = Instant::now();
        let [r, g, b] = self.viewport.config().background.to_srgb8();
        self.canvas.clear(Rgba([r, g, b, 255]));
        self.viewport.draw(&mut self.canvas);
        for label in &self.labels {
            label.update(&self.viewport);
            label.draw(&mut self.canvas);
        }
        log::debug!("Frame {} drawn in {:?}", self.frame_index, started.elapsed());
        self.frame_index += 1;
    }

    /// Run `script` to completion, drawing a frame per tick and passing each
    /// one to `sink` with its index. The first frame shows the scene as the
    /// script left it before its first suspension. Returns the number of
    /// frames drawn.
    pub fn play(
        &mut self,
        script: impl Future<Output = ()> + 'static,
        mut sink: impl FnMut(u64, &C) -> anyhow::Result<()>,
    ) -> anyhow::Result<u64> {
        self.init();
        let finished = Rc::new(Cell::new(false));
        {
            let finished = finished.clone();
            self.scheduler.spawn(async move {
                script.await;
                finished.set(true);
            });
        }
        self.scheduler.settle();

        let first = self.frame_index;
        self.draw();
        sink(self.frame_index - 1, &self.canvas)?;
        while !self.scheduler.is_idle() {
            if self.frame_index - first >= self.config.max_frames {
                log::warn!(
                    "Stopping after {} frames, {} tasks still running (script finished: {}).",
                    self.config.max_frames,
                    self.scheduler.spawner().live_tasks(),
                    finished.get()
                );
                break;
            }
            self.frame();
            sink(self.frame_index - 1, &self.canvas)?;
        }
        Ok(self.frame_index - first)
    }
}
