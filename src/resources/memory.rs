//! In-memory assets, for procedural content and for driving tests without a
//! file system.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use futures::{FutureExt, future::LocalBoxFuture};

use crate::{
    anim::next_frame,
    data_structures::texture::HdrImage,
    resources::{AssetLoader, ModelData},
};

/// Serves models and images registered up front.
///
/// Lookups happen when a load is requested. With a latency set, the result
/// is held back for that many frames, which lets callers observe the loading
/// state the same way they would with a real file.
#[derive(Default)]
pub struct MemoryLoader {
    models: RefCell<HashMap<String, ModelData>>,
    images: RefCell<HashMap<String, HdrImage>>,
    latency: Cell<u32>,
    model_loads: Cell<usize>,
    image_loads: Cell<usize>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(self, frames: u32) -> Self {
        self.latency.set(frames);
        self
    }

    pub fn insert_model(&self, path: impl Into<String>, model: ModelData) {
        self.models.borrow_mut().insert(path.into(), model);
    }

    pub fn insert_image(&self, path: impl Into<String>, image: HdrImage) {
        self.images.borrow_mut().insert(path.into(), image);
    }

    /// How many model loads were requested so far.
    pub fn model_loads(&self) -> usize {
        self.model_loads.get()
    }

    pub fn image_loads(&self) -> usize {
        self.image_loads.get()
    }

    fn deliver<T: 'static>(&self, result: anyhow::Result<T>) -> LocalBoxFuture<'static, anyhow::Result<T>> {
        let latency = self.latency.get();
        async move {
            for _ in 0..latency {
                next_frame().await;
            }
            result
        }
        .boxed_local()
    }
}

impl AssetLoader for MemoryLoader {
    fn load_model(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<ModelData>> {
        self.model_loads.set(self.model_loads.get() + 1);
        let result = self
            .models
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No model registered as {path}"));
        self.deliver(result)
    }

    fn load_equirect(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<HdrImage>> {
        self.image_loads.set(self.image_loads.get() + 1);
        let result = self
            .images
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No image registered as {path}"));
        self.deliver(result)
    }
}
