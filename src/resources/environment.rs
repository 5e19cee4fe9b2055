//! Environment generation and the cache that memoises it.
//!
//! Turning an equirectangular image into a prefiltered environment is the most
//! expensive thing a scene asks for, and scenes tend to ask for the same few
//! sources. [`EnvironmentCache`] keeps one entry per source key:
//!
//! - `Ready` once the texture exists; later requests get the same `Rc`
//! - `Loading` while the first request is still in flight; concurrent requests
//!   await the same shared future instead of generating again
//!
//! A failed load drops the in-flight entry so a later request can retry.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
};

use futures::{
    FutureExt,
    future::{LocalBoxFuture, Shared},
};
use image::{Rgba32FImage, imageops};

use crate::{
    data_structures::{
        color::Color,
        scene_graph::{Background, Scene3d},
        texture::{EnvironmentTexture, HdrImage},
    },
    resources::{AssetLoader, default_loader},
};

/// Produces an environment texture from a source image.
pub trait EnvironmentGenerator {
    fn generate(&self, source: &str, image: &HdrImage) -> anyhow::Result<EnvironmentTexture>;
}

/// Box-filtered radiance chain: each level halves the previous one and blurs
/// it, so the last level is close to a diffuse irradiance average.
#[derive(Clone, Copy, Debug)]
pub struct PrefilterGenerator {
    pub levels: usize,
}

impl Default for PrefilterGenerator {
    fn default() -> Self {
        Self { levels: 5 }
    }
}

impl EnvironmentGenerator for PrefilterGenerator {
    fn generate(&self, source: &str, image: &HdrImage) -> anyhow::Result<EnvironmentTexture> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("Environment source {source} is empty");
        }
        let mut levels: Vec<Rgba32FImage> = vec![image.pixels.clone()];
        for _ in 1..self.levels.max(1) {
            let Some(previous) = levels.last() else { break };
            let (w, h) = ((previous.width() / 2).max(1), (previous.height() / 2).max(1));
            let half = imageops::resize(previous, w, h, imageops::FilterType::Triangle);
            levels.push(imageops::blur(&half, 1.0));
        }
        let level_means = levels.iter().map(mean).collect();
        log::debug!("Generated {} environment levels for {}", levels.len(), source);
        Ok(EnvironmentTexture {
            source: source.to_string(),
            levels,
            level_means,
        })
    }
}

fn mean(image: &Rgba32FImage) -> Color {
    let count = (image.width() * image.height()).max(1) as f32;
    let sum = image.pixels().fold([0.0f32; 3], |acc, p| {
        [acc[0] + p.0[0], acc[1] + p.0[1], acc[2] + p.0[2]]
    });
    Color::new(sum[0] / count, sum[1] / count, sum[2] / count)
}

type Pending = Shared<LocalBoxFuture<'static, Result<Rc<EnvironmentTexture>, Rc<anyhow::Error>>>>;

enum Entry {
    Ready(Rc<EnvironmentTexture>),
    Loading(Pending),
}

struct CacheInner {
    loader: Rc<dyn AssetLoader>,
    generator: Rc<dyn EnvironmentGenerator>,
    entries: RefCell<HashMap<String, Entry>>,
    generations: Cell<usize>,
}

/// Shared handle to an environment cache.
#[derive(Clone)]
pub struct EnvironmentCache(Rc<CacheInner>);

thread_local! {
    static GLOBAL: RefCell<Option<EnvironmentCache>> = const { RefCell::new(None) };
}

impl EnvironmentCache {
    pub fn new(loader: Rc<dyn AssetLoader>, generator: Rc<dyn EnvironmentGenerator>) -> Self {
        Self(Rc::new(CacheInner {
            loader,
            generator,
            entries: RefCell::default(),
            generations: Cell::new(0),
        }))
    }

    /// The cache shared by everything on this thread that was not handed one
    /// explicitly. Created on first use around [`default_loader`].
    pub fn global() -> Self {
        GLOBAL.with(|global| {
            global
                .borrow_mut()
                .get_or_insert_with(|| {
                    Self::new(default_loader(), Rc::new(PrefilterGenerator::default()))
                })
                .clone()
        })
    }

    /// Replace the thread's shared cache.
    pub fn set_global(cache: EnvironmentCache) {
        GLOBAL.with(|global| *global.borrow_mut() = Some(cache));
    }

    /// How many times the generator ran.
    pub fn generations(&self) -> usize {
        self.0.generations.get()
    }

    pub fn is_ready(&self, key: &str) -> bool {
        matches!(self.0.entries.borrow().get(key), Some(Entry::Ready(_)))
    }

    /// The texture for `key`, generating it on first use.
    pub fn resolve(&self, key: &str) -> LocalBoxFuture<'static, anyhow::Result<Rc<EnvironmentTexture>>> {
        let pending = match self.0.entries.borrow().get(key) {
            Some(Entry::Ready(texture)) => {
                log::info!("Environment {} reused", key);
                let texture = texture.clone();
                return async move { Ok(texture) }.boxed_local();
            }
            Some(Entry::Loading(pending)) => Some(pending.clone()),
            None => None,
        };
        let pending = pending.unwrap_or_else(|| {
            let pending = self.start(key);
            self.0
                .entries
                .borrow_mut()
                .insert(key.to_string(), Entry::Loading(pending.clone()));
            pending
        });
        async move { pending.await.map_err(|e| anyhow::anyhow!("{:#}", e)) }.boxed_local()
    }

    fn start(&self, key: &str) -> Pending {
        let load = self.0.loader.load_equirect(key);
        let weak: Weak<CacheInner> = Rc::downgrade(&self.0);
        let key = key.to_string();
        async move {
            let generated = match load.await {
                Ok(image) => match weak.upgrade() {
                    Some(inner) => {
                        inner.generations.set(inner.generations.get() + 1);
                        inner.generator.generate(&key, &image)
                    }
                    None => Err(anyhow::anyhow!("Environment cache dropped while loading {key}")),
                },
                Err(e) => Err(e),
            };
            let Some(inner) = weak.upgrade() else {
                return generated.map(Rc::new).map_err(Rc::new);
            };
            match generated {
                Ok(texture) => {
                    let texture = Rc::new(texture);
                    inner
                        .entries
                        .borrow_mut()
                        .insert(key.clone(), Entry::Ready(texture.clone()));
                    log::info!("Environment {} generated", key);
                    Ok(texture)
                }
                Err(e) => {
                    log::error!("Environment {} failed: {:#}", key, e);
                    inner.entries.borrow_mut().remove(&key);
                    Err(Rc::new(e))
                }
            }
        }
        .boxed_local()
        .shared()
    }

    /// Resolve `key` and install the result into `scene`. Failures are logged
    /// and leave the scene untouched.
    pub async fn request(&self, key: &str, scene: &Scene3d, background: bool) -> Option<Rc<EnvironmentTexture>> {
        match self.resolve(key).await {
            Ok(texture) => {
                Self::apply(scene, &texture, background);
                Some(texture)
            }
            Err(e) => {
                log::error!("Could not apply environment {}: {:#}", key, e);
                None
            }
        }
    }

    /// Set the scene environment (and optionally its background), then hand
    /// the texture to every material that can reflect it.
    pub fn apply(scene: &Scene3d, texture: &Rc<EnvironmentTexture>, background: bool) {
        {
            let mut settings = scene.settings_mut();
            settings.environment = Some(texture.clone());
            if background {
                settings.background = Some(Background::Environment(texture.clone()));
            }
        }
        scene.traverse(&mut |object| {
            object.with_material_mut(|material| {
                if material.supports_env_map() {
                    material.env_map = Some(texture.clone());
                    material.touch();
                }
            });
        });
    }
}
