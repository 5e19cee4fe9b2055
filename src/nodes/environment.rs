//! Scene environment from an equirectangular image.

use std::{cell::RefCell, rc::Rc};

use crate::{
    data_structures::{scene_graph::Object3d, texture::EnvironmentTexture},
    nodes::spatial::{Node3d, SpatialNode, Transform},
    resources::environment::EnvironmentCache,
    viewport::Viewport,
};

#[derive(Clone)]
pub struct EnvMapConfig {
    pub src: String,
    /// Also show the environment as the scene background.
    pub background: bool,
    /// Defaults to [`EnvironmentCache::global`].
    pub cache: Option<EnvironmentCache>,
}

impl Default for EnvMapConfig {
    fn default() -> Self {
        Self {
            src: String::new(),
            background: false,
            cache: None,
        }
    }
}

/// Requests its environment from the cache when attached and installs it on
/// the viewport's scene once it is ready.
#[derive(Clone)]
pub struct EnvMap {
    spatial: SpatialNode,
    src: Rc<str>,
    background: bool,
    cache: EnvironmentCache,
    texture: Rc<RefCell<Option<Rc<EnvironmentTexture>>>>,
}

impl EnvMap {
    pub fn new(config: EnvMapConfig) -> Self {
        Self {
            spatial: SpatialNode::new(Object3d::group().named("environment"), Transform::default()),
            src: config.src.into(),
            background: config.background,
            cache: config.cache.unwrap_or_else(EnvironmentCache::global),
            texture: Rc::default(),
        }
    }

    /// The installed texture, once the request finished.
    pub fn texture(&self) -> Option<Rc<EnvironmentTexture>> {
        self.texture.borrow().clone()
    }

    pub fn is_applied(&self) -> bool {
        self.texture.borrow().is_some()
    }
}

impl Node3d for EnvMap {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }

    fn on_attach(&self, viewport: &Viewport) {
        let scene = viewport.scene().clone();
        let env = self.clone();
        viewport.spawn(async move {
            let texture = env.cache.request(&env.src, &scene, env.background).await;
            *env.texture.borrow_mut() = texture;
        });
    }
}
