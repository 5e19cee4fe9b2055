//! Models loaded from glTF or OBJ files.
//!
//! Loading starts when the model is attached and finishes on a later tick: the
//! loaded content is instantiated beneath the model core by a task running on
//! the viewport's scheduler, so it appears between frames like any other
//! animation step. Until then the model is an empty group that can already be
//! moved around.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use cgmath::Vector3;

use crate::{
    anim::{
        clock::next_frame,
        ease::Ease,
        tween::tween_property,
    },
    data_structures::scene_graph::Object3d,
    nodes::spatial::{Node3d, SpatialNode, Transform},
    reactive::{Channel, Property},
    resources::{AssetLoader, ModelData, default_loader},
    viewport::Viewport,
};

#[derive(Clone)]
pub struct ModelConfig {
    pub transform: Transform,
    /// Path handed to the loader.
    pub src: String,
    /// Defaults to the thread's [`default_loader`].
    pub loader: Option<Rc<dyn AssetLoader>>,
    /// Rotation applied to the loaded content, for models authored facing
    /// another way.
    pub content_rotation: Vector3<f32>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub alpha: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            src: String::new(),
            loader: None,
            content_rotation: Vector3::new(0.0, 0.0, 0.0),
            cast_shadow: false,
            receive_shadow: false,
            alpha: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Clone)]
pub struct Model {
    spatial: SpatialNode,
    src: Rc<str>,
    loader: Rc<dyn AssetLoader>,
    content_rotation: Vector3<f32>,
    shadows: (bool, bool),
    content: Rc<RefCell<Option<Object3d>>>,
    state: Rc<Cell<LoadState>>,
    opacity: Property<f32>,
}

impl Model {
    pub fn new(config: ModelConfig) -> Self {
        let content: Rc<RefCell<Option<Object3d>>> = Rc::default();
        let opacity = {
            let content = content.clone();
            Property::new(Channel::Opacity, config.alpha, move |v| {
                if let Some(object) = content.borrow().as_ref() {
                    set_tree_opacity(object, v);
                }
            })
        };
        Self {
            spatial: SpatialNode::new(Object3d::group().named(config.src.clone()), config.transform),
            src: config.src.into(),
            loader: config.loader.unwrap_or_else(default_loader),
            content_rotation: config.content_rotation,
            shadows: (config.cast_shadow, config.receive_shadow),
            content,
            state: Rc::new(Cell::new(LoadState::Idle)),
            opacity,
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.get() == LoadState::Loaded
    }

    /// The instantiated model, once loaded.
    pub fn content(&self) -> Option<Object3d> {
        self.content.borrow().clone()
    }

    pub fn opacity(&self) -> &Property<f32> {
        &self.opacity
    }

    /// Wait until the load settled. Returns whether content arrived.
    pub async fn until_loaded(&self) -> bool {
        loop {
            match self.state.get() {
                LoadState::Loaded => return true,
                LoadState::Failed => return false,
                LoadState::Idle | LoadState::Loading => next_frame().await,
            }
        }
    }

    fn install(&self, data: &ModelData) {
        let object = data.instantiate();
        object.set_rotation(self.content_rotation);
        let (cast, receive) = self.shadows;
        object.traverse(&mut |o| {
            let mut d = o.data_mut();
            d.cast_shadow = cast;
            d.receive_shadow = receive;
        });
        self.spatial.core().add(&object);
        *self.content.borrow_mut() = Some(object);
        if self.opacity.get() < 1.0 {
            self.opacity.sync();
        }
        self.state.set(LoadState::Loaded);
    }

    pub async fn opacity_to(&self, value: f32, duration: f32, ease: Ease) {
        tween_property(&self.opacity, value, duration, ease).await
    }

    pub async fn fade_in(&self, duration: f32, ease: Ease) {
        self.opacity_to(1.0, duration, ease).await
    }

    pub async fn fade_out(&self, duration: f32, ease: Ease) {
        self.opacity_to(0.0, duration, ease).await
    }
}

fn set_tree_opacity(root: &Object3d, opacity: f32) {
    root.traverse(&mut |object| {
        object.with_material_mut(|m| m.set_opacity(opacity));
    });
}

impl Node3d for Model {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }

    fn on_attach(&self, viewport: &Viewport) {
        self.state.set(LoadState::Loading);
        let load = self.loader.load_model(&self.src);
        let model = self.clone();
        viewport.spawn(async move {
            match load.await {
                Ok(data) => {
                    model.install(&data);
                    log::info!("Model {} loaded", model.src);
                }
                Err(e) => {
                    model.state.set(LoadState::Failed);
                    log::error!("Could not load model {}: {:#}", model.src, e);
                }
            }
        });
    }
}

impl std::ops::Deref for Model {
    type Target = SpatialNode;

    fn deref(&self) -> &SpatialNode {
        &self.spatial
    }
}
