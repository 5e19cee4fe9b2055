//! Non-drawing containers.

use std::ops::Deref;

use crate::{
    data_structures::scene_graph::Object3d,
    nodes::spatial::{Node3d, SpatialNode, Transform},
};

/// A spatial node whose core is a bare group. Besides composing child nodes
/// it can hold loose graph objects directly.
#[derive(Clone)]
pub struct Group(SpatialNode);

impl Group {
    pub fn new(transform: Transform) -> Self {
        Self(SpatialNode::new(Object3d::group().named("group"), transform))
    }

    /// Detach a graph object from this group's core.
    pub fn remove(&self, object: &Object3d) -> bool {
        self.0.core().remove(object)
    }

    /// Detach every graph object from this group's core, attached child
    /// nodes included.
    pub fn clear(&self) {
        self.0.core().clear();
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new(Transform::default())
    }
}

impl Deref for Group {
    type Target = SpatialNode;

    fn deref(&self) -> &SpatialNode {
        &self.0
    }
}

impl Node3d for Group {
    fn spatial(&self) -> &SpatialNode {
        &self.0
    }
}
