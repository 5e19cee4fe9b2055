//! Scene nodes.
//!
//! Every node wraps an [`spatial::SpatialNode`]: a core object that is
//! inserted into the parent and a target object the transform channels move.
//! Nodes are built detached and come alive once the viewport they were added
//! to is initialised, at which point asynchronous content starts loading.
//!
//! - `camera`: perspective and orthographic cameras with zoom and orbit helpers
//! - `environment`: image based lighting through the environment cache
//! - `floor`: tinted floor with a faint mirror on top
//! - `grid`, `group`, `line`, `mesh`: plain geometry nodes
//! - `instanced`: many copies of one model with individually addressable specials
//! - `label`: 2D labels that follow a point in the scene
//! - `lights`: single lights and the default rig
//! - `model`: glTF and OBJ models loaded on attach

pub mod camera;
pub mod environment;
pub mod floor;
pub mod grid;
pub mod group;
pub mod instanced;
pub mod label;
pub mod lights;
pub mod line;
pub mod mesh;
pub mod model;
pub mod spatial;
