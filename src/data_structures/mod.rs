//! Scene data: the object graph and what hangs off it.
//!
//! - `scene_graph` holds the shared object handles, scenes and light data
//! - `geometry` and `material` describe what a mesh draws
//! - `instance` holds per-instance transforms for instanced meshes
//! - `curve` samples Catmull-Rom curves for lines
//! - `texture` holds decoded HDR images and prefiltered environments
//! - `color` converts between hex, sRGB and linear colours

pub mod color;
pub mod curve;
pub mod geometry;
pub mod instance;
pub mod material;
pub mod scene_graph;
pub mod texture;
