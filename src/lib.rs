//! stage3d
//!
//! A 3D scene bridge for 2D-hosted, coroutine-animated scenes. Components are
//! plain handles wrapping nodes of a retained 3D graph; every animatable field
//! is a reactive property, and animations are ordinary futures driven one
//! frame at a time by a deterministic scheduler. A viewport renders the graph
//! into a 2D canvas and projects world points back to canvas space so 2D
//! labels can follow 3D objects.
//!
//! High-level modules
//! - `anim`: frame clock, scheduler, easing, tweens and composition helpers
//! - `canvas`: the 2D surface viewports and labels draw into
//! - `config`: viewport, post-processing and stage configuration
//! - `data_structures`: the 3D object graph, geometry, materials and textures
//! - `flow`: the stage driver running a script frame by frame
//! - `nodes`: cameras, meshes, lines, models, lights, instancing and labels
//! - `reactive`: signals and channel-tagged properties
//! - `render`: the renderer seam and draw-list collection
//! - `resources`: asset loading and the environment cache
//! - `viewport`: rendering and world-to-screen projection
//! - `gpu` (feature `gpu`): a headless wgpu renderer
//!

pub mod anim;
pub mod canvas;
pub mod config;
pub mod data_structures;
pub mod flow;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod nodes;
pub mod postprocess;
pub mod reactive;
pub mod render;
pub mod resources;
pub mod viewport;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
