//! Headless wgpu backend.
//!
//! - `context`: device and queue without a surface
//! - `pipelines`: vertex layouts, uniforms and the pipeline factory
//! - `renderer`: [`WgpuRenderer`], a [`crate::render::Renderer`] drawing into
//!   an offscreen HDR target that is read back after every frame

pub mod context;
pub mod pipelines;
pub mod renderer;

pub use context::GpuContext;
pub use renderer::WgpuRenderer;
