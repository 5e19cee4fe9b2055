//! Vertex layouts, uniform blocks and the pipeline factory shared by every
//! draw the renderer issues.

use std::mem;

use cgmath::{Matrix4, Vector3};

use crate::{
    data_structures::{
        color::Color,
        geometry::Topology,
        instance::InstanceRaw,
        scene_graph::{Fog, LightKind},
    },
    render::LightItem,
};

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Lights beyond this many point and directional lights are dropped.
pub const MAX_LIGHTS: usize = 4;

// Camera projections are OpenGL style with z in [-1, 1]; wgpu wants [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl GpuVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Per-instance tint, stepped alongside [`InstanceRaw`].
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceTint {
    pub color: [f32; 3],
}

impl InstanceTint {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![13 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceTint>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn new(view_proj: Matrix4<f32>, eye: Vector3<f32>) -> Self {
        Self {
            view_proj: (OPENGL_TO_WGPU_MATRIX * view_proj).into(),
            eye: eye.extend(1.0).into(),
        }
    }
}

/// One point, spot or directional light.
///
/// `position.w` is 1 for positional lights, `direction.w` carries their range
/// (0 for unlimited) and `color.w` their decay exponent. Spot lights set
/// `cone` to the cosines of the outer and inner angle and `cone.z` to 1.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub color: [f32; 4],
    pub cone: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub ambient: [f32; 4],
    pub sky: [f32; 4],
    pub ground: [f32; 4],
    pub fog_color: [f32; 4],
    /// near, far, enabled flag, unused
    pub fog_range: [f32; 4],
    pub count: [u32; 4],
    pub lights: [GpuLight; MAX_LIGHTS],
}

impl LightUniform {
    /// Fold ambient and hemisphere lights into flat terms and keep the first
    /// [`MAX_LIGHTS`] point and directional lights.
    pub fn from_lights(items: &[LightItem], fog: Option<Fog>) -> Self {
        let mut uniform = Self::default();
        let add = |slot: &mut [f32; 4], color: Color| {
            slot[0] += color.r;
            slot[1] += color.g;
            slot[2] += color.b;
        };
        let mut count = 0;
        for item in items {
            let radiance = item.color.scale(item.intensity);
            match item.kind {
                LightKind::Ambient => add(&mut uniform.ambient, radiance),
                LightKind::Hemisphere { ground } => {
                    add(&mut uniform.sky, radiance);
                    add(&mut uniform.ground, ground.scale(item.intensity));
                }
                LightKind::Directional | LightKind::Point { .. } | LightKind::Spot { .. }
                    if count == MAX_LIGHTS =>
                {
                    log::debug!("Dropping {:?} light, only {} are supported.", item.kind, MAX_LIGHTS);
                }
                LightKind::Directional => {
                    uniform.lights[count] = GpuLight {
                        position: item.position.extend(0.0).into(),
                        direction: item.direction.extend(0.0).into(),
                        color: [radiance.r, radiance.g, radiance.b, 1.0],
                        cone: [0.0; 4],
                    };
                    count += 1;
                }
                LightKind::Point { distance, decay } => {
                    uniform.lights[count] = GpuLight {
                        position: item.position.extend(1.0).into(),
                        direction: item.direction.extend(distance).into(),
                        color: [radiance.r, radiance.g, radiance.b, decay],
                        cone: [0.0; 4],
                    };
                    count += 1;
                }
                LightKind::Spot {
                    distance,
                    angle,
                    penumbra,
                    decay,
                } => {
                    let outer = angle.cos();
                    // smoothstep needs distinct edges
                    let inner = (angle * (1.0 - penumbra.clamp(0.0, 1.0))).cos().max(outer + 1e-4);
                    uniform.lights[count] = GpuLight {
                        position: item.position.extend(1.0).into(),
                        direction: item.direction.extend(distance).into(),
                        color: [radiance.r, radiance.g, radiance.b, decay],
                        cone: [outer, inner, 1.0, 0.0],
                    };
                    count += 1;
                }
            }
        }
        uniform.count[0] = count as u32;
        if let Some(fog) = fog {
            uniform.fog_color = [fog.color.r, fog.color.g, fog.color.b, 1.0];
            uniform.fog_range = [fog.near, fog.far, 1.0, 0.0];
        }
        uniform
    }
}

/// Material parameters of one draw.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniform {
    /// rgb and opacity
    pub color: [f32; 4],
    /// lit flag, metalness, roughness, vertex colour flag
    pub params: [f32; 4],
    /// Environment radiance for this roughness, scaled by the map intensity.
    pub env: [f32; 4],
}

pub fn uniform_layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Camera and lights, bound once per frame.
pub fn mk_frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            uniform_layout_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            uniform_layout_entry(1, wgpu::ShaderStages::FRAGMENT),
        ],
        label: Some("frame_bind_group_layout"),
    })
}

/// Material uniforms, bound per draw.
pub fn mk_draw_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[uniform_layout_entry(0, wgpu::ShaderStages::FRAGMENT)],
        label: Some("draw_bind_group_layout"),
    })
}

pub fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
    }
}

/// Everything that differs between the pipelines a frame needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub topology: Topology,
    pub blend: bool,
    pub depth_test: bool,
}

impl PipelineKey {
    /// Transparent triangles blend and leave depth untouched; lines blend so
    /// their opacity animates but still write depth.
    pub fn depth_write(&self) -> bool {
        !self.blend || self.topology != Topology::Triangles
    }
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let blend = if key.blend {
        wgpu::BlendState::ALPHA_BLENDING
    } else {
        wgpu::BlendState::REPLACE
    };
    let strip_index_format = match key.topology {
        Topology::LineStrip => Some(wgpu::IndexFormat::Uint32),
        _ => None,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[GpuVertex::desc(), InstanceRaw::desc(), InstanceTint::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: primitive_topology(key.topology),
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            // planes and open meshes are visible from both sides
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth_write(),
            depth_compare: if key.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(kind: LightKind, intensity: f32) -> LightItem {
        LightItem {
            kind,
            color: Color::WHITE,
            intensity,
            position: Vector3::new(0.0, 1.0, 0.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
            cast_shadow: false,
        }
    }

    #[test]
    fn flat_lights_are_folded() {
        let items = [
            light(LightKind::Ambient, 0.2),
            light(LightKind::Ambient, 0.3),
            light(LightKind::Hemisphere { ground: Color::WHITE }, 0.5),
        ];
        let uniform = LightUniform::from_lights(&items, None);
        assert!((uniform.ambient[0] - 0.5).abs() < 1e-6);
        assert_eq!(uniform.sky[1], 0.5);
        assert_eq!(uniform.ground[2], 0.5);
        assert_eq!(uniform.count[0], 0);
        assert_eq!(uniform.fog_range[2], 0.0);
    }

    #[test]
    fn spot_lights_carry_their_cone() {
        let spot = LightKind::Spot {
            distance: 10.0,
            angle: 0.5,
            penumbra: 0.5,
            decay: 2.0,
        };
        let uniform = LightUniform::from_lights(&[light(spot, 5.0)], None);
        let gpu = uniform.lights[0];
        assert_eq!(uniform.count[0], 1);
        assert_eq!(gpu.position[3], 1.0);
        assert_eq!(gpu.direction, [0.0, -1.0, 0.0, 10.0]);
        assert!((gpu.cone[0] - 0.5f32.cos()).abs() < 1e-6);
        assert!((gpu.cone[1] - 0.25f32.cos()).abs() < 1e-6);
        assert_eq!(gpu.cone[2], 1.0);
    }

    #[test]
    fn surplus_lights_are_dropped() {
        let items: Vec<_> = (0..6).map(|_| light(LightKind::Directional, 1.0)).collect();
        let uniform = LightUniform::from_lights(&items, None);
        assert_eq!(uniform.count[0], MAX_LIGHTS as u32);
    }

    #[test]
    fn lines_keep_writing_depth_while_blending() {
        let line = PipelineKey {
            topology: Topology::LineStrip,
            blend: true,
            depth_test: true,
        };
        let glass = PipelineKey {
            topology: Topology::Triangles,
            ..line
        };
        assert!(line.depth_write());
        assert!(!glass.depth_write());
    }
}
