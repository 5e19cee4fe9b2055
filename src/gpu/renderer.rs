//! Offscreen wgpu renderer.
//!
//! Every [`Renderer::render`] collects the scene into a draw list, draws it
//! into an `Rgba16Float` target with a depth buffer and copies the result back
//! into the CPU [`Frame`], still in linear light. Vertex and index buffers are
//! kept per geometry id between frames and dropped once a frame no longer
//! uses them; instance and material data is uploaded fresh every frame.

use std::{collections::HashMap, iter, time::Duration};

use anyhow::{Context, anyhow};
use cgmath::Matrix4;
use image::Rgba;
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        color::Color,
        geometry::Geometry,
        instance::InstanceRaw,
        material::{Material, MaterialKind},
        scene_graph::{Background, Object3d, Scene3d},
    },
    gpu::{
        context::GpuContext,
        pipelines::{
            self, CameraUniform, DEPTH_FORMAT, DrawUniform, GpuVertex, HDR_FORMAT, InstanceTint,
            LightUniform, PipelineKey,
        },
    },
    render::{DrawItem, Encoding, Frame, Renderer, collect_draws},
};

const BYTES_PER_PIXEL: u32 = 8;

struct GeometryBuffers {
    vertex: wgpu::Buffer,
    index: Option<wgpu::Buffer>,
    count: u32,
    used: bool,
}

struct Targets {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Per-frame resources of one draw item.
struct PreparedDraw {
    key: PipelineKey,
    geometry: u64,
    instances: wgpu::Buffer,
    tints: wgpu::Buffer,
    instance_count: u32,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuRenderer {
    ctx: GpuContext,
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    frame_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    geometries: HashMap<u64, GeometryBuffers>,
    targets: Option<Targets>,
    size: (u32, u32),
    frame: Frame,
}

impl WgpuRenderer {
    pub fn new(ctx: GpuContext, width: u32, height: u32) -> Self {
        let device = &ctx.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let frame_layout = pipelines::mk_frame_bind_group_layout(device);
        let draw_layout = pipelines::mk_draw_bind_group_layout(device);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout],
            immediate_size: 0,
        });
        Self {
            shader,
            layout,
            frame_layout,
            draw_layout,
            pipelines: HashMap::new(),
            geometries: HashMap::new(),
            targets: None,
            size: (width.max(1), height.max(1)),
            frame: Frame::new(width, height),
            ctx,
        }
    }

    /// Create a context on the default adapter and a renderer on top of it.
    pub fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        let ctx = futures::executor::block_on(GpuContext::new_headless())?;
        Ok(Self::new(ctx, width, height))
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Geometries with buffers currently resident on the GPU.
    pub fn cached_geometries(&self) -> usize {
        self.geometries.len()
    }

    fn ensure_targets(&mut self) {
        let (width, height) = self.size;
        if self
            .targets
            .as_ref()
            .is_some_and(|t| (t.width, t.height) == (width, height))
        {
            return;
        }
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = |label, format, usage| {
            self.ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let color = texture(
            "hdr_target",
            HDR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth = texture("depth_texture", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);
        log::debug!("Allocated {}x{} render targets", width, height);
        self.targets = Some(Targets {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            width,
            height,
        });
    }

    fn upload_geometry(&mut self, geometry: &Geometry) {
        if let Some(buffers) = self.geometries.get_mut(&geometry.id()) {
            buffers.used = true;
            return;
        }
        let white = [1.0, 1.0, 1.0];
        let vertices: Vec<GpuVertex> = geometry
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| GpuVertex {
                position: *position,
                normal: geometry.normals.get(i).copied().unwrap_or([0.0; 3]),
                color: geometry
                    .colors
                    .as_ref()
                    .and_then(|c| c.get(i).copied())
                    .unwrap_or(white),
            })
            .collect();
        let device = &self.ctx.device;
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = geometry.indices.as_ref().map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let count = geometry
            .indices
            .as_ref()
            .map_or(vertices.len(), Vec::len) as u32;
        self.geometries.insert(
            geometry.id(),
            GeometryBuffers {
                vertex,
                index,
                count,
                used: true,
            },
        );
    }

    fn prepare(&mut self, item: &DrawItem, transparent: bool) -> Option<PreparedDraw> {
        if item.geometry.positions.is_empty() || item.instances.is_empty() {
            return None;
        }
        self.upload_geometry(&item.geometry);

        let device = &self.ctx.device;
        let raw: Vec<InstanceRaw> = item.instances.iter().map(InstanceRaw::from_matrix).collect();
        let tints: Vec<InstanceTint> = match &item.instance_colors {
            Some(colors) => (0..raw.len())
                .map(|i| InstanceTint {
                    color: colors.get(i).copied().unwrap_or(Color::WHITE).to_array(),
                })
                .collect(),
            None => vec![InstanceTint { color: [1.0; 3] }; raw.len()],
        };
        let instances = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&raw),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tints = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Tint Buffer"),
            contents: bytemuck::cast_slice(&tints),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Buffer"),
            contents: bytemuck::cast_slice(&[draw_uniform(&item.material)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
            label: Some("draw_bind_group"),
        });

        let key = PipelineKey {
            topology: item.geometry.topology,
            blend: transparent,
            depth_test: item.material.depth_test,
        };
        if !self.pipelines.contains_key(&key) {
            let pipeline = pipelines::mk_render_pipeline(device, &self.layout, &self.shader, key);
            self.pipelines.insert(key, pipeline);
        }

        Some(PreparedDraw {
            key,
            geometry: item.geometry.id(),
            instances,
            tints,
            instance_count: raw.len() as u32,
            bind_group,
        })
    }

    /// Copy the colour target into the CPU frame.
    fn read_back(&mut self, encoder: wgpu::CommandEncoder) -> anyhow::Result<()> {
        let targets = self.targets.as_ref().context("Render targets missing")?;
        let (width, height) = (targets.width, targets.height);
        let unpadded = width * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let output_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            label: Some("Readback Buffer"),
            mapped_at_creation: false,
        });
        let mut encoder = encoder;
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &targets.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| anyhow!("GPU poll failed: {e:?}"))?;
        futures::executor::block_on(rx.receive())
            .context("Readback channel closed")?
            .context("Could not map the readback buffer")?;

        {
            let data = buffer_slice.get_mapped_range();
            self.frame.resize(width, height);
            for (y, row) in data.chunks(padded as usize).enumerate().take(height as usize) {
                for x in 0..width as usize {
                    let texel = &row[x * BYTES_PER_PIXEL as usize..(x + 1) * BYTES_PER_PIXEL as usize];
                    let channel = |c: usize| half::f16::from_le_bytes([texel[2 * c], texel[2 * c + 1]]).to_f32();
                    self.frame.pixels.put_pixel(
                        x as u32,
                        y as u32,
                        Rgba([channel(0), channel(1), channel(2), channel(3)]),
                    );
                }
            }
        }
        output_buffer.unmap();
        self.frame.encoding = Encoding::Linear;
        Ok(())
    }
}

fn draw_uniform(material: &Material) -> DrawUniform {
    let (lit, metalness, roughness) = match material.kind {
        MaterialKind::Standard {
            metalness,
            roughness,
        } => (1.0, metalness, roughness),
        MaterialKind::Basic | MaterialKind::Line { .. } => (0.0, 0.0, 1.0),
    };
    let env = material
        .env_map
        .as_ref()
        .map(|env| env.radiance(roughness).scale(material.env_map_intensity))
        .unwrap_or(Color::BLACK);
    DrawUniform {
        color: [material.color.r, material.color.g, material.color.b, material.opacity],
        params: [lit, metalness, roughness, if material.vertex_colors { 1.0 } else { 0.0 }],
        env: [env.r, env.g, env.b, 1.0],
    }
}

fn clear_color(scene: &Scene3d) -> Color {
    match &scene.settings().background {
        Some(Background::Color(color)) => *color,
        Some(Background::Environment(env)) => env.radiance(0.0),
        None => Color::BLACK,
    }
}

impl Renderer for WgpuRenderer {
    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn render(&mut self, scene: &Scene3d, camera: &Object3d) -> anyhow::Result<()> {
        let projection = camera
            .camera()
            .with_context(|| format!("{} is not a camera", camera.name()))?
            .projection_matrix();
        let view_proj: Matrix4<f32> = projection * camera.view_matrix();

        self.ensure_targets();
        for buffers in self.geometries.values_mut() {
            buffers.used = false;
        }

        let list = collect_draws(scene, camera);
        let mut draws = Vec::with_capacity(list.draw_count());
        for item in &list.opaque {
            draws.extend(self.prepare(item, false));
        }
        for item in &list.transparent {
            draws.extend(self.prepare(item, true));
        }
        for item in &list.lines {
            draws.extend(self.prepare(item, true));
        }
        let before = self.geometries.len();
        self.geometries.retain(|_, buffers| buffers.used);
        if self.geometries.len() != before {
            log::debug!("Released {} unused geometries", before - self.geometries.len());
        }

        let device = &self.ctx.device;
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform::new(view_proj, camera.world_position())]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let fog = scene.settings().fog;
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[LightUniform::from_lights(&list.lights, fog)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
            label: Some("frame_bind_group"),
        });

        let targets = self.targets.as_ref().context("Render targets missing")?;
        let background = clear_color(scene);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: background.r as f64,
                            g: background.g as f64,
                            b: background.b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            render_pass.set_bind_group(0, &frame_bind_group, &[]);
            for draw in &draws {
                let (Some(pipeline), Some(buffers)) =
                    (self.pipelines.get(&draw.key), self.geometries.get(&draw.geometry))
                else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &draw.bind_group, &[]);
                render_pass.set_vertex_buffer(0, buffers.vertex.slice(..));
                render_pass.set_vertex_buffer(1, draw.instances.slice(..));
                render_pass.set_vertex_buffer(2, draw.tints.slice(..));
                match &buffers.index {
                    Some(index) => {
                        render_pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..buffers.count, 0, 0..draw.instance_count);
                    }
                    None => render_pass.draw(0..buffers.count, 0..draw.instance_count),
                }
            }
        }
        self.read_back(encoder)
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}
