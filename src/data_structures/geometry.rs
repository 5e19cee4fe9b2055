//! CPU-side geometry buffers and the primitive shapes components build on.

use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{InnerSpace, Vector3};

use crate::data_structures::color::Color;

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    /// Pairs of vertices, one segment each.
    Lines,
    LineStrip,
}

/// Vertex data for one draw call.
///
/// Geometry is immutable once shared; components that need to change their
/// shape (lines) build a fresh one and swap it in. The `id` lets renderers key
/// uploaded buffers.
#[derive(Clone, Debug)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Option<Vec<u32>>,
    pub topology: Topology,
    id: u64,
}

impl Geometry {
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        indices: Option<Vec<u32>>,
        topology: Topology,
    ) -> Self {
        Self {
            positions,
            normals,
            colors: None,
            indices,
            topology,
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// A copy with its own id, for callers that edit shared geometry.
    pub fn duplicate(&self) -> Self {
        Self {
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            ..self.clone()
        }
    }

    pub fn with_colors(mut self, colors: Vec<[f32; 3]>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Axis-aligned box centred at the origin.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (hx, hy, hz) = (width / 2.0, height / 2.0, depth / 2.0);
        // normal, then the two in-plane axes scaled to the half extents
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -hz], [0.0, hy, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, hz], [0.0, hy, 0.0]),
            ([0.0, 1.0, 0.0], [hx, 0.0, 0.0], [0.0, 0.0, -hz]),
            ([0.0, -1.0, 0.0], [hx, 0.0, 0.0], [0.0, 0.0, hz]),
            ([0.0, 0.0, 1.0], [hx, 0.0, 0.0], [0.0, hy, 0.0]),
            ([0.0, 0.0, -1.0], [-hx, 0.0, 0.0], [0.0, hy, 0.0]),
        ];
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let normal = Vector3::from(n);
            let center = Vector3::new(normal.x * hx, normal.y * hy, normal.z * hz);
            let u = Vector3::from(u);
            let v = Vector3::from(v);
            let base = positions.len() as u32;
            for corner in [center - u - v, center + u - v, center + u + v, center - u + v] {
                positions.push(corner.into());
                normals.push(n);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(positions, normals, Some(indices), Topology::Triangles)
    }

    /// UV sphere.
    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        for y in 0..=height_segments {
            let v = y as f32 / height_segments as f32;
            let theta = v * std::f32::consts::PI;
            for x in 0..=width_segments {
                let u = x as f32 / width_segments as f32;
                let phi = u * std::f32::consts::TAU;
                let n = Vector3::new(-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin());
                positions.push((n * radius).into());
                normals.push(n.into());
            }
        }
        let row = width_segments + 1;
        let mut indices = Vec::new();
        for y in 0..height_segments {
            for x in 0..width_segments {
                let a = y * row + x + 1;
                let b = y * row + x;
                let c = (y + 1) * row + x;
                let d = (y + 1) * row + x + 1;
                if y != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if y != height_segments - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }
        Self::new(positions, normals, Some(indices), Topology::Triangles)
    }

    /// Plane in the XZ plane facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hx, hz) = (width / 2.0, depth / 2.0);
        let positions = vec![[-hx, 0.0, hz], [hx, 0.0, hz], [hx, 0.0, -hz], [-hx, 0.0, -hz]];
        let normals = vec![[0.0, 1.0, 0.0]; 4];
        Self::new(positions, normals, Some(vec![0, 1, 2, 0, 2, 3]), Topology::Triangles)
    }

    /// Square grid of lines on the XZ plane. The two centre lines use
    /// `center_color`, every other line uses `line_color`.
    pub fn grid(size: f32, divisions: u32, center_color: Color, line_color: Color) -> Self {
        let divisions = divisions.max(1);
        let step = size / divisions as f32;
        let half = size / 2.0;
        let center = divisions / 2;
        let mut positions = Vec::new();
        let mut colors = Vec::new();
        for i in 0..=divisions {
            let k = -half + i as f32 * step;
            let color = if i == center { center_color } else { line_color };
            positions.push([-half, 0.0, k]);
            positions.push([half, 0.0, k]);
            positions.push([k, 0.0, -half]);
            positions.push([k, 0.0, half]);
            colors.extend(std::iter::repeat_n(color.to_array(), 4));
        }
        let normals = vec![[0.0, 1.0, 0.0]; positions.len()];
        Self::new(positions, normals, None, Topology::Lines).with_colors(colors)
    }

    pub fn line_strip(points: &[Vector3<f32>]) -> Self {
        let positions: Vec<[f32; 3]> = points.iter().map(|p| (*p).into()).collect();
        let normals = vec![[0.0, 1.0, 0.0]; positions.len()];
        Self::new(positions, normals, None, Topology::LineStrip)
    }

    /// Flat normals for triangle soups that arrive without any.
    pub fn compute_normals(&mut self) {
        if self.topology != Topology::Triangles {
            return;
        }
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        let indices: Vec<u32> = match &self.indices {
            Some(indices) => indices.clone(),
            None => (0..self.positions.len() as u32).collect(),
        };
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(pa), Some(pb), Some(pc)) = (
                self.positions.get(a),
                self.positions.get(b),
                self.positions.get(c),
            ) else {
                continue;
            };
            let (pa, pb, pc) = (Vector3::from(*pa), Vector3::from(*pb), Vector3::from(*pc));
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }
}
