//! Instance transformation data for instanced draws.
//!
//! Per-instance data like position, rotation, and scale is composed into a
//! model matrix. Batches keep the matrices on the CPU; the GPU backend packs
//! them into [`InstanceRaw`] buffers for a single instanced draw call.

use cgmath::{Matrix, Matrix3, Matrix4, One, Quaternion, Rad, SquareMatrix, Vector3};

/// Per-instance transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Instance {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Build from an XYZ Euler rotation in radians.
    pub fn from_euler(position: Vector3<f32>, euler: Vector3<f32>, scale: Vector3<f32>) -> Self {
        Self {
            position,
            rotation: euler_to_quaternion(euler),
            scale,
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw::from_matrix(&self.to_matrix())
    }
}

impl From<Vector3<f32>> for Instance {
    fn from(position: Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/// XYZ Euler order, i.e. the rotation matrix is `Rx * Ry * Rz`.
pub fn euler_to_quaternion(euler: Vector3<f32>) -> Quaternion<f32> {
    Quaternion::from(cgmath::Euler::new(Rad(euler.x), Rad(euler.y), Rad(euler.z)))
}

/**
 * The raw instance is the actual data stored on the GPU: the model matrix, the
 * normal matrix (inverse transpose of the upper 3x3) and the handedness sign so
 * mirrored instances keep their winding.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 3]; 3],
    pub handedness: f32,
}

impl InstanceRaw {
    pub fn from_matrix(matrix: &Matrix4<f32>) -> Self {
        let upper = Matrix3::from_cols(
            matrix.x.truncate(),
            matrix.y.truncate(),
            matrix.z.truncate(),
        );
        let det = upper.determinant();
        let normal = upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or_else(Matrix3::identity);
        InstanceRaw {
            model: (*matrix).into(),
            normal: normal.into(),
            handedness: if det < 0.0 { -1.0 } else { 1.0 },
        }
    }
}

#[cfg(feature = "gpu")]
impl InstanceRaw {
    /**
     * Stride layout: the model matrix as four vec4s, then the normal matrix as
     * three vec3s, then the handedness scalar.
     */
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        const ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x3,
            10 => Float32x3,
            11 => Float32x3,
            12 => Float32,
        ];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // advance once per instance rather than per vertex
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Transform;

    use super::*;

    #[test]
    fn translation_only_matrix_moves_points() {
        let instance = Instance::from(Vector3::new(1.0, 2.0, 3.0));
        let p = instance
            .to_matrix()
            .transform_point(cgmath::Point3::new(0.0, 0.0, 0.0));
        assert_eq!(p, cgmath::Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn mirrored_instance_flips_handedness() {
        let instance = Instance {
            scale: Vector3::new(-1.0, 1.0, 1.0),
            ..Default::default()
        };
        assert_eq!(instance.to_raw().handedness, -1.0);
        assert_eq!(Instance::new().to_raw().handedness, 1.0);
    }
}
