//! Mesh sources arrive as a single interleaved vertex buffer plus a flat
//! triangle index list, the way the rasterization side already stores them.
//! Attributes are located by byte offset inside each vertex; positions and
//! normals are three `f32`s, texcoords (optional) are two.

use std::mem::size_of;

use bytemuck::pod_read_unaligned;

use crate::{
    SourceError,
    geometry::{Vec2, Vec3, Vec3i},
};

const VEC3_BYTES: usize = size_of::<[f32; 3]>();
const VEC2_BYTES: usize = size_of::<[f32; 2]>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: usize,
    pub position_offset: usize,
    pub normal_offset: usize,
    pub texcoord_offset: Option<usize>,
}

impl VertexLayout {
    /// position followed by normal, nothing else
    pub const POSITION_NORMAL: VertexLayout = VertexLayout {
        stride: 2 * VEC3_BYTES,
        position_offset: 0,
        normal_offset: VEC3_BYTES,
        texcoord_offset: None,
    };

    fn check(&self) -> Result<(), SourceError> {
        if self.stride < VEC3_BYTES {
            return Err(SourceError::StrideTooSmall { stride: self.stride });
        }

        let attributes = [
            ("position", Some(self.position_offset), VEC3_BYTES),
            ("normal", Some(self.normal_offset), VEC3_BYTES),
            ("texcoord", self.texcoord_offset, VEC2_BYTES),
        ];
        for (attribute, offset, size) in attributes {
            if let Some(offset) = offset {
                if offset + size > self.stride {
                    return Err(SourceError::AttributeOutsideStride {
                        attribute,
                        offset,
                        stride: self.stride,
                    });
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InterleavedMesh {
    vertex_data: Vec<u8>,
    vertex_count: usize,
    layout: VertexLayout,
    indices: Vec<u32>,
}

impl InterleavedMesh {
    pub fn new(
        vertex_data: Vec<u8>,
        vertex_count: usize,
        layout: VertexLayout,
        indices: Vec<u32>,
    ) -> Result<InterleavedMesh, SourceError> {
        layout.check()?;

        let expected = vertex_count * layout.stride;
        if vertex_data.len() < expected {
            return Err(SourceError::VertexBufferTooShort {
                vertex_count,
                expected,
                actual: vertex_data.len(),
            });
        }

        if indices.len() % 3 != 0 {
            return Err(SourceError::Untriangulated(indices.len()));
        }

        if let Some((i, &index)) = indices
            .iter()
            .enumerate()
            .find(|(_, index)| **index as usize >= vertex_count)
        {
            return Err(SourceError::IndexOutOfRange {
                triangle: i / 3,
                index,
                vertex_count,
            });
        }

        Ok(InterleavedMesh {
            vertex_data,
            vertex_count,
            layout,
            indices,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn has_texcoords(&self) -> bool {
        self.layout.texcoord_offset.is_some()
    }

    fn attribute<T: bytemuck::Pod>(&self, vertex: usize, offset: usize) -> T {
        let start = vertex * self.layout.stride + offset;
        pod_read_unaligned(&self.vertex_data[start..start + size_of::<T>()])
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        self.attribute::<[f32; 3]>(vertex, self.layout.position_offset).into()
    }

    pub fn normal(&self, vertex: usize) -> Vec3 {
        self.attribute::<[f32; 3]>(vertex, self.layout.normal_offset).into()
    }

    /// Texcoord of a vertex, zero when the source carries none
    pub fn texcoord(&self, vertex: usize) -> Vec2 {
        match self.layout.texcoord_offset {
            Some(offset) => self.attribute::<[f32; 2]>(vertex, offset).into(),
            None => Vec2::zero(),
        }
    }

    pub fn triangle(&self, triangle: usize) -> Vec3i {
        let t = &self.indices[triangle * 3..triangle * 3 + 3];
        Vec3i(t[0] as i32, t[1] as i32, t[2] as i32)
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.vertex_count).map(|i| self.position(i))
    }

    pub fn normals(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.vertex_count).map(|i| self.normal(i))
    }

    pub fn texcoords(&self) -> impl Iterator<Item = Vec2> + '_ {
        (0..self.vertex_count).map(|i| self.texcoord(i))
    }

    pub fn triangles(&self) -> impl Iterator<Item = Vec3i> + '_ {
        (0..self.triangle_count()).map(|t| self.triangle(t))
    }

    /// Axis-aligned unit cube centered on the origin, one normal per face
    pub fn unit_cube() -> InterleavedMesh {
        let faces = [
            (Vec3(1.0, 0.0, 0.0), Vec3(0.0, 1.0, 0.0), Vec3(0.0, 0.0, 1.0)),
            (Vec3(-1.0, 0.0, 0.0), Vec3(0.0, 0.0, 1.0), Vec3(0.0, 1.0, 0.0)),
            (Vec3(0.0, 1.0, 0.0), Vec3(0.0, 0.0, 1.0), Vec3(1.0, 0.0, 0.0)),
            (Vec3(0.0, -1.0, 0.0), Vec3(1.0, 0.0, 0.0), Vec3(0.0, 0.0, 1.0)),
            (Vec3(0.0, 0.0, 1.0), Vec3(1.0, 0.0, 0.0), Vec3(0.0, 1.0, 0.0)),
            (Vec3(0.0, 0.0, -1.0), Vec3(0.0, 1.0, 0.0), Vec3(1.0, 0.0, 0.0)),
        ];

        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, a, b) in faces {
            let base = positions.len() as u32;
            let center = n * 0.5;
            for (sa, sb) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                positions.push(center + a * sa + b * sb);
                normals.push(n);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let mut vertex_data = Vec::with_capacity(positions.len() * VertexLayout::POSITION_NORMAL.stride);
        for (p, n) in positions.iter().zip(&normals) {
            vertex_data.extend_from_slice(bytemuck::bytes_of(p));
            vertex_data.extend_from_slice(bytemuck::bytes_of(n));
        }

        // 24 vertices, 12 triangles, all indices below 24
        InterleavedMesh {
            vertex_data,
            vertex_count: positions.len(),
            layout: VertexLayout::POSITION_NORMAL,
            indices,
        }
    }
}
