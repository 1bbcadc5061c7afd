use bevy::prelude::*;
use bytemuck::{Pod, Zeroable};
use derive_more::derive::From;

/// A vertex of the emitted terrain surface.
///
/// Position only: normals, texture coordinates and materials are populated
/// by the surrounding renderer from the same positions.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, From)]
pub struct TerrainVertex {
    pub position: [f32; 3],
}

impl From<Vec3> for TerrainVertex {
    fn from(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
        }
    }
}

/// The per-view triangle list produced by the triangulator, refilled every
/// frame and handed to the rasterizer as raw vertex and index data.
#[derive(Default)]
pub struct TerrainMesh {
    vertices: Vec<TerrainVertex>,
    triangles: Vec<[u32; 3]>,
}

impl TerrainMesh {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.triangles.clear();
    }

    pub fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        let start = self.vertices.len() as u32;
        self.vertices.push(a.into());
        self.vertices.push(b.into());
        self.vertices.push(c.into());
        self.triangles.push([start, start + 1, start + 2]);
    }

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// The vertex buffer as bytes, ready for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// The index buffer as bytes, ready for upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangles_index_their_own_vertices() {
        let mut mesh = TerrainMesh::default();
        mesh.push_triangle(Vec3::ZERO, Vec3::X, Vec3::Z);
        mesh.push_triangle(Vec3::X, Vec3::ONE, Vec3::Z);

        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangles()[1], [3, 4, 5]);
        assert_eq!(mesh.vertices()[4], TerrainVertex::from(Vec3::ONE));

        assert_eq!(mesh.vertex_bytes().len(), 6 * 12);
        assert_eq!(mesh.index_bytes().len(), 2 * 12);

        mesh.clear();
        assert!(mesh.is_empty());
    }
}
