//! GPU-side mesh: interleaved vertex buffer, triangle index buffer, and the
//! derived wireframe edge buffer. Created, replaced and destroyed only on
//! the render thread.

use std::collections::HashSet;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages, Device, VertexBufferLayout, VertexStepMode};

use asset::MeshBuffers;

/// Vertex record: position + normal, the only layout the pipelines use.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ModelVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
}

impl ModelVertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<ModelVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
    };
}

/// Uploaded model geometry plus the counts the UI displays.
pub struct GpuMesh {
    vertex_buf: Buffer,
    index_buf: Buffer,
    /// Each undirected mesh edge exactly once, as index pairs for LineList.
    edge_buf: Buffer,
    index_count: u32,
    edge_index_count: u32,
    vertex_count: u32,
    triangle_count: u32,
}

impl GpuMesh {
    /// Upload a fully parsed mesh as immutable buffers.
    pub fn upload(device: &Device, mesh: &MeshBuffers) -> Self {
        let vertices = interleave(mesh);
        let edges = extract_edges(&mesh.indices);

        let vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model VB"),
            contents: bytemuck::cast_slice(&vertices),
            usage: BufferUsages::VERTEX,
        });
        let index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model IB"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: BufferUsages::INDEX,
        });
        let edge_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model Edge IB"),
            contents: bytemuck::cast_slice(&edges),
            usage: BufferUsages::INDEX,
        });

        Self {
            vertex_buf,
            index_buf,
            edge_buf,
            index_count: mesh.indices.len() as u32,
            edge_index_count: edges.len() as u32,
            vertex_count: mesh.vertex_count() as u32,
            triangle_count: mesh.triangle_count() as u32,
        }
    }

    /// Free the underlying buffers immediately instead of waiting for all
    /// handles to drop. Called before uploading a replacement so peak GPU
    /// memory stays at one model.
    pub fn destroy(&self) {
        self.edge_buf.destroy();
        self.index_buf.destroy();
        self.vertex_buf.destroy();
    }

    #[inline]
    pub fn vertex_buf(&self) -> &Buffer {
        &self.vertex_buf
    }

    #[inline]
    pub fn index_buf(&self) -> &Buffer {
        &self.index_buf
    }

    #[inline]
    pub fn edge_buf(&self) -> &Buffer {
        &self.edge_buf
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn edge_index_count(&self) -> u32 {
        self.edge_index_count
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }
}

/// Zip positions and normals into one vertex stream, in index order.
pub fn interleave(mesh: &MeshBuffers) -> Vec<ModelVertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .map(|(&pos, &normal)| ModelVertex { pos, normal })
        .collect()
}

/// Flatten every undirected triangle edge exactly once, canonicalized as
/// (min,max) pairs, for the wireframe LineList overlay.
pub fn extract_edges(indices: &[u32]) -> Vec<u32> {
    let mut seen: HashSet<(u32, u32)> = HashSet::with_capacity(indices.len());
    let mut edges: Vec<u32> = Vec::with_capacity(indices.len() * 2);
    for tri in indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = (a.min(b), a.max(b));
            if seen.insert(key) {
                edges.push(key.0);
                edges.push(key.1);
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_pairs(edges: &[u32]) -> Vec<(u32, u32)> {
        edges.chunks_exact(2).map(|e| (e[0], e[1])).collect()
    }

    #[test]
    fn single_triangle_yields_three_edges() {
        let edges = extract_edges(&[0, 1, 2]);
        assert_eq!(edge_pairs(&edges), vec![(0, 1), (1, 2), (0, 2)]);
    }

    #[test]
    fn shared_edge_appears_once() {
        // Two triangles sharing edge (1,2): 4 distinct edges, not 6.
        let edges = extract_edges(&[0, 1, 2, 1, 2, 3]);
        let pairs = edge_pairs(&edges);
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs.iter().filter(|&&e| e == (1, 2)).count(), 1);
    }

    #[test]
    fn quad_with_diagonal_has_five_edges() {
        // 4 outer quad edges plus the shared diagonal (0,2).
        let edges = extract_edges(&[0, 1, 2, 0, 2, 3]);
        let pairs = edge_pairs(&edges);
        assert_eq!(pairs.len(), 5);
        assert!(pairs.contains(&(0, 2)));
    }

    #[test]
    fn no_triangles_no_edges() {
        assert!(extract_edges(&[]).is_empty());
    }

    #[test]
    fn interleave_pairs_positions_with_normals() {
        let mesh = MeshBuffers::new(
            vec![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]],
            vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
            vec![],
        );
        let verts = interleave(&mesh);
        assert_eq!(verts.len(), 2);
        assert_eq!(verts[0].pos, [0.0, 1.0, 2.0]);
        assert_eq!(verts[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(verts[1].pos, [3.0, 4.0, 5.0]);
        assert_eq!(verts[1].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn vertex_stride_is_six_floats() {
        assert_eq!(std::mem::size_of::<ModelVertex>(), 6 * 4);
    }
}
