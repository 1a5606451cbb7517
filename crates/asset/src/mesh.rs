//! CPU-side mesh representation produced by parsers and consumed by the
//! renderer's upload path.

/// Indexed triangle mesh: parallel position/normal arrays plus a triangle
/// index list. `positions` and `normals` share one index space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    pub fn new(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals,
            indices,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Structural invariants: parallel arrays of equal length, whole
    /// triangles only, every index in range.
    pub fn is_valid(&self) -> bool {
        self.positions.len() == self.normals.len()
            && self.indices.len() % 3 == 0
            && self
                .indices
                .iter()
                .all(|&i| (i as usize) < self.positions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mesh_is_valid_but_empty() {
        let mesh = MeshBuffers::default();
        assert!(mesh.is_valid());
        assert!(mesh.is_empty());
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn triangle_counts() {
        let mesh = MeshBuffers::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![0, 1, 2],
        );
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let mesh = MeshBuffers::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![0, 1, 3],
        );
        assert!(!mesh.is_valid());
    }

    #[test]
    fn mismatched_normals_are_invalid() {
        let mesh = MeshBuffers::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 2],
            vec![0, 1, 2],
        );
        assert!(!mesh.is_valid());
    }
}
