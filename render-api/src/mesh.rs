//! CPU-side mesh arrays as produced by the importer and consumed by the renderer.

use thiserror::Error;

use crate::camera::Material;

/// A contiguous run of indices drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubRange {
    /// First index into `MeshData::indices`.
    pub base_index: u32,
    /// Number of indices.
    pub element_count: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("positions ({positions}) and normals ({normals}) differ in length")]
    NormalCountMismatch { positions: usize, normals: usize },
    #[error("uvs ({uvs}) must be empty or match positions ({positions})")]
    UvCountMismatch { positions: usize, uvs: usize },
    #[error("{ranges} sub-ranges but {materials} materials")]
    MaterialCountMismatch { ranges: usize, materials: usize },
    #[error("sub-range element counts sum to {sum}, index count is {indices}")]
    ElementCountMismatch { sum: u64, indices: usize },
    #[error("index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
    #[error("sub-range {range} ({base_index}+{element_count}) exceeds {indices} indices")]
    SubRangeOutOfBounds { range: usize, base_index: u32, element_count: u32, indices: usize },
}

/// Indexed triangle mesh split into material sub-ranges.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub indices: Vec<u32>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Empty when the mesh has no texture coordinates.
    pub uvs: Vec<[f32; 2]>,
    pub sub_ranges: Vec<SubRange>,
    pub materials: Vec<Material>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    /// True when indices, positions and normals are all populated.
    pub fn is_complete(&self) -> bool {
        !self.indices.is_empty() && !self.positions.is_empty() && !self.normals.is_empty()
    }

    /// Checks the cross-array invariants. An empty mesh is valid.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.positions.len() != self.normals.len() {
            return Err(MeshError::NormalCountMismatch {
                positions: self.positions.len(),
                normals: self.normals.len(),
            });
        }
        if self.has_uvs() && self.uvs.len() != self.positions.len() {
            return Err(MeshError::UvCountMismatch {
                positions: self.positions.len(),
                uvs: self.uvs.len(),
            });
        }
        if self.sub_ranges.len() != self.materials.len() {
            return Err(MeshError::MaterialCountMismatch {
                ranges: self.sub_ranges.len(),
                materials: self.materials.len(),
            });
        }
        let sum: u64 = self.sub_ranges.iter().map(|r| r.element_count as u64).sum();
        if sum != self.indices.len() as u64 {
            return Err(MeshError::ElementCountMismatch { sum, indices: self.indices.len() });
        }
        for (range, r) in self.sub_ranges.iter().enumerate() {
            if r.base_index as u64 + r.element_count as u64 > self.indices.len() as u64 {
                return Err(MeshError::SubRangeOutOfBounds {
                    range,
                    base_index: r.base_index,
                    element_count: r.element_count,
                    indices: self.indices.len(),
                });
            }
        }
        let vertices = self.vertex_count();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(MeshError::IndexOutOfRange { index, vertices });
        }
        Ok(())
    }

    /// Single-triangle mesh in the XY plane facing +Z, one default material.
    pub fn triangle() -> Self {
        Self {
            indices: vec![0, 1, 2],
            positions: vec![[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]],
            sub_ranges: vec![SubRange { base_index: 0, element_count: 3 }],
            materials: vec![Material::default()],
        }
    }

    /// Axis-aligned unit cube centred on the origin with per-face normals.
    pub fn cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [0.0, 0.0, 1.0], [-1.0, 0.0, 0.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
        ];
        let mut mesh = MeshData::default();
        for (n, a, b) in FACES {
            let base = mesh.positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.positions.push([
                    0.5 * (n[0] + su * a[0] + sv * b[0]),
                    0.5 * (n[1] + su * a[1] + sv * b[1]),
                    0.5 * (n[2] + su * a[2] + sv * b[2]),
                ]);
                mesh.normals.push(n);
                mesh.uvs.push([(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh.sub_ranges.push(SubRange { base_index: 0, element_count: mesh.indices.len() as u32 });
        mesh.materials.push(Material::default());
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_meshes_validate() {
        assert_eq!(MeshData::triangle().validate(), Ok(()));
        let cube = MeshData::cube();
        assert_eq!(cube.validate(), Ok(()));
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);
    }

    #[test]
    fn empty_mesh_is_valid_but_incomplete() {
        let mesh = MeshData::default();
        assert_eq!(mesh.validate(), Ok(()));
        assert!(!mesh.is_complete());
    }

    #[test]
    fn element_counts_must_cover_indices() {
        let mut mesh = MeshData::triangle();
        mesh.sub_ranges[0].element_count = 2;
        assert_eq!(mesh.validate(), Err(MeshError::ElementCountMismatch { sum: 2, indices: 3 }));
    }

    #[test]
    fn uvs_may_be_absent() {
        let mut mesh = MeshData::triangle();
        mesh.uvs.clear();
        assert_eq!(mesh.validate(), Ok(()));
        mesh.uvs.push([0.0, 0.0]);
        assert_eq!(mesh.validate(), Err(MeshError::UvCountMismatch { positions: 3, uvs: 1 }));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut mesh = MeshData::triangle();
        mesh.indices[2] = 7;
        assert_eq!(mesh.validate(), Err(MeshError::IndexOutOfRange { index: 7, vertices: 3 }));
    }

    #[test]
    fn sub_ranges_must_lie_inside_the_indices() {
        let mut mesh = MeshData::triangle();
        mesh.sub_ranges[0].base_index = 2;
        assert_eq!(
            mesh.validate(),
            Err(MeshError::SubRangeOutOfBounds { range: 0, base_index: 2, element_count: 3, indices: 3 })
        );

        mesh.sub_ranges[0] = SubRange { base_index: u32::MAX, element_count: 3 };
        assert!(matches!(mesh.validate(), Err(MeshError::SubRangeOutOfBounds { range: 0, .. })));
    }
}
