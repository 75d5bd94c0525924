//! Wavefront OBJ import into [`MeshData`].
//!
//! Every OBJ model becomes one sub-range of a single shared vertex array;
//! indices are rebased so one index buffer covers the whole file.

use std::io::BufRead;
use std::path::Path;

use thiserror::Error;

use crate::camera::Material;
use crate::mesh::{MeshData, MeshError, SubRange};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("OBJ parse failed: {0}")]
    Parse(#[from] tobj::LoadError),
    #[error("OBJ file contains no models")]
    Empty,
    #[error("model `{model}` has {normals} normals for {positions} positions")]
    MissingNormals { model: String, positions: usize, normals: usize },
    #[error("model `{model}` has {uvs} texture coordinates for {positions} positions")]
    UvMismatch { model: String, positions: usize, uvs: usize },
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

#[derive(Clone, Debug)]
pub struct ImportOptions {
    /// Compute area-weighted vertex normals for models that have none.
    pub generate_normals: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { generate_normals: true }
    }
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// Loads an OBJ file and its material library (when present and readable).
pub fn load_obj(path: &Path, options: &ImportOptions) -> Result<MeshData, ImportError> {
    let (models, materials) = tobj::load_obj(path, &load_options())?;
    let materials = match materials {
        Ok(m) => m,
        Err(e) => {
            log::debug!("import: no materials for {}: {}", path.display(), e);
            Vec::new()
        }
    };
    build_mesh(&models, &materials, options)
}

/// Parses OBJ text from a reader; material libraries are not resolved.
pub fn parse_obj<R: BufRead>(reader: &mut R, options: &ImportOptions) -> Result<MeshData, ImportError> {
    let (models, _) = tobj::load_obj_buf(reader, &load_options(), |_| Err(tobj::LoadError::OpenFileFailed))?;
    build_mesh(&models, &[], options)
}

fn convert_material(m: &tobj::Material) -> Material {
    let defaults = Material::default();
    Material {
        diffuse: m.diffuse.unwrap_or(defaults.diffuse),
        specular: m.specular.unwrap_or(defaults.specular),
        shininess: m.shininess.unwrap_or(defaults.shininess),
        reflective: defaults.reflective,
    }
}

fn build_mesh(models: &[tobj::Model], materials: &[tobj::Material], options: &ImportOptions) -> Result<MeshData, ImportError> {
    if models.is_empty() {
        return Err(ImportError::Empty);
    }
    let mut out = MeshData::default();
    for model in models {
        let mesh = &model.mesh;
        let positions: Vec<[f32; 3]> = mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        let mut normals: Vec<[f32; 3]> = mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect();
        let uvs: Vec<[f32; 2]> = mesh.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]).collect();

        if normals.is_empty() && options.generate_normals {
            normals = generate_normals(&positions, &mesh.indices);
        }
        if normals.len() != positions.len() {
            return Err(ImportError::MissingNormals {
                model: model.name.clone(),
                positions: positions.len(),
                normals: normals.len(),
            });
        }
        if !uvs.is_empty() && uvs.len() != positions.len() {
            return Err(ImportError::UvMismatch { model: model.name.clone(), positions: positions.len(), uvs: uvs.len() });
        }

        let base_vertex = out.positions.len() as u32;
        let base_index = out.indices.len() as u32;
        // Models without texture coordinates are zero-filled once any model has them.
        if !uvs.is_empty() && out.uvs.len() < out.positions.len() {
            out.uvs.resize(out.positions.len(), [0.0; 2]);
        }
        out.positions.extend_from_slice(&positions);
        out.normals.extend_from_slice(&normals);
        if !uvs.is_empty() {
            out.uvs.extend_from_slice(&uvs);
        } else if !out.uvs.is_empty() {
            out.uvs.resize(out.positions.len(), [0.0; 2]);
        }
        out.indices.extend(mesh.indices.iter().map(|i| i + base_vertex));
        out.sub_ranges.push(SubRange { base_index, element_count: mesh.indices.len() as u32 });
        out.materials.push(
            mesh.material_id
                .and_then(|id| materials.get(id))
                .map(convert_material)
                .unwrap_or_default(),
        );
        log::trace!(
            "import: model `{}` with {} vertices, {} indices",
            model.name,
            positions.len(),
            mesh.indices.len()
        );
    }
    out.validate()?;
    Ok(out)
}

fn generate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    use crate::math::{cross, normalize, sub};
    let mut normals = vec![[0.0f32; 3]; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let n = cross(sub(positions[b], positions[a]), sub(positions[c], positions[a]));
        for i in [a, b, c] {
            normals[i][0] += n[0];
            normals[i][1] += n[1];
            normals[i][2] += n[2];
        }
    }
    normals.into_iter().map(normalize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD_AND_TRIANGLE: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
o tri
v 0 0 1
v 1 0 1
v 0 1 1
f 5//1 6//1 7//1
";

    #[test]
    fn models_become_sub_ranges() {
        let mesh = parse_obj(&mut Cursor::new(QUAD_AND_TRIANGLE), &ImportOptions::default()).unwrap();
        assert_eq!(mesh.sub_ranges.len(), 2);
        assert_eq!(mesh.sub_ranges[0], SubRange { base_index: 0, element_count: 6 });
        assert_eq!(mesh.sub_ranges[1], SubRange { base_index: 6, element_count: 3 });
        assert_eq!(mesh.materials.len(), 2);
        assert!(!mesh.has_uvs());
        assert!(mesh.indices[6..].iter().all(|&i| i >= 4));
        mesh.validate().unwrap();
    }

    #[test]
    fn missing_normals_are_generated_or_rejected() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse_obj(&mut Cursor::new(src), &ImportOptions::default()).unwrap();
        assert_eq!(mesh.normals, vec![[0.0, 0.0, 1.0]; 3]);

        let strict = ImportOptions { generate_normals: false };
        let err = parse_obj(&mut Cursor::new(src), &strict).unwrap_err();
        assert!(matches!(err, ImportError::MissingNormals { positions: 3, normals: 0, .. }));
    }
}
