//! Device-resident meshes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use render_api::MeshData;
use umbra_gpu::{Buffer, BufferFlags, Device};

use crate::error::{RenderError, Result};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique mesh identity. Orders mesh-volume lights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(u64);

/// One buffer per populated vertex array plus the element buffer.
#[derive(Debug)]
pub struct MeshBuffers {
    indices: Buffer,
    positions: Buffer,
    normals: Buffer,
    uvs: Option<Buffer>,
}

impl MeshBuffers {
    /// Upload `data`. Indices, positions and normals must all be present; uvs are optional.
    pub fn new(device: &Arc<dyn Device>, data: &MeshData) -> Result<Self> {
        if !data.is_complete() {
            return Err(RenderError::IncompleteMesh);
        }
        let flags = BufferFlags::DYNAMIC_STORAGE;
        let buffers = Self {
            indices: Buffer::from_slice(device, &data.indices, flags)?,
            positions: Buffer::from_slice(device, &data.positions, flags)?,
            normals: Buffer::from_slice(device, &data.normals, flags)?,
            uvs: if data.has_uvs() { Some(Buffer::from_slice(device, &data.uvs, flags)?) } else { None },
        };
        log::debug!(
            "mesh buffers: {} indices, {} vertices, uvs: {}",
            data.indices.len(),
            data.vertex_count(),
            buffers.uvs.is_some()
        );
        Ok(buffers)
    }

    pub fn indices(&self) -> &Buffer {
        &self.indices
    }

    pub fn positions(&self) -> &Buffer {
        &self.positions
    }

    pub fn normals(&self) -> &Buffer {
        &self.normals
    }

    pub fn uvs(&self) -> Option<&Buffer> {
        self.uvs.as_ref()
    }
}

/// Mesh data together with its device buffers. The buffers always mirror the data.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    data: MeshData,
    buffers: MeshBuffers,
}

impl Mesh {
    pub fn new(device: &Arc<dyn Device>, data: MeshData) -> Result<Self> {
        if !data.is_complete() {
            return Err(RenderError::IncompleteMesh);
        }
        data.validate()?;
        let buffers = MeshBuffers::new(device, &data)?;
        Ok(Self { id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)), data, buffers })
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn buffers(&self) -> &MeshBuffers {
        &self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_api::MeshError;
    use umbra_gpu::{HeadlessDevice, ObjectKind};

    fn device() -> (Arc<HeadlessDevice>, Arc<dyn Device>) {
        let headless = HeadlessDevice::new(4, 4);
        let device: Arc<dyn Device> = headless.clone();
        (headless, device)
    }

    #[test]
    fn incomplete_data_is_rejected() {
        let (_, device) = device();
        let strips: [fn(&mut MeshData); 3] = [
            |d| d.indices.clear(),
            |d| d.positions.clear(),
            |d| d.normals.clear(),
        ];
        for strip in strips {
            let mut data = MeshData::triangle();
            strip(&mut data);
            assert!(matches!(MeshBuffers::new(&device, &data), Err(RenderError::IncompleteMesh)));
        }
    }

    #[test]
    fn uvs_are_optional() {
        let (headless, device) = device();
        let mut data = MeshData::triangle();
        data.uvs.clear();
        let buffers = MeshBuffers::new(&device, &data).unwrap();
        assert!(buffers.uvs().is_none());
        assert_eq!(buffers.positions().size(), 36);
        assert_eq!(headless.live_objects(ObjectKind::Buffer), 3);
        drop(buffers);
        assert_eq!(headless.live_objects(ObjectKind::Buffer), 0);
    }

    #[test]
    fn mesh_validates_before_upload() {
        let (headless, device) = device();
        let mut data = MeshData::triangle();
        data.indices[2] = 7;
        assert!(matches!(
            Mesh::new(&device, data),
            Err(RenderError::Mesh(MeshError::IndexOutOfRange { index: 7, .. }))
        ));
        assert_eq!(headless.live_objects(ObjectKind::Buffer), 0);
    }

    #[test]
    fn sub_range_past_the_indices_is_not_uploaded() {
        let (headless, device) = device();
        let mut data = MeshData::triangle();
        data.sub_ranges[0].base_index = 2;
        assert!(matches!(
            Mesh::new(&device, data),
            Err(RenderError::Mesh(MeshError::SubRangeOutOfBounds { range: 0, .. }))
        ));
        assert_eq!(headless.live_objects(ObjectKind::Buffer), 0);
    }

    #[test]
    fn mesh_ids_are_unique() {
        let (_, device) = device();
        let a = Mesh::new(&device, MeshData::triangle()).unwrap();
        let b = Mesh::new(&device, MeshData::triangle()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
