//! A vertex layout whose attribute formats are fixed at construction.
//!
//! Meshes only swap the buffers behind the binding points; formats are never
//! touched again. Channels a mesh does not provide are disabled until the next
//! mesh that has them.

use std::sync::Arc;

use umbra_gpu::{AttributeConfig, AttributeHandle, Buffer, BufferDataLayout, Device, ScalarType, VertexLayout};

use crate::error::Result;
use crate::mesh::MeshBuffers;

/// Optional attribute configuration per mesh channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutDesc {
    pub positions: Option<AttributeConfig>,
    pub normals: Option<AttributeConfig>,
    pub uvs: Option<AttributeConfig>,
}

const fn float_attribute(binding: u32, size: u32) -> AttributeConfig {
    AttributeConfig { binding, size, ty: ScalarType::F32, normalized: false, relative_offset: 0 }
}

/// Separate buffers per channel: slot 0 `vec3` positions, slot 1 `vec3` normals, slot 2 `vec2` uvs.
pub const STANDARD_LAYOUT: LayoutDesc = LayoutDesc {
    positions: Some(float_attribute(0, 3)),
    normals: Some(float_attribute(1, 3)),
    uvs: Some(float_attribute(2, 2)),
};

struct Channel {
    config: AttributeConfig,
    attribute: AttributeHandle,
}

impl Channel {
    fn claim(layout: &VertexLayout, config: Option<AttributeConfig>) -> Result<Option<Self>> {
        let Some(config) = config else { return Ok(None) };
        let attribute = layout.get_attribute(config.binding)?;
        attribute.configure(&config)?;
        Ok(Some(Self { config, attribute }))
    }

    fn bind(&self, layout: &VertexLayout, buffer: Option<&Buffer>) -> Result<()> {
        match buffer {
            Some(buffer) => {
                let data = BufferDataLayout { offset: 0, stride: self.config.packed_stride() };
                layout.bind_buffer(self.config.binding, buffer, data)?;
                self.attribute.set_enabled(true)?;
            }
            None => self.attribute.set_enabled(false)?,
        }
        Ok(())
    }
}

pub struct FixedLayout {
    desc: LayoutDesc,
    positions: Option<Channel>,
    normals: Option<Channel>,
    uvs: Option<Channel>,
    layout: VertexLayout,
}

impl std::fmt::Debug for FixedLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedLayout").field("desc", &self.desc).field("layout", &self.layout).finish()
    }
}

impl FixedLayout {
    pub fn new(device: &Arc<dyn Device>, desc: LayoutDesc) -> Result<Self> {
        let layout = VertexLayout::new(device)?;
        Ok(Self {
            desc,
            positions: Channel::claim(&layout, desc.positions)?,
            normals: Channel::claim(&layout, desc.normals)?,
            uvs: Channel::claim(&layout, desc.uvs)?,
            layout,
        })
    }

    pub fn standard(device: &Arc<dyn Device>) -> Result<Self> {
        Self::new(device, STANDARD_LAYOUT)
    }

    pub fn desc(&self) -> &LayoutDesc {
        &self.desc
    }

    pub fn vertex_layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Route the mesh's vertex buffers to the layout's binding points.
    pub fn bind(&self, mesh: &MeshBuffers) -> Result<()> {
        let channels = [
            (&self.positions, Some(mesh.positions())),
            (&self.normals, Some(mesh.normals())),
            (&self.uvs, mesh.uvs()),
        ];
        for (channel, buffer) in channels {
            if let Some(channel) = channel {
                channel.bind(&self.layout, buffer)?;
            }
        }
        Ok(())
    }

    pub fn bind_index_buffer(&self, mesh: &MeshBuffers) -> Result<()> {
        Ok(self.layout.bind_element_buffer(mesh.indices())?)
    }

    /// Make this layout the current vertex input.
    pub fn bind_layout(&self) -> Result<()> {
        Ok(self.layout.bind()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_api::MeshData;
    use umbra_gpu::HeadlessDevice;

    #[test]
    fn standard_layout_claims_three_slots() {
        let headless = HeadlessDevice::new(4, 4);
        let device: Arc<dyn Device> = headless.clone();
        let layout = FixedLayout::standard(&device).unwrap();
        assert_eq!(layout.vertex_layout().claimed(), vec![0, 1, 2]);
        let vao = layout.vertex_layout().vertex_array().id();
        let uv = headless.vertex_attrib(vao, 2).unwrap();
        assert_eq!((uv.size, uv.binding, uv.enabled), (2, 2, true));
    }

    #[test]
    fn partial_layout_leaves_slots_free() {
        let headless = HeadlessDevice::new(4, 4);
        let device: Arc<dyn Device> = headless.clone();
        let desc = LayoutDesc { positions: STANDARD_LAYOUT.positions, ..Default::default() };
        let layout = FixedLayout::new(&device, desc).unwrap();
        assert_eq!(layout.vertex_layout().claimed(), vec![0]);

        let buffers = MeshBuffers::new(&device, &MeshData::triangle()).unwrap();
        layout.bind(&buffers).unwrap();
        let vao = layout.vertex_layout().vertex_array().id();
        assert!(headless.vertex_binding(vao, 0).is_some());
        assert!(headless.vertex_binding(vao, 1).is_none());
    }
}
