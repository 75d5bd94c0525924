use std::sync::Arc;

use crate::device::{Device, Filter, ObjectId, ObjectKind, Readback, TextureDesc, TextureFormat};
use crate::error::GpuError;
use crate::object::DeviceObject;

/// Owned 2D texture with immutable storage.
#[derive(Debug)]
pub struct Texture {
    object: DeviceObject,
    desc: TextureDesc,
}

impl Texture {
    pub fn new_2d(device: &Arc<dyn Device>, format: TextureFormat, width: u32, height: u32) -> Result<Self, GpuError> {
        let desc = TextureDesc { format, width, height, levels: 1 };
        let id = device.create_texture(&desc)?;
        Ok(Self { object: DeviceObject::from_raw(Arc::clone(device), ObjectKind::Texture, id), desc })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn set_label(&self, label: &str) {
        self.object.set_label(label);
    }

    pub fn set_filter(&self, min: Filter, mag: Filter) -> Result<(), GpuError> {
        self.object.device().texture_filter(self.id(), min, mag)
    }

    pub fn bind(&self, unit: u32) -> Result<(), GpuError> {
        self.object.device().bind_texture_unit(unit, self.id())
    }

    pub fn read_image(&self) -> Result<Readback, GpuError> {
        self.object.device().get_texture_image(self.id())
    }

    pub fn take(&mut self) -> Texture {
        Texture { object: self.object.take(), desc: self.desc }
    }
}
