//! Owned device buffers.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::device::{BufferFlags, Device, MapAccess, ObjectId, ObjectKind};
use crate::error::GpuError;
use crate::object::DeviceObject;

#[derive(Debug)]
pub struct Buffer {
    object: DeviceObject,
    size: usize,
    flags: BufferFlags,
}

impl Buffer {
    /// Allocate immutable storage of `size` bytes. `data`, when given, must be `size` bytes.
    pub fn new(device: &Arc<dyn Device>, size: usize, data: Option<&[u8]>, flags: BufferFlags) -> Result<Self, GpuError> {
        if let Some(data) = data {
            if data.len() != size {
                return Err(GpuError::InvalidOperation(format!(
                    "initial data is {} bytes, buffer is {}",
                    data.len(),
                    size
                )));
            }
        }
        let id = device.create_buffer(size, data, flags)?;
        Ok(Self { object: DeviceObject::from_raw(Arc::clone(device), ObjectKind::Buffer, id), size, flags })
    }

    /// Buffer initialized from a slice of plain-old-data values.
    pub fn from_slice<T: bytemuck::Pod>(device: &Arc<dyn Device>, data: &[T], flags: BufferFlags) -> Result<Self, GpuError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        Self::new(device, bytes.len(), Some(bytes), flags)
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn is_null(&self) -> bool {
        self.object.is_null()
    }

    pub fn set_label(&self, label: &str) {
        self.object.set_label(label);
    }

    pub fn take(&mut self) -> Buffer {
        Buffer { object: self.object.take(), size: std::mem::take(&mut self.size), flags: self.flags }
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), GpuError> {
        self.object.device().buffer_sub_data(self.id(), offset, data)
    }

    pub fn write_slice<T: bytemuck::Pod>(&self, offset: usize, data: &[T]) -> Result<(), GpuError> {
        self.write(offset, bytemuck::cast_slice(data))
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), GpuError> {
        self.object.device().get_buffer_sub_data(self.id(), offset, out)
    }

    /// Map a byte range. The pointer is valid until [`unmap`](Self::unmap) or drop.
    pub fn map_range(&self, offset: usize, len: usize, access: MapAccess) -> Result<NonNull<u8>, GpuError> {
        self.object.device().map_buffer_range(self.id(), offset, len, access)
    }

    /// Make explicit-flush writes in `offset..offset+len` (relative to the mapping) visible.
    pub fn flush_range(&self, offset: usize, len: usize) -> Result<(), GpuError> {
        self.object.device().flush_mapped_buffer_range(self.id(), offset, len)
    }

    pub fn unmap(&self) -> Result<(), GpuError> {
        self.object.device().unmap_buffer(self.id())
    }

    /// Bind `offset..offset+size` to an indexed uniform-buffer binding point.
    pub fn bind_uniform_range(&self, binding: u32, offset: usize, size: usize) -> Result<(), GpuError> {
        self.object.device().bind_uniform_buffer_range(binding, self.id(), offset, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn write_and_read_back() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let buffer = Buffer::new(&device, 8, None, BufferFlags::DYNAMIC_STORAGE).unwrap();
        buffer.write_slice(0, &[1u32, 2u32]).unwrap();
        let mut out = [0u8; 8];
        buffer.read(0, &mut out).unwrap();
        assert_eq!(bytemuck::cast_slice::<u8, u32>(&out), &[1, 2]);
    }

    #[test]
    fn immutable_storage_rejects_updates() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let buffer = Buffer::from_slice(&device, &[1.0f32, 2.0, 3.0], BufferFlags::empty()).unwrap();
        assert_eq!(buffer.size(), 12);
        assert!(matches!(buffer.write(0, &[0u8; 4]), Err(GpuError::InvalidOperation(_))));
    }

    #[test]
    fn double_map_is_rejected() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let buffer = Buffer::new(&device, 16, None, BufferFlags::MAP_WRITE).unwrap();
        buffer.map_range(0, 16, MapAccess::WRITE).unwrap();
        assert!(matches!(buffer.map_range(0, 16, MapAccess::WRITE), Err(GpuError::AlreadyMapped(_))));
        buffer.unmap().unwrap();
        assert!(matches!(buffer.unmap(), Err(GpuError::NotMapped(_))));
    }

    #[test]
    fn take_moves_ownership() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let mut buffer = Buffer::new(&device, 4, None, BufferFlags::empty()).unwrap();
        let id = buffer.id();
        let moved = buffer.take();
        assert!(buffer.is_null());
        assert_eq!(buffer.size(), 0);
        assert_eq!(moved.id(), id);
    }
}
