//! Vertex arrays and the attribute-slot registry layered on them.
//!
//! A [`VertexLayout`] owns one vertex-array object. Attribute slots are claimed
//! through [`VertexLayout::get_attribute`], which hands out at most one
//! [`AttributeHandle`] per slot; dropping the handle frees the slot again.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::buffer::Buffer;
use crate::device::{Device, ObjectId, ObjectKind, ScalarType};
use crate::error::GpuError;
use crate::object::DeviceObject;

/// Minimum number of vertex attributes every device supports.
pub const MAX_VERTEX_ATTRIBS: u32 = 16;

/// Thin owner of a vertex-array object.
#[derive(Debug)]
pub struct VertexArray {
    object: DeviceObject,
}

impl VertexArray {
    pub fn new(device: &Arc<dyn Device>) -> Result<Self, GpuError> {
        let id = device.create_vertex_array()?;
        Ok(Self { object: DeviceObject::from_raw(Arc::clone(device), ObjectKind::VertexArray, id) })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    fn device(&self) -> &Arc<dyn Device> {
        self.object.device()
    }

    pub fn vertex_buffer(&self, binding: u32, buffer: &Buffer, offset: usize, stride: u32) -> Result<(), GpuError> {
        self.device().vertex_array_vertex_buffer(self.id(), binding, buffer.id(), offset, stride)
    }

    pub fn element_buffer(&self, buffer: &Buffer) -> Result<(), GpuError> {
        self.device().vertex_array_element_buffer(self.id(), buffer.id())
    }

    pub fn attrib_format(&self, attrib: u32, size: u32, ty: ScalarType, normalized: bool, relative_offset: u32) -> Result<(), GpuError> {
        self.device().vertex_array_attrib_format(self.id(), attrib, size, ty, normalized, relative_offset)
    }

    pub fn attrib_binding(&self, attrib: u32, binding: u32) -> Result<(), GpuError> {
        self.device().vertex_array_attrib_binding(self.id(), attrib, binding)
    }

    pub fn set_attrib_enabled(&self, attrib: u32, enabled: bool) -> Result<(), GpuError> {
        self.device().vertex_array_attrib_enabled(self.id(), attrib, enabled)
    }

    pub fn bind(&self) -> Result<(), GpuError> {
        self.device().bind_vertex_array(self.id())
    }
}

/// Format and routing of one attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeConfig {
    /// Buffer binding point the attribute reads from.
    pub binding: u32,
    /// Component count (1..=4).
    pub size: u32,
    pub ty: ScalarType,
    pub normalized: bool,
    pub relative_offset: u32,
}

impl AttributeConfig {
    pub fn floats(binding: u32, size: u32) -> Self {
        Self { binding, size, ty: ScalarType::F32, normalized: false, relative_offset: 0 }
    }

    /// Tightly packed stride of one element.
    pub fn packed_stride(&self) -> u32 {
        self.size * self.ty.size()
    }
}

/// Placement of vertex data inside a buffer bound to a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDataLayout {
    pub offset: usize,
    pub stride: u32,
}

struct LayoutControlBlock {
    vao: VertexArray,
    claimed: Mutex<Vec<u32>>,
}

/// Vertex-array object plus the set of attribute slots currently claimed.
pub struct VertexLayout {
    block: Arc<LayoutControlBlock>,
}

impl std::fmt::Debug for VertexLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexLayout")
            .field("vao", &self.block.vao.id())
            .field("claimed", &*self.block.claimed.lock())
            .finish()
    }
}

impl VertexLayout {
    pub fn new(device: &Arc<dyn Device>) -> Result<Self, GpuError> {
        let vao = VertexArray::new(device)?;
        Ok(Self { block: Arc::new(LayoutControlBlock { vao, claimed: Mutex::new(Vec::new()) }) })
    }

    pub fn vertex_array(&self) -> &VertexArray {
        &self.block.vao
    }

    /// Claim slot `index`, enable it and route it to binding point `index`.
    pub fn get_attribute(&self, index: u32) -> Result<AttributeHandle, GpuError> {
        if index >= MAX_VERTEX_ATTRIBS {
            return Err(GpuError::AttributeIndexOutOfRange { index, max: MAX_VERTEX_ATTRIBS });
        }
        {
            let mut claimed = self.block.claimed.lock();
            if claimed.contains(&index) {
                return Err(GpuError::AliasingAttribute { index });
            }
            claimed.push(index);
        }
        let handle = AttributeHandle { block: Arc::downgrade(&self.block), index };
        // On failure the handle's drop releases the claim.
        handle.set_binding(index)?;
        handle.set_enabled(true)?;
        Ok(handle)
    }

    pub fn is_claimed(&self, index: u32) -> bool {
        self.block.claimed.lock().contains(&index)
    }

    /// Claimed slots in registry order.
    pub fn claimed(&self) -> Vec<u32> {
        self.block.claimed.lock().clone()
    }

    pub fn bind_buffer(&self, binding: u32, buffer: &Buffer, layout: BufferDataLayout) -> Result<(), GpuError> {
        self.block.vao.vertex_buffer(binding, buffer, layout.offset, layout.stride)
    }

    pub fn bind_element_buffer(&self, buffer: &Buffer) -> Result<(), GpuError> {
        self.block.vao.element_buffer(buffer)
    }

    pub fn bind(&self) -> Result<(), GpuError> {
        self.block.vao.bind()
    }
}

/// Exclusive claim on one attribute slot of a [`VertexLayout`].
#[derive(Debug)]
pub struct AttributeHandle {
    block: Weak<LayoutControlBlock>,
    index: u32,
}

impl AttributeHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    fn with_vao<R>(&self, f: impl FnOnce(&VertexArray) -> Result<R, GpuError>) -> Result<R, GpuError> {
        let block = self.block.upgrade().ok_or(GpuError::LayoutGone)?;
        f(&block.vao)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), GpuError> {
        self.with_vao(|vao| vao.set_attrib_enabled(self.index, enabled))
    }

    pub fn set_binding(&self, binding: u32) -> Result<(), GpuError> {
        self.with_vao(|vao| vao.attrib_binding(self.index, binding))
    }

    pub fn set_format(&self, size: u32, ty: ScalarType, normalized: bool, relative_offset: u32) -> Result<(), GpuError> {
        self.with_vao(|vao| vao.attrib_format(self.index, size, ty, normalized, relative_offset))
    }

    pub fn configure(&self, config: &AttributeConfig) -> Result<(), GpuError> {
        self.set_binding(config.binding)?;
        self.set_format(config.size, config.ty, config.normalized, config.relative_offset)
    }
}

impl Drop for AttributeHandle {
    fn drop(&mut self) {
        if let Some(block) = self.block.upgrade() {
            let mut claimed = block.claimed.lock();
            if let Some(pos) = claimed.iter().position(|&i| i == self.index) {
                claimed.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn layout() -> (Arc<HeadlessDevice>, VertexLayout) {
        let device = HeadlessDevice::new(4, 4);
        let dev: Arc<dyn Device> = device.clone();
        let layout = VertexLayout::new(&dev).unwrap();
        (device, layout)
    }

    #[test]
    fn second_claim_on_a_slot_aliases() {
        let (_device, layout) = layout();
        let first = layout.get_attribute(3).unwrap();
        assert!(matches!(layout.get_attribute(3), Err(GpuError::AliasingAttribute { index: 3 })));
        drop(first);
        assert!(layout.get_attribute(3).is_ok());
    }

    #[test]
    fn release_uses_swap_remove() {
        let (_device, layout) = layout();
        let a = layout.get_attribute(0).unwrap();
        let _b = layout.get_attribute(1).unwrap();
        let _c = layout.get_attribute(2).unwrap();
        drop(a);
        assert_eq!(layout.claimed(), vec![2, 1]);
    }

    #[test]
    fn claim_sequences_never_duplicate() {
        let (_device, layout) = layout();
        let mut handles: Vec<Option<AttributeHandle>> = (0..8).map(|_| None).collect();
        // Deterministic pseudo-random walk over claim/release operations.
        let mut state = 0x2545_f491u32;
        for _ in 0..500 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let slot = (state % 8) as usize;
            match handles[slot].take() {
                Some(handle) => drop(handle),
                None => handles[slot] = Some(layout.get_attribute(slot as u32).unwrap()),
            }
            let mut claimed = layout.claimed();
            let len = claimed.len();
            claimed.sort_unstable();
            claimed.dedup();
            assert_eq!(claimed.len(), len);
            assert_eq!(len, handles.iter().filter(|h| h.is_some()).count());
        }
    }

    #[test]
    fn claim_enables_and_routes_slot() {
        let (device, layout) = layout();
        let handle = layout.get_attribute(2).unwrap();
        handle.configure(&AttributeConfig::floats(2, 2)).unwrap();
        let attrib = device.vertex_attrib(layout.vertex_array().id(), 2).unwrap();
        assert!(attrib.enabled);
        assert_eq!(attrib.binding, 2);
        assert_eq!(attrib.size, 2);
    }

    #[test]
    fn handle_outliving_layout_is_inert() {
        let (_device, layout) = layout();
        let handle = layout.get_attribute(0).unwrap();
        drop(layout);
        assert!(matches!(handle.set_enabled(false), Err(GpuError::LayoutGone)));
    }

    #[test]
    fn slot_limit_is_enforced() {
        let (_device, layout) = layout();
        assert!(matches!(
            layout.get_attribute(MAX_VERTEX_ATTRIBS),
            Err(GpuError::AttributeIndexOutOfRange { .. })
        ));
    }
}
