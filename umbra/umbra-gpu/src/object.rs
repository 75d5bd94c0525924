//! Exclusive ownership of device object identifiers.

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::device::{Device, ObjectId, ObjectKind, NULL_OBJECT};

/// Sole owner of one device object.
///
/// Dropping the handle destroys the object exactly once; a handle holding the
/// null identifier destroys nothing. Handles are not `Clone`. [`take`](Self::take)
/// moves the identifier into a new handle and leaves this one null, which is
/// how owners hand objects out of structures they keep alive.
pub struct DeviceObject {
    device: Arc<dyn Device>,
    kind: ObjectKind,
    id: ObjectId,
}

impl DeviceObject {
    /// Adopt `id`. The caller guarantees no other handle owns it.
    pub fn from_raw(device: Arc<dyn Device>, kind: ObjectKind, id: ObjectId) -> Self {
        log::trace!("adopt {:?} {}", kind, id);
        Self { device, kind, id }
    }

    /// A handle owning nothing.
    pub fn null(device: Arc<dyn Device>, kind: ObjectKind) -> Self {
        Self { device, kind, id: NULL_OBJECT }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        self.id == NULL_OBJECT
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn set_label(&self, label: &str) {
        if !self.is_null() {
            self.device.object_label(self.kind, self.id, label);
        }
    }

    /// Move ownership out, leaving `self` null.
    pub fn take(&mut self) -> DeviceObject {
        let id = mem::replace(&mut self.id, NULL_OBJECT);
        DeviceObject { device: Arc::clone(&self.device), kind: self.kind, id }
    }

    /// Give up ownership without destroying the object.
    pub fn into_raw(mut self) -> ObjectId {
        mem::replace(&mut self.id, NULL_OBJECT)
    }
}

impl Drop for DeviceObject {
    fn drop(&mut self) {
        if self.id != NULL_OBJECT {
            log::trace!("destroy {:?} {}", self.kind, self.id);
            self.device.destroy_object(self.kind, self.id);
        }
    }
}

impl fmt::Debug for DeviceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceObject")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{Command, HeadlessDevice};

    fn destroys(device: &HeadlessDevice, id: ObjectId) -> usize {
        device
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Destroy { id: d, .. } if *d == id))
            .count()
    }

    #[test]
    fn drop_destroys_once() {
        let device = HeadlessDevice::new(4, 4);
        let dev: Arc<dyn Device> = device.clone();
        let id = dev.create_vertex_array().unwrap();
        let obj = DeviceObject::from_raw(dev, ObjectKind::VertexArray, id);
        assert_eq!(destroys(&device, id), 0);
        drop(obj);
        assert_eq!(destroys(&device, id), 1);
        assert_eq!(device.live_objects(ObjectKind::VertexArray), 0);
    }

    #[test]
    fn take_leaves_source_null() {
        let device = HeadlessDevice::new(4, 4);
        let dev: Arc<dyn Device> = device.clone();
        let id = dev.create_program().unwrap();
        let mut first = DeviceObject::from_raw(dev, ObjectKind::Program, id);
        let second = first.take();
        assert!(first.is_null());
        assert_eq!(second.id(), id);
        drop(first);
        assert_eq!(destroys(&device, id), 0);
        drop(second);
        assert_eq!(destroys(&device, id), 1);
    }

    #[test]
    fn into_raw_skips_destroy() {
        let device = HeadlessDevice::new(4, 4);
        let dev: Arc<dyn Device> = device.clone();
        let id = dev.create_framebuffer().unwrap();
        let raw = DeviceObject::from_raw(Arc::clone(&dev), ObjectKind::Framebuffer, id).into_raw();
        assert_eq!(raw, id);
        assert_eq!(destroys(&device, id), 0);
        dev.destroy_object(ObjectKind::Framebuffer, raw);
    }
}
