//! Owned framebuffer objects.

use std::sync::Arc;

use crate::device::{Attachment, Device, FramebufferStatus, ObjectId, ObjectKind, Readback};
use crate::error::GpuError;
use crate::object::DeviceObject;
use crate::texture::Texture;

/// Framebuffer with texture attachments. The textures stay owned by the caller
/// and must outlive any draw into this framebuffer.
#[derive(Debug)]
pub struct Framebuffer {
    object: DeviceObject,
    attachments: Vec<(Attachment, ObjectId)>,
}

impl Framebuffer {
    pub fn new(device: &Arc<dyn Device>) -> Result<Self, GpuError> {
        let id = device.create_framebuffer()?;
        Ok(Self {
            object: DeviceObject::from_raw(Arc::clone(device), ObjectKind::Framebuffer, id),
            attachments: Vec::new(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn set_label(&self, label: &str) {
        self.object.set_label(label);
    }

    pub fn attach(&mut self, attachment: Attachment, texture: &Texture) -> Result<(), GpuError> {
        self.object.device().framebuffer_texture(self.id(), attachment, texture.id())?;
        self.attachments.retain(|(a, _)| *a != attachment);
        self.attachments.push((attachment, texture.id()));
        Ok(())
    }

    pub fn attachments(&self) -> &[(Attachment, ObjectId)] {
        &self.attachments
    }

    pub fn status(&self) -> FramebufferStatus {
        self.object.device().check_framebuffer_status(self.id())
    }

    pub fn is_complete(&self) -> bool {
        self.status() == FramebufferStatus::Complete
    }

    pub fn set_draw_buffers(&self, buffers: &[Attachment]) -> Result<(), GpuError> {
        self.object.device().framebuffer_draw_buffers(self.id(), buffers)
    }

    pub fn bind_draw(&self) -> Result<(), GpuError> {
        self.object.device().bind_draw_framebuffer(self.id())
    }

    pub fn read_pixels(&self, attachment: Attachment) -> Result<Readback, GpuError> {
        self.object.device().read_pixels(self.id(), attachment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ClearMask, TextureFormat};
    use crate::headless::HeadlessDevice;

    #[test]
    fn completeness_requires_matching_attachments() {
        let device: Arc<dyn Device> = HeadlessDevice::new(8, 8);
        let mut fb = Framebuffer::new(&device).unwrap();
        assert_eq!(fb.status(), FramebufferStatus::MissingAttachment);

        let color = Texture::new_2d(&device, TextureFormat::Rgba8, 4, 4).unwrap();
        let depth = Texture::new_2d(&device, TextureFormat::Depth32F, 4, 4).unwrap();
        fb.attach(Attachment::Color(0), &color).unwrap();
        fb.attach(Attachment::Depth, &depth).unwrap();
        assert!(fb.is_complete());

        fb.set_draw_buffers(&[Attachment::Color(0), Attachment::Color(1)]).unwrap();
        assert_eq!(fb.status(), FramebufferStatus::IncompleteDrawBuffer);

        fb.attach(Attachment::Color(1), &depth).unwrap();
        assert_eq!(fb.status(), FramebufferStatus::IncompleteAttachment);
    }

    #[test]
    fn clear_fills_draw_buffers() {
        let device: Arc<dyn Device> = HeadlessDevice::new(8, 8);
        let mut fb = Framebuffer::new(&device).unwrap();
        let color = Texture::new_2d(&device, TextureFormat::Rgba32F, 2, 2).unwrap();
        fb.attach(Attachment::Color(0), &color).unwrap();
        fb.set_draw_buffers(&[Attachment::Color(0)]).unwrap();
        fb.bind_draw().unwrap();
        device.clear_color([0.25, 0.5, 0.75, 1.0]);
        device.clear(ClearMask::COLOR).unwrap();
        let pixels = fb.read_pixels(Attachment::Color(0)).unwrap();
        assert_eq!(pixels.texels, vec![[0.25, 0.5, 0.75, 1.0]; 4]);
    }
}
