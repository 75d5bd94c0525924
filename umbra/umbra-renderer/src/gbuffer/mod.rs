//! G-buffer targets and the geometry pass that fills them.
//!
//! Draw buffer layout (fragment output locations):
//!
//! | location | target   | format   | contents                              |
//! |----------|----------|----------|---------------------------------------|
//! | 0        | color    | Rgb16F   | HDR accumulation, written by lighting |
//! | 1        | position | Rgb32F   | view-space position                   |
//! | 2        | normal   | Rgb16F   | view-space normal                     |
//! | 3        | diffuse  | Rgb8     | diffuse albedo                        |
//! | 4        | specular | Rgb8     | intensity, exponent, roughness        |
//!
//! Depth is a separate `Depth32F` attachment.

use std::sync::Arc;

use render_api::math::mat4_mul;
use render_api::Camera;
use umbra_gpu::{
    Attachment, Capability, ClearMask, CompareFunc, DebugGroup, Device, Filter, Framebuffer, FramebufferStatus,
    IndexType, Primitive, Program, Texture, TextureFormat, UniformValue,
};

use crate::error::{RenderError, Result};
use crate::fixed_layout::FixedLayout;
use crate::tasks::MeshDrawTask;

pub const COLOR_UNIT_LAYOUT: [Attachment; 5] = [
    Attachment::Color(0),
    Attachment::Color(1),
    Attachment::Color(2),
    Attachment::Color(3),
    Attachment::Color(4),
];

#[derive(Debug)]
pub struct GBuffer {
    framebuffer: Framebuffer,
    depth: Texture,
    color: Texture,
    position: Texture,
    normal: Texture,
    diffuse: Texture,
    specular: Texture,
    width: u32,
    height: u32,
}

impl GBuffer {
    pub fn new(device: &Arc<dyn Device>, width: u32, height: u32) -> Result<Self> {
        let target = |format: TextureFormat, label: &str| -> Result<Texture> {
            let texture = Texture::new_2d(device, format, width, height)?;
            texture.set_filter(Filter::Linear, Filter::Linear)?;
            texture.set_label(label);
            Ok(texture)
        };
        let depth = target(TextureFormat::Depth32F, "gbuffer_depth")?;
        let color = target(TextureFormat::Rgb16F, "gbuffer_color")?;
        let position = target(TextureFormat::Rgb32F, "gbuffer_position")?;
        let normal = target(TextureFormat::Rgb16F, "gbuffer_normal")?;
        let diffuse = target(TextureFormat::Rgb8, "gbuffer_diffuse")?;
        let specular = target(TextureFormat::Rgb8, "gbuffer_specular")?;

        let mut framebuffer = Framebuffer::new(device)?;
        framebuffer.set_label("gbuffer");
        framebuffer.attach(Attachment::Depth, &depth)?;
        for (attachment, texture) in COLOR_UNIT_LAYOUT.iter().zip([&color, &position, &normal, &diffuse, &specular]) {
            framebuffer.attach(*attachment, texture)?;
        }
        framebuffer.set_draw_buffers(&COLOR_UNIT_LAYOUT)?;
        match framebuffer.status() {
            FramebufferStatus::Complete => {}
            status => return Err(RenderError::IncompleteFramebuffer(status)),
        }
        log::debug!("G-buffer {}x{} (framebuffer {})", width, height, framebuffer.id());
        Ok(Self { framebuffer, depth, color, position, normal, diffuse, specular, width, height })
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn depth(&self) -> &Texture {
        &self.depth
    }

    pub fn color(&self) -> &Texture {
        &self.color
    }

    pub fn position(&self) -> &Texture {
        &self.position
    }

    pub fn normal(&self) -> &Texture {
        &self.normal
    }

    pub fn diffuse(&self) -> &Texture {
        &self.diffuse
    }

    pub fn specular(&self) -> &Texture {
        &self.specular
    }

    /// Bind for the geometry pass: all five color targets.
    pub fn bind_all_targets(&self) -> Result<()> {
        self.framebuffer.bind_draw()?;
        self.framebuffer.set_draw_buffers(&COLOR_UNIT_LAYOUT)?;
        Ok(())
    }

    /// Bind for accumulation: the color target only.
    pub fn bind_color_target(&self) -> Result<()> {
        self.framebuffer.bind_draw()?;
        self.framebuffer.set_draw_buffers(&[Attachment::Color(0)])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryStats {
    pub mesh_draws: usize,
    pub sub_range_draws: usize,
}

/// Geometry pass: rasterizes mesh tasks into the G-buffer.
#[derive(Debug)]
pub struct GBufferPass {
    program: Program,
    layout: FixedLayout,
}

impl GBufferPass {
    pub fn new(device: &Arc<dyn Device>, program: Program) -> Result<Self> {
        program.set_label("geometry_pass");
        Ok(Self { program, layout: FixedLayout::standard(device)? })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn layout(&self) -> &FixedLayout {
        &self.layout
    }

    pub fn encode(
        &self,
        device: &dyn Device,
        gbuffer: &GBuffer,
        meshes: &[MeshDrawTask],
        camera: &Camera,
        clear_color: [f32; 4],
    ) -> Result<GeometryStats> {
        let _group = DebugGroup::push(device, "geometry_pass");

        gbuffer.bind_all_targets()?;
        let (width, height) = gbuffer.size();
        device.viewport(0, 0, width, height);
        self.layout.bind_layout()?;
        self.program.use_program()?;

        device.clear_color(clear_color);
        device.depth_mask(true);
        device.set_capability(Capability::DepthTest, true);
        device.depth_func(CompareFunc::Less);
        device.set_capability(Capability::Blend, false);
        device.clear(ClearMask::COLOR | ClearMask::DEPTH)?;

        let view_projection = camera.view_projection();
        self.program.set_uniform("mat_view", UniformValue::Mat4(*camera.view()))?;
        self.program.set_uniform("mat_proj", UniformValue::Mat4(*camera.projection()))?;
        self.program.set_uniform("mat_vp", UniformValue::Mat4(view_projection))?;

        let mut stats = GeometryStats::default();
        for task in meshes {
            let buffers = task.mesh.buffers();
            self.layout.bind_index_buffer(buffers)?;
            self.layout.bind(buffers)?;
            self.program.set_uniform("mat_model", UniformValue::Mat4(task.transform))?;
            self.program.set_uniform("mat_mvp", UniformValue::Mat4(mat4_mul(&view_projection, &task.transform)))?;

            let data = task.mesh.data();
            for (range, material) in data.sub_ranges.iter().zip(&data.materials) {
                self.program.set_uniform("mat_diffuse", UniformValue::Vec3(material.diffuse))?;
                self.program.set_uniform("mat_specular", UniformValue::Vec3(material.specular))?;
                self.program.set_uniform("mat_shininess", UniformValue::Float(material.shininess))?;
                let offset = range.base_index as usize * IndexType::U32.size();
                device.draw_elements_base_vertex(Primitive::Triangles, range.element_count, IndexType::U32, offset, 0)?;
                stats.sub_range_draws += 1;
            }
            log::trace!("mesh {:?}: {} sub-ranges", task.mesh.id(), data.sub_ranges.len());
            stats.mesh_draws += 1;
        }
        log::debug!("geometry pass: {} meshes, {} draws", stats.mesh_draws, stats.sub_range_draws);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_gpu::HeadlessDevice;

    #[test]
    fn gbuffer_is_complete_with_five_targets() {
        let headless = HeadlessDevice::new(8, 8);
        let device: Arc<dyn Device> = headless.clone();
        let gbuffer = GBuffer::new(&device, 8, 8).unwrap();
        assert!(gbuffer.framebuffer().is_complete());
        assert_eq!(gbuffer.framebuffer().attachments().len(), 6);
        assert_eq!(gbuffer.position().format(), TextureFormat::Rgb32F);
        assert_eq!(headless.label(umbra_gpu::ObjectKind::Texture, gbuffer.normal().id()).as_deref(), Some("gbuffer_normal"));
    }

    #[test]
    fn color_target_binding_narrows_draw_buffers() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let gbuffer = GBuffer::new(&device, 4, 4).unwrap();
        gbuffer.bind_color_target().unwrap();
        device.clear_color([0.5, 0.25, 0.0, 1.0]);
        device.clear(ClearMask::COLOR).unwrap();
        assert_eq!(gbuffer.color().read_image().unwrap().texel(1, 1), [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(gbuffer.normal().read_image().unwrap().texel(1, 1), [0.0, 0.0, 0.0, 1.0]);
    }
}
