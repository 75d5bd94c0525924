//! Present pass: copy the accumulated color target into the output framebuffer.

use std::sync::Arc;

use umbra_gpu::{
    AttributeConfig, AttributeHandle, Buffer, BufferDataLayout, BufferFlags, Capability, DebugGroup, Device,
    Framebuffer, ObjectId, Primitive, Program, Texture, UniformValue, VertexLayout, NULL_OBJECT,
};

use crate::error::Result;

/// Two triangles covering clip space.
const QUAD_VERTICES: [[f32; 3]; 6] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
];

/// Quad vertex buffer with its own single-attribute layout.
#[derive(Debug)]
pub struct FullscreenQuad {
    device: Arc<dyn Device>,
    buffer: Buffer,
    _position: AttributeHandle,
    layout: VertexLayout,
}

impl FullscreenQuad {
    pub fn new(device: &Arc<dyn Device>) -> Result<Self> {
        let buffer = Buffer::from_slice(device, &QUAD_VERTICES, BufferFlags::empty())?;
        buffer.set_label("fullscreen_quad");
        let layout = VertexLayout::new(device)?;
        let position = layout.get_attribute(0)?;
        let config = AttributeConfig::floats(0, 3);
        position.configure(&config)?;
        layout.bind_buffer(0, &buffer, BufferDataLayout { offset: 0, stride: config.packed_stride() })?;
        Ok(Self { device: Arc::clone(device), buffer, _position: position, layout })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Bind the quad's layout and draw it with the current program.
    pub fn draw(&self) -> Result<()> {
        self.layout.bind()?;
        self.device.draw_arrays(Primitive::Triangles, 0, QUAD_VERTICES.len() as u32)?;
        Ok(())
    }
}

/// Draw framebuffer receiving the final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTarget(ObjectId);

impl OutputTarget {
    /// The window's default framebuffer.
    pub const DEFAULT: OutputTarget = OutputTarget(NULL_OBJECT);

    pub fn id(&self) -> ObjectId {
        self.0
    }
}

impl From<&Framebuffer> for OutputTarget {
    fn from(framebuffer: &Framebuffer) -> Self {
        OutputTarget(framebuffer.id())
    }
}

/// Label of the blit program.
pub const BLIT_PROGRAM: &str = "blit";
/// Sampler the blit program reads the G-buffer color from.
pub const BLIT_SAMPLER: &str = "input_tex";

#[derive(Debug)]
pub struct PresentPass {
    program: Program,
}

impl PresentPass {
    pub fn new(program: Program) -> Result<Self> {
        program.set_label(BLIT_PROGRAM);
        program.set_uniform(BLIT_SAMPLER, UniformValue::Int(0))?;
        Ok(Self { program })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn encode(
        &self,
        device: &dyn Device,
        color: &Texture,
        target: OutputTarget,
        quad: &FullscreenQuad,
    ) -> Result<()> {
        let _group = DebugGroup::push(device, "blit");
        device.set_capability(Capability::DepthTest, false);
        device.set_capability(Capability::Blend, false);
        device.depth_mask(false);
        device.bind_draw_framebuffer(target.id())?;
        let (width, height) = color.size();
        device.viewport(0, 0, width, height);
        self.program.use_program()?;
        color.bind(0)?;
        quad.draw()
    }
}
