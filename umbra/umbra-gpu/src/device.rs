//! The device trait: a direct-state-access graphics API surface.
//!
//! Objects are named by plain integer identifiers; `0` is the null object and
//! also names the default framebuffer. Ownership of identifiers is layered on
//! top of this trait by [`crate::object::DeviceObject`].

use std::fmt::Debug;
use std::ptr::NonNull;
use std::time::Duration;

use crate::error::GpuError;

/// Device object identifier. `0` is null.
pub type ObjectId = u32;

pub const NULL_OBJECT: ObjectId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    VertexArray,
    Framebuffer,
    Shader,
    Program,
}

bitflags::bitflags! {
    /// Immutable storage flags fixed at buffer creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Contents may be updated with `buffer_sub_data`.
        const DYNAMIC_STORAGE = 1 << 0;
        const MAP_READ = 1 << 1;
        const MAP_WRITE = 1 << 2;
        /// The buffer may stay mapped while the device uses it.
        const MAP_PERSISTENT = 1 << 3;
        const MAP_COHERENT = 1 << 4;
        const CLIENT_STORAGE = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Access requested by a single `map_buffer_range` call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const PERSISTENT = 1 << 2;
        const COHERENT = 1 << 3;
        /// Writes become visible only through `flush_mapped_buffer_range`.
        const FLUSH_EXPLICIT = 1 << 4;
        const UNSYNCHRONIZED = 1 << 5;
        const INVALIDATE_RANGE = 1 << 6;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Depth32F,
    Rgb8,
    Rgba8,
    Rgb16F,
    Rgba16F,
    Rgb32F,
    Rgba32F,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32F)
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, TextureFormat::Rgba8 | TextureFormat::Rgba16F | TextureFormat::Rgba32F)
    }

    /// Normalized fixed-point formats clamp to [0, 1].
    pub fn is_normalized(self) -> bool {
        matches!(self, TextureFormat::Rgb8 | TextureFormat::Rgba8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    IncompleteDrawBuffer,
    Unsupported,
}

/// RGBA float readback of one image. Row-major, bottom row first.
#[derive(Clone, Debug, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl Readback {
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Stage for a shader file suffix (`vs`, `tcs`, `tes`, `gs`, `fs`, `cs`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "vs" => Some(ShaderStage::Vertex),
            "tcs" => Some(ShaderStage::TessControl),
            "tes" => Some(ShaderStage::TessEvaluation),
            "gs" => Some(ShaderStage::Geometry),
            "fs" => Some(ShaderStage::Fragment),
            "cs" => Some(ShaderStage::Compute),
            _ => None,
        }
    }
}

/// Result of a compile or link step: success flag and the info log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub success: bool,
    pub log: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ScalarType {
    pub fn size(self) -> u32 {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Primitive {
    Points,
    Lines,
    #[default]
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    DepthTest,
    Blend,
    CullFace,
    ScissorTest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompareFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Opaque fence sync object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    AlreadySignaled,
    ConditionSatisfied,
    TimeoutExpired,
    WaitFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugSeverity {
    High,
    Medium,
    Low,
    Notification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugSource {
    Api,
    WindowSystem,
    ShaderCompiler,
    ThirdParty,
    Application,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugKind {
    Error,
    DeprecatedBehavior,
    UndefinedBehavior,
    Portability,
    Performance,
    Marker,
    PushGroup,
    PopGroup,
    Other,
}

#[derive(Clone, Debug)]
pub struct DebugMessage {
    pub source: DebugSource,
    pub kind: DebugKind,
    pub severity: DebugSeverity,
    pub id: u32,
    pub message: String,
}

pub type DebugCallback = Box<dyn Fn(&DebugMessage) + Send + Sync>;

/// The graphics device. Every call is issued from the thread that drives
/// rendering; implementations may still be shared behind `Arc`.
pub trait Device: Send + Sync + Debug {
    // Objects.
    /// Create a buffer with immutable storage of `size` bytes, optionally initialized.
    fn create_buffer(&self, size: usize, data: Option<&[u8]>, flags: BufferFlags) -> Result<ObjectId, GpuError>;
    fn create_texture(&self, desc: &TextureDesc) -> Result<ObjectId, GpuError>;
    fn create_vertex_array(&self) -> Result<ObjectId, GpuError>;
    fn create_framebuffer(&self) -> Result<ObjectId, GpuError>;
    fn create_shader(&self, stage: ShaderStage) -> Result<ObjectId, GpuError>;
    fn create_program(&self) -> Result<ObjectId, GpuError>;
    /// Release an object. Destroying the null object is a no-op.
    fn destroy_object(&self, kind: ObjectKind, id: ObjectId);
    fn object_label(&self, kind: ObjectKind, id: ObjectId, label: &str);

    // Buffers.
    fn buffer_sub_data(&self, buffer: ObjectId, offset: usize, data: &[u8]) -> Result<(), GpuError>;
    fn get_buffer_sub_data(&self, buffer: ObjectId, offset: usize, out: &mut [u8]) -> Result<(), GpuError>;
    /// Map `len` bytes at `offset`. The pointer stays valid until `unmap_buffer` or destruction.
    fn map_buffer_range(&self, buffer: ObjectId, offset: usize, len: usize, access: MapAccess) -> Result<NonNull<u8>, GpuError>;
    /// Offsets are relative to the start of the mapped range.
    fn flush_mapped_buffer_range(&self, buffer: ObjectId, offset: usize, len: usize) -> Result<(), GpuError>;
    fn unmap_buffer(&self, buffer: ObjectId) -> Result<(), GpuError>;
    /// `offset` must be a multiple of [`uniform_buffer_offset_alignment`](Self::uniform_buffer_offset_alignment).
    fn bind_uniform_buffer_range(&self, binding: u32, buffer: ObjectId, offset: usize, size: usize) -> Result<(), GpuError>;
    /// GL's `UNIFORM_BUFFER_OFFSET_ALIGNMENT`.
    fn uniform_buffer_offset_alignment(&self) -> usize;

    // Textures.
    fn texture_filter(&self, texture: ObjectId, min: Filter, mag: Filter) -> Result<(), GpuError>;
    fn bind_texture_unit(&self, unit: u32, texture: ObjectId) -> Result<(), GpuError>;
    fn get_texture_image(&self, texture: ObjectId) -> Result<Readback, GpuError>;

    // Framebuffers. Framebuffer `0` is the default (window) framebuffer.
    fn framebuffer_texture(&self, framebuffer: ObjectId, attachment: Attachment, texture: ObjectId) -> Result<(), GpuError>;
    fn framebuffer_draw_buffers(&self, framebuffer: ObjectId, buffers: &[Attachment]) -> Result<(), GpuError>;
    fn check_framebuffer_status(&self, framebuffer: ObjectId) -> FramebufferStatus;
    fn bind_draw_framebuffer(&self, framebuffer: ObjectId) -> Result<(), GpuError>;
    fn read_pixels(&self, framebuffer: ObjectId, attachment: Attachment) -> Result<Readback, GpuError>;

    // Vertex arrays.
    fn vertex_array_vertex_buffer(&self, vao: ObjectId, binding: u32, buffer: ObjectId, offset: usize, stride: u32) -> Result<(), GpuError>;
    fn vertex_array_element_buffer(&self, vao: ObjectId, buffer: ObjectId) -> Result<(), GpuError>;
    fn vertex_array_attrib_format(
        &self,
        vao: ObjectId,
        attrib: u32,
        size: u32,
        ty: ScalarType,
        normalized: bool,
        relative_offset: u32,
    ) -> Result<(), GpuError>;
    fn vertex_array_attrib_binding(&self, vao: ObjectId, attrib: u32, binding: u32) -> Result<(), GpuError>;
    fn vertex_array_attrib_enabled(&self, vao: ObjectId, attrib: u32, enabled: bool) -> Result<(), GpuError>;
    fn bind_vertex_array(&self, vao: ObjectId) -> Result<(), GpuError>;

    // Shaders and programs.
    fn compile_shader(&self, shader: ObjectId, source: &str) -> BuildOutput;
    fn link_program(&self, program: ObjectId, shaders: &[ObjectId]) -> BuildOutput;
    fn use_program(&self, program: ObjectId) -> Result<(), GpuError>;
    /// `None` for names the program does not use (GL's `-1`).
    fn uniform_location(&self, program: ObjectId, name: &str) -> Option<i32>;
    fn program_uniform(&self, program: ObjectId, location: i32, value: UniformValue) -> Result<(), GpuError>;
    fn uniform_block_index(&self, program: ObjectId, name: &str) -> Option<u32>;
    fn uniform_block_binding(&self, program: ObjectId, block: u32, binding: u32) -> Result<(), GpuError>;

    // Fixed-function state.
    fn set_capability(&self, capability: Capability, enabled: bool);
    fn depth_func(&self, func: CompareFunc);
    fn depth_mask(&self, write: bool);
    fn blend_func(&self, src: BlendFactor, dst: BlendFactor);
    fn blend_equation(&self, equation: BlendEquation);
    fn clear_color(&self, rgba: [f32; 4]);
    fn clear(&self, mask: ClearMask) -> Result<(), GpuError>;
    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);

    // Draws.
    fn draw_arrays(&self, primitive: Primitive, first: u32, count: u32) -> Result<(), GpuError>;
    /// `offset` is a byte offset into the bound element buffer.
    fn draw_elements_base_vertex(
        &self,
        primitive: Primitive,
        count: u32,
        index_type: IndexType,
        offset: usize,
        base_vertex: i32,
    ) -> Result<(), GpuError>;

    // Synchronization.
    /// Insert a fence that signals once all previously issued commands complete.
    fn fence_sync(&self) -> Result<SyncHandle, GpuError>;
    /// Flushes pending commands and blocks up to `timeout`.
    fn client_wait_sync(&self, sync: SyncHandle, timeout: Duration) -> WaitStatus;
    fn delete_sync(&self, sync: SyncHandle);

    // Debug output.
    fn push_debug_group(&self, message: &str);
    fn pop_debug_group(&self);
    /// Replace the debug message callback; `None` disables debug output.
    fn set_debug_callback(&self, callback: Option<DebugCallback>);
}
