//! Umbra GPU: ownership-safe wrappers over a direct-state-access graphics device.
//!
//! The [`Device`] trait is the raw API; everything else in this crate owns
//! device objects through RAII handles, synchronizes CPU writes with fences and
//! manages vertex attribute slots. [`HeadlessDevice`] is a software reference
//! backend used by tests and offline tools.

pub mod buffer;
pub mod debug;
pub mod device;
pub mod error;
pub mod fence;
pub mod framebuffer;
pub mod headless;
pub mod object;
pub mod ring;
pub mod shader;
pub mod texture;
pub mod vertex_array;

pub use buffer::Buffer;
pub use debug::{install_log_callback, DebugGroup};
pub use device::{
    Attachment, BlendEquation, BlendFactor, BufferFlags, BuildOutput, Capability, ClearMask, CompareFunc, Device,
    Filter, FramebufferStatus, IndexType, MapAccess, ObjectId, ObjectKind, Primitive, Readback, ScalarType,
    ShaderStage, TextureDesc, TextureFormat, UniformValue, NULL_OBJECT,
};
pub use error::GpuError;
pub use fence::FenceSync;
pub use framebuffer::Framebuffer;
pub use headless::{Command, DrawKind, DrawRecord, HeadlessDevice};
pub use object::DeviceObject;
pub use ring::{ChunkHandle, RingAccess, RingConfig, SyncedRingBuffer, DEFAULT_CHUNK_COUNT, DEFAULT_FENCE_TIMEOUT};
pub use shader::{load_program_from_directory, Program, Shader};
pub use texture::Texture;
pub use vertex_array::{AttributeConfig, AttributeHandle, BufferDataLayout, VertexArray, VertexLayout, MAX_VERTEX_ATTRIBS};
