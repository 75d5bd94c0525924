use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::device::{ObjectId, ObjectKind, ShaderStage};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create {kind:?}: {reason}")]
    ObjectCreation { kind: ObjectKind, reason: String },
    #[error("{kind:?} {id} does not exist")]
    UnknownObject { kind: ObjectKind, id: ObjectId },
    #[error("{stage:?} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("program failed to link:\n{log}")]
    ProgramLink { log: String },
    #[error("no shader stages found in {}", .0.display())]
    NoShaderStages(PathBuf),
    #[error("failed to read shader {}: {source}", .path.display())]
    ShaderIo { path: PathBuf, source: std::io::Error },
    #[error("program has no uniform block named `{0}`")]
    MissingUniformBlock(String),
    #[error("buffer {0} is already mapped")]
    AlreadyMapped(ObjectId),
    #[error("buffer {0} is not mapped")]
    NotMapped(ObjectId),
    #[error("range of {len} bytes at offset {offset} exceeds size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("fence not signaled within {0:?}")]
    FenceTimeout(Duration),
    #[error("fence wait failed")]
    FenceFailed,
    #[error("chunk {index} is still open; fence or release it before reacquiring")]
    ChunkStillOpen { index: usize },
    #[error("chunk handle belongs to a different ring buffer")]
    ForeignChunk,
    #[error("attempted to create aliasing vertex attribute {index}")]
    AliasingAttribute { index: u32 },
    #[error("vertex attribute index {index} exceeds the limit of {max}")]
    AttributeIndexOutOfRange { index: u32, max: u32 },
    #[error("vertex layout was dropped before its attribute handle")]
    LayoutGone,
}

impl GpuError {
    /// Transient errors may succeed when the same call is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, GpuError::FenceTimeout(_))
    }
}
