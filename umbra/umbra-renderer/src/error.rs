use render_api::MeshError;
use thiserror::Error;
use umbra_gpu::{FramebufferStatus, GpuError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("mesh data is incomplete: indices, positions and normals are all required")]
    IncompleteMesh,

    #[error("G-buffer framebuffer is incomplete ({0:?})")]
    IncompleteFramebuffer(FramebufferStatus),

    #[error("{count} lights submitted, at most {max} fit in one frame")]
    TooManyLights { count: usize, max: usize },

    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),

    #[error("shading program does not declare uniform block `{0}`")]
    MissingUniformBlock(String),
}

impl RenderError {
    /// Retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Gpu(e) if e.is_transient())
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
