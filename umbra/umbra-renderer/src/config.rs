//! Renderer configuration.

use std::path::PathBuf;
use std::time::Duration;

use umbra_gpu::{DEFAULT_CHUNK_COUNT, DEFAULT_FENCE_TIMEOUT};

use crate::light_pass::{LightRecord, MAX_LIGHTS};

/// Deferred renderer configuration.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// G-buffer resolution.
    pub width: u32,
    pub height: u32,
    /// Bytes of light records per frame; caps lights at `light_chunk_size / 64`.
    /// Ring chunks never shrink below the light block itself.
    pub light_chunk_size: usize,
    /// Chunks in flight.
    pub light_chunk_count: usize,
    /// Longest wait for a chunk before `render` fails with a transient error.
    pub fence_timeout: Duration,
    /// Clear color of every G-buffer color target.
    pub clear_color: [f32; 4],
    /// Load shaders from `<root>/{geometry_pass,shading,blit}` instead of the built-in sources.
    pub shader_root: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            light_chunk_size: MAX_LIGHTS * std::mem::size_of::<LightRecord>(),
            light_chunk_count: DEFAULT_CHUNK_COUNT,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_root: None,
        }
    }
}

impl RendererConfig {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height, ..Default::default() }
    }

    /// Light records one chunk can carry, capped at [`MAX_LIGHTS`].
    pub fn max_lights(&self) -> usize {
        (self.light_chunk_size / std::mem::size_of::<LightRecord>()).min(MAX_LIGHTS)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("resolution must be non-zero (got {}x{})", self.width, self.height));
        }
        if self.light_chunk_size < std::mem::size_of::<LightRecord>() {
            return Err(format!(
                "light chunk of {} bytes cannot hold a single {}-byte light record",
                self.light_chunk_size,
                std::mem::size_of::<LightRecord>()
            ));
        }
        if self.light_chunk_count == 0 {
            return Err("light chunk count must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_fits_the_light_limit() {
        let config = RendererConfig::default();
        assert_eq!(config.max_lights(), MAX_LIGHTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn small_chunks_lower_the_limit() {
        let config = RendererConfig { light_chunk_size: 10 * 64 + 12, ..Default::default() };
        assert_eq!(config.max_lights(), 10);
    }

    #[test]
    fn rejects_degenerate_configs() {
        assert!(RendererConfig::with_size(0, 480).validate().is_err());
        assert!(RendererConfig { light_chunk_size: 63, ..Default::default() }.validate().is_err());
        assert!(RendererConfig { light_chunk_count: 0, ..Default::default() }.validate().is_err());
    }
}
