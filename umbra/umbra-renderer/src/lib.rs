//! Umbra Renderer: G-buffer geometry pass, fenced light streaming and additive deferred shading.

pub mod config;
pub mod error;
pub mod fixed_layout;
pub mod gbuffer;
pub mod light_pass;
pub mod mesh;
pub mod present;
pub mod tasks;

use std::sync::Arc;

use render_api::Camera;
use umbra_gpu::{ChunkHandle, Device, Program, RingConfig, ShaderStage, SyncedRingBuffer};

pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use fixed_layout::{FixedLayout, LayoutDesc, STANDARD_LAYOUT};
pub use gbuffer::{GBuffer, GBufferPass, GeometryStats};
pub use light_pass::{pack_lights, LightPass, LightRecord, LightSummary, MAX_LIGHTS};
pub use mesh::{Mesh, MeshBuffers, MeshId};
pub use present::{FullscreenQuad, OutputTarget, PresentPass, BLIT_PROGRAM, BLIT_SAMPLER};
pub use tasks::{DrawTaskList, LightDrawTask, MeshDrawTask};

const GEOMETRY_VS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/geometry_pass/main.vs"));
const GEOMETRY_FS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/geometry_pass/main.fs"));
const SHADING_VS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/shading/main.vs"));
const SHADING_FS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/shading/main.fs"));
const BLIT_VS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/blit/main.vs"));
const BLIT_FS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/deferred/blit/main.fs"));

/// Per-frame counters returned by [`Renderer::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub mesh_draws: usize,
    pub sub_range_draws: usize,
    pub lights: usize,
    pub global_lights: usize,
    pub volume_lights: usize,
    /// Light ring chunk used by the frame.
    pub chunk_index: usize,
}

pub struct Renderer {
    device: Arc<dyn Device>,
    config: RendererConfig,
    gbuffer: GBuffer,
    gbuffer_pass: GBufferPass,
    light_pass: LightPass,
    present_pass: PresentPass,
    quad: FullscreenQuad,
    lights: SyncedRingBuffer,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").field("config", &self.config).field("lights", &self.lights).finish()
    }
}

fn load_program(device: &Arc<dyn Device>, config: &RendererConfig, name: &str, vs: &str, fs: &str) -> Result<Program> {
    let program = match &config.shader_root {
        Some(root) => umbra_gpu::load_program_from_directory(device, &root.join(name))?,
        None => Program::from_sources(device, &[(ShaderStage::Vertex, vs), (ShaderStage::Fragment, fs)])?,
    };
    Ok(program)
}

/// Close a chunk whose frame is over. A chunk whose fence cannot be armed is
/// released so the ring can hand it out again.
fn retire_chunk(lights: &mut SyncedRingBuffer, chunk: ChunkHandle) -> Result<()> {
    match lights.fence(chunk) {
        Ok(()) => Ok(()),
        Err(e) => {
            lights.release(chunk)?;
            Err(e.into())
        }
    }
}

impl Renderer {
    pub fn new(device: Arc<dyn Device>, config: RendererConfig) -> Result<Self> {
        config.validate().map_err(RenderError::InvalidConfig)?;

        let geometry = load_program(&device, &config, "geometry_pass", GEOMETRY_VS, GEOMETRY_FS)?;
        let shading = load_program(&device, &config, "shading", SHADING_VS, SHADING_FS)?;
        let blit = load_program(&device, &config, "blit", BLIT_VS, BLIT_FS)?;

        let gbuffer = GBuffer::new(&device, config.width, config.height)?;
        let gbuffer_pass = GBufferPass::new(&device, geometry)?;
        let light_pass = LightPass::new(shading)?;
        let present_pass = PresentPass::new(blit)?;
        let quad = FullscreenQuad::new(&device)?;

        // The bound range must cover the whole light block, however few lights a chunk carries.
        let block_size = MAX_LIGHTS * std::mem::size_of::<LightRecord>();
        let ring_config = RingConfig {
            chunk_count: config.light_chunk_count,
            fence_timeout: config.fence_timeout,
            alignment: device.uniform_buffer_offset_alignment(),
            ..RingConfig::new(config.light_chunk_size.max(block_size))
        };
        let lights = SyncedRingBuffer::new(&device, &ring_config)?;
        lights.buffer().set_label("light_ring");

        log::info!(
            "renderer ready: {}x{}, {} light chunks of {} bytes at stride {} (max {} lights)",
            config.width,
            config.height,
            config.light_chunk_count,
            lights.chunk_size(),
            lights.chunk_stride(),
            config.max_lights()
        );
        Ok(Self { device, config, gbuffer, gbuffer_pass, light_pass, present_pass, quad, lights })
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn gbuffer_pass(&self) -> &GBufferPass {
        &self.gbuffer_pass
    }

    pub fn max_lights(&self) -> usize {
        self.config.max_lights()
    }

    /// Render one frame into `target`.
    ///
    /// Lights are packed on a worker thread while the geometry pass is issued.
    /// Fails with a transient [`umbra_gpu::GpuError::FenceTimeout`] when no light chunk
    /// drains in time; the frame can be resubmitted.
    pub fn render(&mut self, tasks: DrawTaskList, camera: &Camera, target: OutputTarget) -> Result<FrameStats> {
        let DrawTaskList { meshes, mut lights } = tasks;
        let max = self.config.max_lights();
        let device = &*self.device;

        let chunk = self.lights.acquire_chunk()?;
        let slot = self.lights.chunk_mut(&chunk)?;

        let gbuffer_pass = &self.gbuffer_pass;
        let gbuffer = &self.gbuffer;
        let clear_color = self.config.clear_color;
        let (geometry, packed) = std::thread::scope(|scope| {
            let packer = scope.spawn(move || light_pass::pack_lights(&mut lights, slot, max));
            let geometry = gbuffer_pass.encode(device, gbuffer, &meshes, camera, clear_color);
            let packed = packer.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (geometry, packed)
        });

        let (geometry, summary) = match (geometry, packed) {
            (Ok(geometry), Ok(summary)) => (geometry, summary),
            (Err(e), _) | (_, Err(e)) => {
                self.lights.release(chunk)?;
                return Err(e);
            }
        };

        // Fenced even when shading fails; earlier commands may still read the chunk.
        let shaded = self
            .light_pass
            .encode(device, &self.gbuffer, &self.lights, &chunk, &self.quad, &summary)
            .and_then(|()| self.lights.flush(&chunk).map_err(RenderError::from));
        let retired = retire_chunk(&mut self.lights, chunk);
        shaded?;
        retired?;

        self.present_pass.encode(device, self.gbuffer.color(), target, &self.quad)?;

        let stats = FrameStats {
            mesh_draws: geometry.mesh_draws,
            sub_range_draws: geometry.sub_range_draws,
            lights: summary.lights,
            global_lights: summary.global_lights,
            volume_lights: summary.volume_lights,
            chunk_index: chunk.index(),
        };
        log::debug!("frame: {:?}", stats);
        Ok(stats)
    }
}
