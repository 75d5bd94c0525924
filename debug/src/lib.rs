//! Shared setup for the debug programs: logging and a small demo scene rendered on the headless device.

use std::path::Path;
use std::sync::{Arc, Once};

use render_api::math::{rotation_y, translation};
use render_api::{load_obj, Camera, ImportOptions, MeshData};
use umbra_gpu::{Attachment, Device, HeadlessDevice, Readback, NULL_OBJECT};
use umbra_renderer::{
    DrawTaskList, FrameStats, LightDrawTask, Mesh, OutputTarget, Renderer, RendererConfig, BLIT_PROGRAM, BLIT_SAMPLER,
};

static INIT: Once = Once::new();

/// Initialize `env_logger` once. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match std::env::var("RUST_LOG") {
            Ok(filter) => builder.parse_filters(&filter),
            Err(_) => builder.parse_filters(default_filter),
        };
        builder.init();
        log::debug!("logging initialized");
    });
}

/// Scene mesh: the OBJ at `path` if given, otherwise a unit cube.
pub fn scene_mesh(path: Option<&Path>) -> Result<MeshData, String> {
    match path {
        Some(path) => load_obj(path, &ImportOptions::default()).map_err(|e| format!("{}: {}", path.display(), e)),
        None => Ok(MeshData::cube()),
    }
}

/// Headless device plus renderer at a fixed resolution.
pub struct DemoScene {
    pub device: Arc<HeadlessDevice>,
    pub renderer: Renderer,
    mesh: Arc<Mesh>,
    camera: Camera,
}

impl DemoScene {
    pub fn new(width: u32, height: u32, mesh: MeshData) -> Result<Self, String> {
        let device = HeadlessDevice::new(width, height);
        // Readback shows the presented G-buffer color.
        device.evaluate_copy_pass(BLIT_PROGRAM, BLIT_SAMPLER);
        let shared: Arc<dyn Device> = device.clone();
        umbra_gpu::install_log_callback(&shared);
        let config = RendererConfig { clear_color: [0.08, 0.1, 0.14, 1.0], ..RendererConfig::with_size(width, height) };
        let renderer = Renderer::new(shared, config).map_err(|e| e.to_string())?;
        let mesh = Arc::new(Mesh::new(renderer.device(), mesh).map_err(|e| e.to_string())?);
        let mut camera = Camera::perspective(45f32.to_radians(), width as f32 / height.max(1) as f32, 0.1, 100.0);
        camera.look_at([0.0, 1.5, 4.0], [0.0; 3], [0.0, 1.0, 0.0]);
        Ok(Self { device, renderer, mesh, camera })
    }

    /// Render one frame at `time` seconds into the default framebuffer.
    pub fn render(&mut self, time: f32) -> Result<FrameStats, String> {
        let mut tasks = DrawTaskList::new();
        tasks.push_mesh(Arc::clone(&self.mesh), rotation_y(time * 0.5));
        tasks.push_mesh(Arc::clone(&self.mesh), translation([1.5, 0.0, -1.0]));
        tasks
            .push_light(LightDrawTask::ambient([0.2, 0.2, 0.25], 1.0))
            .push_light(LightDrawTask::directional([0.3, -0.8, -0.5], [1.0, 0.95, 0.9], 1.2))
            .push_light(LightDrawTask::point([0.0, 2.0, 1.0], [1.0, 0.6, 0.3], 4.0, 0.5));
        self.renderer.render(tasks, &self.camera, OutputTarget::DEFAULT).map_err(|e| e.to_string())
    }

    pub fn read_frame(&self) -> Result<Readback, String> {
        self.device.read_pixels(NULL_OBJECT, Attachment::Color(0)).map_err(|e| e.to_string())
    }
}

/// RGBA8 bytes of a readback, top row first.
pub fn to_rgba8(image: &Readback) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(image.texels.len() * 4);
    for row in image.texels.chunks_exact(image.width as usize).rev() {
        for texel in row {
            bytes.extend(texel.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_flips_rows() {
        let image = Readback {
            width: 1,
            height: 2,
            texels: vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 0.5]],
        };
        assert_eq!(to_rgba8(&image), vec![0, 0, 255, 128, 255, 0, 0, 255]);
    }

    #[test]
    fn demo_scene_renders_its_lights() {
        let mut scene = DemoScene::new(32, 16, scene_mesh(None).unwrap()).unwrap();
        let stats = scene.render(0.0).unwrap();
        assert_eq!((stats.mesh_draws, stats.global_lights, stats.volume_lights), (2, 2, 1));
        let frame = scene.read_frame().unwrap();
        assert_eq!(frame.texels.len(), 32 * 16);
        let clear = [0.08, 0.1, 0.14, 1.0];
        let texel = frame.texel(0, 0);
        assert!((0..4).all(|c| (texel[c] - clear[c]).abs() <= 1.0 / 255.0), "{:?}", texel);
    }
}
