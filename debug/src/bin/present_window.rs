//! Show headless Umbra frames in a window: each redraw renders a frame,
//! uploads the readback to a wgpu texture and copies it to the surface.
//! Run: cargo run -p debug --bin present_window -- [model.obj]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use debug::{init_logging, scene_mesh, to_rgba8, DemoScene};
use render_api::MeshData;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    frame: wgpu::Texture,
}

impl Gpu {
    fn new(window: Arc<Window>) -> Result<Self, String> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window).map_err(|e| e.to_string())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            ..Default::default()
        }))
        .ok_or("no compatible adapter")?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
            .map_err(|e| e.to_string())?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| *f == wgpu::TextureFormat::Rgba8Unorm || *f == wgpu::TextureFormat::Bgra8Unorm)
            .ok_or("surface has no 8-bit unorm format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let frame = frame_texture(&device, config.width, config.height, format);
        Ok(Self { surface, device, queue, config, frame })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.frame = frame_texture(&self.device, self.config.width, self.config.height, self.config.format);
    }

    fn present(&self, width: u32, height: u32, mut rgba: Vec<u8>) -> Result<(), String> {
        if self.config.format == wgpu::TextureFormat::Bgra8Unorm {
            rgba.chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
        }
        let extent = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        self.queue.write_texture(
            self.frame.as_image_copy(),
            &rgba,
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
            extent,
        );
        let output = self.surface.get_current_texture().map_err(|e| e.to_string())?;
        let copy = wgpu::Extent3d {
            width: width.min(self.config.width),
            height: height.min(self.config.height),
            depth_or_array_layers: 1,
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("present") });
        encoder.copy_texture_to_texture(self.frame.as_image_copy(), output.texture.as_image_copy(), copy);
        self.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn frame_texture(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra_frame"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

struct App {
    mesh: MeshData,
    started: Instant,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    scene: Option<DemoScene>,
}

impl App {
    fn rebuild_scene(&mut self, width: u32, height: u32) {
        match DemoScene::new(width.max(1), height.max(1), self.mesh.clone()) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => log::error!("scene setup failed: {}", e),
        }
    }

    fn redraw(&mut self) -> Result<(), String> {
        let (Some(gpu), Some(scene)) = (&self.gpu, &mut self.scene) else { return Ok(()) };
        match scene.render(self.started.elapsed().as_secs_f32()) {
            Ok(_) => {}
            Err(e) => {
                log::warn!("frame skipped: {}", e);
                return Ok(());
            }
        }
        let frame = scene.read_frame()?;
        gpu.present(frame.width, frame.height, to_rgba8(&frame))
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("Umbra (headless frames)")
            .with_inner_size(winit::dpi::LogicalSize::new(800, 600));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        match Gpu::new(Arc::clone(&window)) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                log::error!("wgpu setup failed: {}", e);
                event_loop.exit();
                return;
            }
        }
        let size = window.inner_size();
        self.rebuild_scene(size.width, size.height);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
                self.rebuild_scene(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    log::error!("present failed: {}", e);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), String> {
    init_logging("info,wgpu_core=warn,wgpu_hal=warn");
    let model = std::env::args().nth(1).map(PathBuf::from);
    let mesh = scene_mesh(model.as_deref())?;

    let event_loop = winit::event_loop::EventLoop::new().map_err(|e| e.to_string())?;
    let mut app = App { mesh, started: Instant::now(), window: None, gpu: None, scene: None };
    event_loop.run_app(&mut app).map_err(|e| e.to_string())?;
    Ok(())
}
