//! Render one frame on the headless device and save it as a PNG.
//! Run: cargo run -p debug --bin headless_frame -- [out.png] [model.obj]

use std::path::{Path, PathBuf};

use debug::{init_logging, scene_mesh, to_rgba8, DemoScene};

fn main() -> Result<(), String> {
    init_logging("info,umbra_gpu=warn");
    let mut args = std::env::args().skip(1);
    let out = PathBuf::from(args.next().unwrap_or_else(|| "umbra_frame.png".into()));
    let model = args.next().map(PathBuf::from);

    let mut scene = DemoScene::new(640, 480, scene_mesh(model.as_deref())?)?;
    let stats = scene.render(0.0)?;
    log::info!("{:?}", stats);

    let frame = scene.read_frame()?;
    save_png(&out, frame.width, frame.height, to_rgba8(&frame))?;
    log::info!("wrote {}", out.display());
    Ok(())
}

fn save_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<(), String> {
    let image = image::RgbaImage::from_raw(width, height, rgba).ok_or("frame size does not match its pixels")?;
    image.save(path).map_err(|e| e.to_string())
}
