//! Light packing and the additive lighting pass.
//!
//! Lights are sorted into processing order and written as [`LightRecord`]s
//! into a chunk of the light ring buffer, which the shading program reads as
//! the `LIGHTS_UBO` uniform block. Packing never touches the device, so it
//! runs on a worker thread while the geometry pass is being issued.

use bytemuck::{Pod, Zeroable};
use render_api::math::normalize;
use render_api::LightVolume;
use umbra_gpu::{
    BlendEquation, BlendFactor, Capability, ChunkHandle, DebugGroup, Device, GpuError, Program, SyncedRingBuffer,
    UniformValue,
};

use crate::error::{RenderError, Result};
use crate::gbuffer::GBuffer;
use crate::present::FullscreenQuad;
use crate::tasks::{global_run, sort_lights, LightDrawTask};

/// Upper bound on lights per frame, fixed by the shading program's block size.
pub const MAX_LIGHTS: usize = 128;

/// Name of the light block in the shading program.
pub const LIGHTS_BLOCK: &str = "LIGHTS_UBO";

/// Uniform-buffer binding point of the light block.
pub const LIGHTS_BINDING: u32 = 0;

/// std140 image of one light in `LIGHTS_UBO`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightRecord {
    pub kind: i32,
    pub blend: f32,
    _pad: [i32; 2],
    /// rgb: color scaled by power, a: specular weight.
    pub color: [f32; 4],
    /// xyz: position, w: falloff.
    pub position: [f32; 4],
    /// xyz: unit direction, w: cone angle.
    pub direction: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<LightRecord>() == 64);

impl From<&LightDrawTask> for LightRecord {
    fn from(task: &LightDrawTask) -> Self {
        let [r, g, b] = task.color;
        let [px, py, pz] = task.position;
        let [dx, dy, dz] = normalize(task.direction);
        Self {
            kind: task.kind.as_i32(),
            blend: task.blend,
            _pad: [0; 2],
            color: [r * task.power, g * task.power, b * task.power, task.specular],
            position: [px, py, pz, task.falloff],
            direction: [dx, dy, dz, task.cone_angle],
        }
    }
}

/// Outcome of packing one frame's lights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightSummary {
    pub lights: usize,
    /// Leading global lights, shaded with one full-screen draw.
    pub global_lights: usize,
    pub volume_lights: usize,
}

/// Sort `lights` and write one record per light into `chunk`.
///
/// Fails without writing when more than `max` lights are given.
pub fn pack_lights(lights: &mut [LightDrawTask], chunk: &mut [u8], max: usize) -> Result<LightSummary> {
    let max = max.min(chunk.len() / std::mem::size_of::<LightRecord>());
    if lights.len() > max {
        return Err(RenderError::TooManyLights { count: lights.len(), max });
    }
    sort_lights(lights);
    for (light, slot) in lights.iter().zip(chunk.chunks_exact_mut(std::mem::size_of::<LightRecord>())) {
        slot.copy_from_slice(bytemuck::bytes_of(&LightRecord::from(light)));
    }
    let global_lights = global_run(lights);
    let volume_lights = lights.iter().filter(|l| l.volume != LightVolume::Global).count();
    Ok(LightSummary { lights: lights.len(), global_lights, volume_lights })
}

/// Decode the first `count` records of a packed chunk.
pub fn read_records(chunk: &[u8], count: usize) -> Vec<LightRecord> {
    chunk
        .chunks_exact(std::mem::size_of::<LightRecord>())
        .take(count)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Additive shading of the G-buffer into its color target.
#[derive(Debug)]
pub struct LightPass {
    program: Program,
}

impl LightPass {
    pub fn new(program: Program) -> Result<Self> {
        program.set_label("shading");
        match program.uniform_block_binding(LIGHTS_BLOCK, LIGHTS_BINDING) {
            Ok(()) => {}
            Err(GpuError::MissingUniformBlock(name)) => return Err(RenderError::MissingUniformBlock(name)),
            Err(e) => return Err(e.into()),
        }
        program.set_uniform("tex_position", UniformValue::Int(1))?;
        program.set_uniform("tex_normal", UniformValue::Int(2))?;
        program.set_uniform("tex_diffuse", UniformValue::Int(3))?;
        program.set_uniform("tex_specular", UniformValue::Int(4))?;
        program.set_uniform("tex_depth", UniformValue::Int(5))?;
        Ok(Self { program })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn encode(
        &self,
        device: &dyn Device,
        gbuffer: &GBuffer,
        ring: &SyncedRingBuffer,
        chunk: &ChunkHandle,
        quad: &FullscreenQuad,
        summary: &LightSummary,
    ) -> Result<()> {
        let _group = DebugGroup::push(device, "lighting_pass");

        gbuffer.bind_color_target()?;
        self.program.use_program()?;
        gbuffer.position().bind(1)?;
        gbuffer.normal().bind(2)?;
        gbuffer.diffuse().bind(3)?;
        gbuffer.specular().bind(4)?;
        gbuffer.depth().bind(5)?;
        ring.buffer().bind_uniform_range(LIGHTS_BINDING, chunk.offset(), chunk.size())?;

        device.set_capability(Capability::DepthTest, false);
        device.depth_mask(false);
        device.blend_func(BlendFactor::One, BlendFactor::One);
        device.blend_equation(BlendEquation::Add);
        device.set_capability(Capability::Blend, true);

        if summary.global_lights > 0 {
            self.program.set_uniform("base_light_index", UniformValue::Int(0))?;
            self.program.set_uniform("light_count", UniformValue::Int(summary.global_lights as i32))?;
            quad.draw()?;
        }
        if summary.volume_lights > 0 {
            log::trace!("lighting pass: {} volume lights not shaded", summary.volume_lights);
        }
        device.set_capability(Capability::Blend, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_api::LightKind;
    use std::sync::Arc;
    use umbra_gpu::{HeadlessDevice, RingConfig};

    fn light(i: usize) -> LightDrawTask {
        let volume = [LightVolume::Global, LightVolume::Spherical][i % 2];
        LightDrawTask {
            volume,
            kind: LightKind::Point,
            position: [i as f32, 1.0, -2.0],
            direction: [0.0, 0.0, -3.0],
            color: [0.5, 0.25, 1.0],
            power: 2.0,
            falloff: 0.1,
            cone_angle: 0.3,
            blend: 0.75,
            specular: 0.5,
            volume_mesh: None,
        }
    }

    #[test]
    fn record_layout_matches_the_block() {
        let record = LightRecord::from(&light(3));
        assert_eq!(std::mem::size_of::<LightRecord>(), 64);
        assert_eq!(record.kind, LightKind::Point.as_i32());
        assert_eq!(record.color, [1.0, 0.5, 2.0, 0.5]);
        assert_eq!(record.position, [3.0, 1.0, -2.0, 0.1]);
        assert_eq!(record.direction, [0.0, 0.0, -1.0, 0.3]);
        let bytes = bytemuck::bytes_of(&record);
        assert_eq!(&bytes[4..8], &0.75f32.to_ne_bytes());
    }

    #[test]
    fn packed_records_read_back_identically() {
        for count in [0, 1, 17, MAX_LIGHTS] {
            let mut lights: Vec<LightDrawTask> = (0..count).map(light).collect();
            let mut chunk = vec![0u8; MAX_LIGHTS * 64];
            let summary = pack_lights(&mut lights, &mut chunk, MAX_LIGHTS).unwrap();
            assert_eq!(summary.lights, count);
            assert_eq!(summary.global_lights + summary.volume_lights, count);
            let expected: Vec<LightRecord> = lights.iter().map(LightRecord::from).collect();
            assert_eq!(read_records(&chunk, count), expected);
        }
    }

    #[test]
    fn packing_into_a_ring_chunk_reaches_the_buffer() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let config = RingConfig {
            alignment: device.uniform_buffer_offset_alignment(),
            ..RingConfig::new(MAX_LIGHTS * 64)
        };
        let mut ring = SyncedRingBuffer::new(&device, &config).unwrap();
        let first = ring.acquire_chunk().unwrap();
        ring.release(first).unwrap();

        let chunk = ring.acquire_chunk().unwrap();
        assert_eq!(chunk.offset(), MAX_LIGHTS * 64);
        let mut lights: Vec<LightDrawTask> = (0..5).map(light).collect();
        let summary = pack_lights(&mut lights, ring.chunk_mut(&chunk).unwrap(), MAX_LIGHTS).unwrap();
        ring.flush(&chunk).unwrap();

        let mut out = vec![0u8; chunk.size()];
        ring.buffer().read(chunk.offset(), &mut out).unwrap();
        let expected: Vec<LightRecord> = lights.iter().map(LightRecord::from).collect();
        assert_eq!(read_records(&out, summary.lights), expected);
        assert!(out[summary.lights * 64..].iter().all(|&b| b == 0));
        ring.fence(chunk).unwrap();
    }

    #[test]
    fn too_many_lights_leave_the_chunk_untouched() {
        let mut lights: Vec<LightDrawTask> = (0..MAX_LIGHTS + 1).map(light).collect();
        let mut chunk = vec![0u8; MAX_LIGHTS * 64];
        let err = pack_lights(&mut lights, &mut chunk, MAX_LIGHTS).unwrap_err();
        assert!(matches!(err, RenderError::TooManyLights { count: 129, max: 128 }));
        assert!(chunk.iter().all(|&b| b == 0));
    }

    #[test]
    fn chunk_capacity_caps_the_limit() {
        let mut lights: Vec<LightDrawTask> = (0..3).map(light).collect();
        let mut chunk = vec![0u8; 2 * 64];
        assert!(matches!(
            pack_lights(&mut lights, &mut chunk, MAX_LIGHTS),
            Err(RenderError::TooManyLights { count: 3, max: 2 })
        ));
    }
}
