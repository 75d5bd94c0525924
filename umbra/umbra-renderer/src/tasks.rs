//! Per-frame draw tasks handed to [`crate::Renderer::render`].

use std::sync::Arc;

use render_api::math::{Mat4, Vec3, IDENTITY};
use render_api::{LightKind, LightVolume};

use crate::mesh::{Mesh, MeshId};

#[derive(Clone, Debug)]
pub struct MeshDrawTask {
    pub transform: Mat4,
    pub mesh: Arc<Mesh>,
}

/// One light to shade. Lights whose volume contains the camera should be
/// submitted as [`LightVolume::Global`] so the whole screen is covered.
#[derive(Clone, Debug)]
pub struct LightDrawTask {
    pub volume: LightVolume,
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: [f32; 3],
    pub power: f32,
    /// Quadratic distance falloff coefficient.
    pub falloff: f32,
    /// Spot cone half-angle in radians.
    pub cone_angle: f32,
    /// Weight of this light's contribution.
    pub blend: f32,
    pub specular: f32,
    /// Bounding mesh, only read for [`LightVolume::Mesh`].
    pub volume_mesh: Option<Arc<Mesh>>,
}

impl Default for LightDrawTask {
    fn default() -> Self {
        Self {
            volume: LightVolume::Global,
            kind: LightKind::Ambient,
            position: [0.0; 3],
            direction: [0.0, -1.0, 0.0],
            color: [1.0; 3],
            power: 1.0,
            falloff: 0.0,
            cone_angle: 0.0,
            blend: 1.0,
            specular: 1.0,
            volume_mesh: None,
        }
    }
}

impl LightDrawTask {
    pub fn ambient(color: [f32; 3], power: f32) -> Self {
        Self { color, power, ..Default::default() }
    }

    pub fn directional(direction: Vec3, color: [f32; 3], power: f32) -> Self {
        Self { kind: LightKind::Directional, direction, color, power, ..Default::default() }
    }

    pub fn point(position: Vec3, color: [f32; 3], power: f32, falloff: f32) -> Self {
        Self {
            volume: LightVolume::Spherical,
            kind: LightKind::Point,
            position,
            color,
            power,
            falloff,
            ..Default::default()
        }
    }

    /// Processing order: volume kind, then bounding mesh (mesh volumes only), then light kind.
    pub fn sort_key(&self) -> (LightVolume, Option<MeshId>, LightKind) {
        let mesh = match self.volume {
            LightVolume::Mesh => self.volume_mesh.as_ref().map(|m| m.id()),
            _ => None,
        };
        (self.volume, mesh, self.kind)
    }
}

/// Stable sort into processing order.
pub fn sort_lights(lights: &mut [LightDrawTask]) {
    lights.sort_by_key(LightDrawTask::sort_key);
}

/// Length of the leading run of global lights in a sorted slice.
pub fn global_run(lights: &[LightDrawTask]) -> usize {
    lights.iter().take_while(|l| l.volume == LightVolume::Global).count()
}

/// Everything drawn in one frame. Consumed by the renderer.
#[derive(Clone, Debug, Default)]
pub struct DrawTaskList {
    pub meshes: Vec<MeshDrawTask>,
    pub lights: Vec<LightDrawTask>,
}

impl DrawTaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_mesh(&mut self, mesh: Arc<Mesh>, transform: Mat4) -> &mut Self {
        self.meshes.push(MeshDrawTask { transform, mesh });
        self
    }

    pub fn push_mesh_untransformed(&mut self, mesh: Arc<Mesh>) -> &mut Self {
        self.push_mesh(mesh, IDENTITY)
    }

    pub fn push_light(&mut self, light: LightDrawTask) -> &mut Self {
        self.lights.push(light);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_api::MeshData;
    use umbra_gpu::{Device, HeadlessDevice};

    fn tagged(volume: LightVolume, kind: LightKind, tag: f32) -> LightDrawTask {
        LightDrawTask { volume, kind, power: tag, ..Default::default() }
    }

    #[test]
    fn sorts_by_volume_then_kind_and_keeps_ties_in_order() {
        let mut lights = vec![
            tagged(LightVolume::Spherical, LightKind::Point, 0.0),
            tagged(LightVolume::Global, LightKind::Directional, 1.0),
            tagged(LightVolume::Global, LightKind::Ambient, 2.0),
            tagged(LightVolume::Global, LightKind::Directional, 3.0),
        ];
        sort_lights(&mut lights);
        let order: Vec<f32> = lights.iter().map(|l| l.power).collect();
        assert_eq!(order, vec![2.0, 1.0, 3.0, 0.0]);
        assert_eq!(global_run(&lights), 3);
    }

    #[test]
    fn sorting_is_idempotent() {
        let mut lights: Vec<LightDrawTask> = (0..24)
            .map(|i| {
                let volume = [LightVolume::Mesh, LightVolume::Global, LightVolume::Spherical][i % 3];
                let kind = [LightKind::Spot, LightKind::Point, LightKind::Ambient, LightKind::Directional][i % 4];
                tagged(volume, kind, i as f32)
            })
            .collect();
        sort_lights(&mut lights);
        let once: Vec<f32> = lights.iter().map(|l| l.power).collect();
        sort_lights(&mut lights);
        let twice: Vec<f32> = lights.iter().map(|l| l.power).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn mesh_volumes_group_by_mesh() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let a = Arc::new(Mesh::new(&device, MeshData::triangle()).unwrap());
        let b = Arc::new(Mesh::new(&device, MeshData::triangle()).unwrap());
        let with_mesh = |mesh: &Arc<Mesh>, tag| LightDrawTask {
            volume: LightVolume::Mesh,
            volume_mesh: Some(Arc::clone(mesh)),
            power: tag,
            ..Default::default()
        };
        let mut lights = vec![with_mesh(&b, 0.0), with_mesh(&a, 1.0), with_mesh(&b, 2.0), with_mesh(&a, 3.0)];
        sort_lights(&mut lights);
        let order: Vec<f32> = lights.iter().map(|l| l.power).collect();
        assert_eq!(order, vec![1.0, 3.0, 0.0, 2.0]);
    }

    #[test]
    fn volume_mesh_is_ignored_for_other_volumes() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let mesh = Arc::new(Mesh::new(&device, MeshData::triangle()).unwrap());
        let light = LightDrawTask { volume_mesh: Some(mesh), ..Default::default() };
        assert_eq!(light.sort_key(), (LightVolume::Global, None, LightKind::Ambient));
    }
}
