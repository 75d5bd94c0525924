//! Camera and surface material descriptions.

use crate::math::{self, Mat4, Vec3};

/// Perspective camera. Holds its view and projection matrices so the renderer
/// can upload them without recomputing.
#[derive(Clone, Debug)]
pub struct Camera {
    view: Mat4,
    projection: Mat4,
    position: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(60f32.to_radians(), 16.0 / 9.0, 0.001, 1000.0)
    }
}

impl Camera {
    pub fn perspective(fov_y_rad: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: math::IDENTITY,
            projection: math::perspective(fov_y_rad, aspect, near, far),
            position: [0.0; 3],
        }
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) -> &mut Self {
        self.view = math::look_at(eye, target, up);
        self.position = eye;
        self
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// `projection * view`.
    pub fn view_projection(&self) -> Mat4 {
        math::mat4_mul(&self.projection, &self.view)
    }
}

/// Phong-style surface parameters for one sub-range of a mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub reflective: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8],
            specular: [0.0; 3],
            shininess: 1.0,
            reflective: 0.0,
        }
    }
}
