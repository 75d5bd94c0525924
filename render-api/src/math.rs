//! Column-major 4x4 matrix helpers on plain `[f32; 16]`.
//! Index `[col * 4 + row]`; `m[12..15]` is the translation column.

pub type Mat4 = [f32; 16];
pub type Vec3 = [f32; 3];

pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub fn mat4_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut c = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            c[col * 4 + row] = a[row] * b[col * 4]
                + a[4 + row] * b[col * 4 + 1]
                + a[8 + row] * b[col * 4 + 2]
                + a[12 + row] * b[col * 4 + 3];
        }
    }
    c
}

pub fn translation(t: Vec3) -> Mat4 {
    let mut m = IDENTITY;
    m[12] = t[0];
    m[13] = t[1];
    m[14] = t[2];
    m
}

pub fn scale(s: Vec3) -> Mat4 {
    let mut m = IDENTITY;
    m[0] = s[0];
    m[5] = s[1];
    m[10] = s[2];
    m
}

/// Rotation about the Y axis (radians).
pub fn rotation_y(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    [
        c, 0.0, -s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        s, 0.0, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// OpenGL-style perspective projection (clip z in [-w, w]).
pub fn perspective(fov_y_rad: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let sy = 1.0 / (fov_y_rad / 2.0).tan();
    let sx = sy / aspect;
    let a = (far + near) / (near - far);
    let b = (2.0 * far * near) / (near - far);
    [
        sx, 0.0, 0.0, 0.0, //
        0.0, sy, 0.0, 0.0, //
        0.0, 0.0, a, -1.0, //
        0.0, 0.0, b, 0.0,
    ]
}

/// Right-handed look-at view matrix. Camera at `eye` looking at `center`.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    let f = normalize(sub(center, eye));
    let s = normalize(cross(f, up));
    let u = cross(s, f);
    [
        s[0], u[0], -f[0], 0.0, //
        s[1], u[1], -f[1], 0.0, //
        s[2], u[2], -f[2], 0.0, //
        -dot(s, eye), -dot(u, eye), dot(f, eye), 1.0,
    ]
}

pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    let x = m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12];
    let y = m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13];
    let z = m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14];
    let w = m[3] * p[0] + m[7] * p[1] + m[11] * p[2] + m[15];
    if w.abs() > f32::EPSILON {
        [x / w, y / w, z / w]
    } else {
        [x, y, z]
    }
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Returns the zero vector unchanged.
pub fn normalize(v: Vec3) -> Vec3 {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn identity_is_neutral() {
        let t = translation([1.0, 2.0, 3.0]);
        assert_eq!(mat4_mul(&IDENTITY, &t), t);
        assert_eq!(mat4_mul(&t, &IDENTITY), t);
    }

    #[test]
    fn translation_moves_points() {
        let m = mat4_mul(&translation([1.0, 0.0, 0.0]), &scale([2.0, 2.0, 2.0]));
        assert!(approx(transform_point(&m, [1.0, 1.0, 1.0]), [3.0, 2.0, 2.0]));
    }

    #[test]
    fn look_at_puts_target_on_negative_z() {
        let view = look_at([0.0, 0.0, 5.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!(approx(transform_point(&view, [0.0, 0.0, 0.0]), [0.0, 0.0, -5.0]));
        assert!(approx(transform_point(&view, [0.0, 0.0, 5.0]), [0.0, 0.0, 0.0]));
    }

    #[test]
    fn perspective_maps_near_and_far_planes() {
        let p = perspective(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 10.0);
        assert!((transform_point(&p, [0.0, 0.0, -1.0])[2] + 1.0).abs() < 1e-5);
        assert!((transform_point(&p, [0.0, 0.0, -10.0])[2] - 1.0).abs() < 1e-5);
    }
}
