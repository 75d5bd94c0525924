//! Light classification shared between the scene description and the renderer.

/// Screen region a light touches. The ordering is the shading order:
/// full-screen lights first, then sphere volumes, then arbitrary mesh volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum LightVolume {
    Global = 0,
    Spherical = 1,
    Mesh = 2,
}

/// Emission model; the numeric value is what the shading program switches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum LightKind {
    Ambient = 0,
    Directional = 1,
    Point = 2,
    Spot = 3,
}

impl LightKind {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl LightVolume {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
