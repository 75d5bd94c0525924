//! Shared render data for Umbra.
//! Device-independent types the host fills in and the renderer consumes:
//! mesh arrays, materials, camera matrices, light classification, plus the
//! named resource cache and OBJ import used to populate them.

pub mod cache;
pub mod camera;
pub mod import;
pub mod light;
pub mod math;
pub mod mesh;

pub use cache::{ResourceCache, ResourceError, ResourceId};
pub use camera::{Camera, Material};
pub use import::{load_obj, parse_obj, ImportError, ImportOptions};
pub use light::{LightKind, LightVolume};
pub use math::{Mat4, Vec3};
pub use mesh::{MeshData, MeshError, SubRange};
