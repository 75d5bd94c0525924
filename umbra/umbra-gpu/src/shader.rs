//! Shader compilation and program linking.

use std::path::Path;
use std::sync::Arc;

use crate::device::{Device, ObjectId, ObjectKind, ShaderStage, UniformValue};
use crate::error::GpuError;
use crate::object::DeviceObject;

#[derive(Debug)]
pub struct Shader {
    object: DeviceObject,
    stage: ShaderStage,
}

impl Shader {
    /// Compile `source`. On failure the shader object is destroyed and the
    /// compiler log is returned in the error.
    pub fn compile(device: &Arc<dyn Device>, stage: ShaderStage, source: &str) -> Result<Self, GpuError> {
        let id = device.create_shader(stage)?;
        let object = DeviceObject::from_raw(Arc::clone(device), ObjectKind::Shader, id);
        let output = device.compile_shader(id, source);
        if !output.success {
            return Err(GpuError::ShaderCompile { stage, log: output.log });
        }
        if !output.log.is_empty() {
            log::warn!("{:?} shader compiled with warnings:\n{}", stage, output.log);
        }
        Ok(Self { object, stage })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

#[derive(Debug)]
pub struct Program {
    object: DeviceObject,
}

impl Program {
    pub fn link(device: &Arc<dyn Device>, shaders: &[Shader]) -> Result<Self, GpuError> {
        let id = device.create_program()?;
        let object = DeviceObject::from_raw(Arc::clone(device), ObjectKind::Program, id);
        let ids: Vec<ObjectId> = shaders.iter().map(Shader::id).collect();
        let output = device.link_program(id, &ids);
        if !output.success {
            return Err(GpuError::ProgramLink { log: output.log });
        }
        Ok(Self { object })
    }

    /// Compile each `(stage, source)` pair and link them.
    pub fn from_sources(device: &Arc<dyn Device>, sources: &[(ShaderStage, &str)]) -> Result<Self, GpuError> {
        let shaders = sources
            .iter()
            .map(|(stage, src)| Shader::compile(device, *stage, src))
            .collect::<Result<Vec<_>, _>>()?;
        Self::link(device, &shaders)
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn set_label(&self, label: &str) {
        self.object.set_label(label);
    }

    pub fn use_program(&self) -> Result<(), GpuError> {
        self.object.device().use_program(self.id())
    }

    pub fn uniform_location(&self, name: &str) -> Option<i32> {
        self.object.device().uniform_location(self.id(), name)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform_location(name).is_some()
    }

    /// Set a uniform by name. Names the program does not use are ignored.
    pub fn set_uniform(&self, name: &str, value: UniformValue) -> Result<(), GpuError> {
        match self.uniform_location(name) {
            Some(location) => self.object.device().program_uniform(self.id(), location, value),
            None => {
                log::trace!("program {}: uniform `{}` is inactive", self.id(), name);
                Ok(())
            }
        }
    }

    /// Route the named uniform block to an indexed uniform-buffer binding.
    pub fn uniform_block_binding(&self, name: &str, binding: u32) -> Result<(), GpuError> {
        let device = self.object.device();
        let index = device
            .uniform_block_index(self.id(), name)
            .ok_or_else(|| GpuError::MissingUniformBlock(name.to_string()))?;
        device.uniform_block_binding(self.id(), index, binding)
    }
}

fn shader_io(path: &Path) -> impl FnOnce(std::io::Error) -> GpuError {
    let path = path.to_path_buf();
    move |source| GpuError::ShaderIo { path, source }
}

/// Stage named by the last extension of `path`, looking past a trailing `.glsl`.
fn stage_of(path: &Path) -> Option<ShaderStage> {
    let path = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("glsl") => Path::new(path.file_stem()?),
        _ => path,
    };
    path.extension().and_then(|e| e.to_str()).and_then(ShaderStage::from_extension)
}

/// Compile every file in `dir` whose extension names a shader stage
/// (`.vs`, `.tcs`, `.tes`, `.gs`, `.fs`, `.cs`, optionally followed by `.glsl`)
/// and link the results.
pub fn load_program_from_directory(device: &Arc<dyn Device>, dir: &Path) -> Result<Program, GpuError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(shader_io(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let stage = stage_of(&path)?;
            Some((stage, path))
        })
        .collect();
    if entries.is_empty() {
        return Err(GpuError::NoShaderStages(dir.to_path_buf()));
    }
    entries.sort();

    let mut shaders = Vec::with_capacity(entries.len());
    for (stage, path) in &entries {
        let source = std::fs::read_to_string(path).map_err(shader_io(path))?;
        log::debug!("compiling {:?} shader {}", stage, path.display());
        shaders.push(Shader::compile(device, *stage, &source)?);
    }
    let program = Program::link(device, &shaders)?;
    program.set_label(&dir.display().to_string());
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    const VS: &str = "#version 450\nuniform mat4 mat_mvp;\nlayout(location = 0) in vec3 pos;\nvoid main() { gl_Position = mat_mvp * vec4(pos, 1.0); }\n";
    const FS: &str = "#version 450\nlayout(std140) uniform LIGHTS_UBO { vec4 data[4]; };\nout vec4 color;\nvoid main() { color = data[0]; }\n";

    #[test]
    fn compile_error_carries_log() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let err = Shader::compile(&device, ShaderStage::Fragment, "void main() {").unwrap_err();
        match err {
            GpuError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("unbalanced"), "{}", log);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn link_requires_vertex_and_fragment() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let err = Program::from_sources(&device, &[(ShaderStage::Vertex, VS)]).unwrap_err();
        assert!(matches!(err, GpuError::ProgramLink { ref log } if log.contains("fragment")));
    }

    #[test]
    fn uniforms_and_blocks_are_reflected() {
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let program = Program::from_sources(&device, &[(ShaderStage::Vertex, VS), (ShaderStage::Fragment, FS)]).unwrap();
        assert!(program.has_uniform("mat_mvp"));
        assert!(!program.has_uniform("mat_model"));
        program.set_uniform("mat_model", UniformValue::Float(1.0)).unwrap();
        program.uniform_block_binding("LIGHTS_UBO", 0).unwrap();
        assert!(matches!(
            program.uniform_block_binding("MISSING", 0),
            Err(GpuError::MissingUniformBlock(name)) if name == "MISSING"
        ));
    }

    #[test]
    fn directory_loading_picks_stage_suffixes() {
        let dir = std::env::temp_dir().join(format!("umbra_shader_dir_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.vs"), VS).unwrap();
        std::fs::write(dir.join("main.fs"), FS).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a shader").unwrap();
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let program = load_program_from_directory(&device, &dir).unwrap();
        assert!(program.has_uniform("mat_mvp"));
        std::fs::remove_dir_all(&dir).unwrap();

        let empty = std::env::temp_dir().join(format!("umbra_shader_empty_{}", std::process::id()));
        std::fs::create_dir_all(&empty).unwrap();
        assert!(matches!(load_program_from_directory(&device, &empty), Err(GpuError::NoShaderStages(_))));
        std::fs::remove_dir_all(&empty).unwrap();
    }

    #[test]
    fn glsl_suffix_is_looked_past() {
        assert_eq!(stage_of(Path::new("blit/main.vs.glsl")), Some(ShaderStage::Vertex));
        assert_eq!(stage_of(Path::new("main.FS.GLSL")), None);
        assert_eq!(stage_of(Path::new("main.fs")), Some(ShaderStage::Fragment));
        assert_eq!(stage_of(Path::new("common.glsl")), None);

        let dir = std::env::temp_dir().join(format!("umbra_shader_glsl_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.vs.glsl"), VS).unwrap();
        std::fs::write(dir.join("main.fs.glsl"), FS).unwrap();
        std::fs::write(dir.join("common.glsl"), "float helper();").unwrap();
        let device: Arc<dyn Device> = HeadlessDevice::new(4, 4);
        let program = load_program_from_directory(&device, &dir).unwrap();
        assert!(program.has_uniform("mat_mvp"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
