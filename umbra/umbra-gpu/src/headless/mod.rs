//! Software reference device.
//!
//! `HeadlessDevice` owns real host memory for buffers and texel storage for
//! textures, keeps a simulated device timeline for fences, validates and
//! reflects GLSL sources, and records every command it receives. It does not
//! rasterize geometry: clears are evaluated, and full-screen draws of programs
//! registered with [`HeadlessDevice::evaluate_copy_pass`] copy the sampled
//! texture into the draw buffers (blending included). Everything else is
//! validated and recorded only.

mod glsl;
mod image;

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::device::{
    Attachment, BlendEquation, BlendFactor, BufferFlags, BuildOutput, Capability, ClearMask, CompareFunc, DebugCallback,
    DebugKind, DebugMessage, DebugSeverity, DebugSource, Device, Filter, FramebufferStatus, IndexType, MapAccess,
    ObjectId, ObjectKind, Primitive, Readback, ScalarType, ShaderStage, SyncHandle, TextureDesc, TextureFormat,
    UniformValue, WaitStatus, NULL_OBJECT,
};
use crate::error::GpuError;
use crate::vertex_array::MAX_VERTEX_ATTRIBS;

/// Offset alignment for uniform buffer ranges, the common desktop value.
pub const UNIFORM_BUFFER_OFFSET_ALIGNMENT: usize = 256;

use self::glsl::Reflection;
pub use self::image::Blend;
use self::image::Image;

/// Recorded device command, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create { kind: ObjectKind, id: ObjectId },
    Destroy { kind: ObjectKind, id: ObjectId },
    UseProgram(ObjectId),
    BindFramebuffer(ObjectId),
    BindUniformRange { binding: u32, buffer: ObjectId, offset: usize, size: usize },
    FlushMapped { buffer: ObjectId, offset: usize, len: usize },
    Clear { framebuffer: ObjectId, mask: ClearMask },
    Draw(DrawRecord),
    FenceSync(SyncHandle),
    PushGroup(String),
    PopGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { count: u32, index_type: IndexType, offset: usize, base_vertex: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub primitive: Primitive,
    pub kind: DrawKind,
    pub program: ObjectId,
    pub framebuffer: ObjectId,
    pub vertex_array: ObjectId,
    /// Innermost debug group at the time of the draw.
    pub group: Option<String>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: Option<Blend>,
}

/// Attribute slot state of a headless vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttrib {
    pub enabled: bool,
    pub binding: u32,
    pub size: u32,
    pub ty: ScalarType,
    pub normalized: bool,
    pub relative_offset: u32,
}

impl Default for VertexAttrib {
    fn default() -> Self {
        Self { enabled: false, binding: 0, size: 4, ty: ScalarType::F32, normalized: false, relative_offset: 0 }
    }
}

/// Heap block with a stable address, shared with mapped pointers.
struct HostAllocation {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the allocation is plain bytes owned by this value.
unsafe impl Send for HostAllocation {}

impl HostAllocation {
    fn new(len: usize, data: Option<&[u8]>) -> Self {
        let mut bytes = vec![0u8; len].into_boxed_slice();
        if let Some(data) = data {
            bytes.copy_from_slice(data);
        }
        let ptr = NonNull::new(Box::into_raw(bytes) as *mut u8).unwrap_or(NonNull::dangling());
        Self { ptr, len }
    }

    fn write(&self, offset: usize, data: &[u8]) {
        // SAFETY: callers bounds-check against `len`.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len()) }
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        // SAFETY: callers bounds-check against `len`.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), out.len()) }
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: `ptr`/`len` came from `Box::into_raw` of a boxed slice of this length.
            unsafe { drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len))) }
        }
    }
}

struct Mapping {
    offset: usize,
    len: usize,
    access: MapAccess,
}

struct BufferStore {
    memory: HostAllocation,
    flags: BufferFlags,
    mapping: Option<Mapping>,
}

struct TextureStore {
    image: Image,
    filter: (Filter, Filter),
}

struct VertexArrayStore {
    attribs: [VertexAttrib; MAX_VERTEX_ATTRIBS as usize],
    bindings: HashMap<u32, (ObjectId, usize, u32)>,
    element_buffer: ObjectId,
}

struct FramebufferStore {
    attachments: HashMap<Attachment, ObjectId>,
    draw_buffers: Vec<Attachment>,
}

struct ShaderStore {
    stage: ShaderStage,
    compiled: bool,
    reflection: Reflection,
}

#[derive(Default)]
struct ProgramStore {
    linked: bool,
    uniforms: Vec<String>,
    values: HashMap<i32, UniformValue>,
    blocks: Vec<String>,
    block_bindings: HashMap<u32, u32>,
}

struct Raster {
    depth_test: bool,
    blend: bool,
    cull_face: bool,
    scissor_test: bool,
    depth_func: CompareFunc,
    depth_write: bool,
    blend_func: (BlendFactor, BlendFactor),
    blend_equation: BlendEquation,
    clear_color: [f32; 4],
    viewport: (i32, i32, u32, u32),
}

#[derive(Default)]
struct Bindings {
    program: ObjectId,
    vertex_array: ObjectId,
    draw_framebuffer: ObjectId,
    texture_units: HashMap<u32, ObjectId>,
    uniform_ranges: HashMap<u32, (ObjectId, usize, usize)>,
}

struct State {
    next_id: ObjectId,
    next_sync: u64,
    buffers: HashMap<ObjectId, BufferStore>,
    textures: HashMap<ObjectId, TextureStore>,
    vertex_arrays: HashMap<ObjectId, VertexArrayStore>,
    framebuffers: HashMap<ObjectId, FramebufferStore>,
    shaders: HashMap<ObjectId, ShaderStore>,
    programs: HashMap<ObjectId, ProgramStore>,
    labels: HashMap<(ObjectKind, ObjectId), String>,
    /// Program label to the sampler its full-screen draws copy from.
    copy_passes: HashMap<String, String>,
    /// Debug group whose next draw fails.
    failing_group: Option<String>,
    /// Window-system textures backing framebuffer 0.
    internal_textures: [ObjectId; 2],
    syncs: HashMap<u64, bool>,
    hold_fences: bool,
    bindings: Bindings,
    raster: Raster,
    groups: Vec<String>,
    commands: Vec<Command>,
}

fn invalid<T>(message: impl Into<String>) -> Result<T, GpuError> {
    Err(GpuError::InvalidOperation(message.into()))
}

fn check_range(offset: usize, len: usize, size: usize) -> Result<(), GpuError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(GpuError::OutOfBounds { offset, len, size }),
    }
}

impl State {
    fn new(width: u32, height: u32) -> Self {
        let mut state = Self {
            next_id: 1,
            next_sync: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            labels: HashMap::new(),
            copy_passes: HashMap::new(),
            failing_group: None,
            internal_textures: [NULL_OBJECT; 2],
            syncs: HashMap::new(),
            hold_fences: false,
            bindings: Bindings::default(),
            raster: Raster {
                depth_test: false,
                blend: false,
                cull_face: false,
                scissor_test: false,
                depth_func: CompareFunc::Less,
                depth_write: true,
                blend_func: (BlendFactor::One, BlendFactor::Zero),
                blend_equation: BlendEquation::Add,
                clear_color: [0.0; 4],
                viewport: (0, 0, width, height),
            },
            groups: Vec::new(),
            commands: Vec::new(),
        };
        let color = state.alloc_id();
        let depth = state.alloc_id();
        let texture = |format| TextureStore { image: Image::new(format, width, height), filter: Default::default() };
        state.textures.insert(color, texture(TextureFormat::Rgba8));
        state.textures.insert(depth, texture(TextureFormat::Depth32F));
        state.internal_textures = [color, depth];
        state.framebuffers.insert(
            NULL_OBJECT,
            FramebufferStore {
                attachments: HashMap::from([(Attachment::Color(0), color), (Attachment::Depth, depth)]),
                draw_buffers: vec![Attachment::Color(0)],
            },
        );
        state
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn created(&mut self, kind: ObjectKind) -> ObjectId {
        let id = self.alloc_id();
        self.commands.push(Command::Create { kind, id });
        id
    }

    fn buffer(&self, id: ObjectId) -> Result<&BufferStore, GpuError> {
        self.buffers.get(&id).ok_or(GpuError::UnknownObject { kind: ObjectKind::Buffer, id })
    }

    fn buffer_mut(&mut self, id: ObjectId) -> Result<&mut BufferStore, GpuError> {
        self.buffers.get_mut(&id).ok_or(GpuError::UnknownObject { kind: ObjectKind::Buffer, id })
    }

    fn vao_mut(&mut self, id: ObjectId) -> Result<&mut VertexArrayStore, GpuError> {
        self.vertex_arrays.get_mut(&id).ok_or(GpuError::UnknownObject { kind: ObjectKind::VertexArray, id })
    }

    fn framebuffer(&self, id: ObjectId) -> Result<&FramebufferStore, GpuError> {
        self.framebuffers.get(&id).ok_or(GpuError::UnknownObject { kind: ObjectKind::Framebuffer, id })
    }

    fn program(&self, id: ObjectId) -> Result<&ProgramStore, GpuError> {
        self.programs.get(&id).ok_or(GpuError::UnknownObject { kind: ObjectKind::Program, id })
    }

    fn destroy(&mut self, kind: ObjectKind, id: ObjectId) -> bool {
        let existed = match kind {
            ObjectKind::Buffer => {
                self.bindings.uniform_ranges.retain(|_, (b, _, _)| *b != id);
                self.buffers.remove(&id).is_some()
            }
            ObjectKind::Texture => {
                if self.internal_textures.contains(&id) {
                    return false;
                }
                self.bindings.texture_units.retain(|_, t| *t != id);
                self.textures.remove(&id).is_some()
            }
            ObjectKind::VertexArray => {
                if self.bindings.vertex_array == id {
                    self.bindings.vertex_array = NULL_OBJECT;
                }
                self.vertex_arrays.remove(&id).is_some()
            }
            ObjectKind::Framebuffer => {
                if self.bindings.draw_framebuffer == id {
                    self.bindings.draw_framebuffer = NULL_OBJECT;
                }
                self.framebuffers.remove(&id).is_some()
            }
            ObjectKind::Shader => self.shaders.remove(&id).is_some(),
            ObjectKind::Program => {
                if self.bindings.program == id {
                    self.bindings.program = NULL_OBJECT;
                }
                self.programs.remove(&id).is_some()
            }
        };
        if existed {
            self.labels.remove(&(kind, id));
            self.commands.push(Command::Destroy { kind, id });
        }
        existed
    }

    fn map(&mut self, id: ObjectId, offset: usize, len: usize, access: MapAccess) -> Result<NonNull<u8>, GpuError> {
        let buffer = self.buffer_mut(id)?;
        if buffer.mapping.is_some() {
            return Err(GpuError::AlreadyMapped(id));
        }
        check_range(offset, len, buffer.memory.len)?;
        if !access.intersects(MapAccess::READ | MapAccess::WRITE) {
            return invalid("map access needs READ or WRITE");
        }
        let required = [
            (MapAccess::READ, BufferFlags::MAP_READ),
            (MapAccess::WRITE, BufferFlags::MAP_WRITE),
            (MapAccess::PERSISTENT, BufferFlags::MAP_PERSISTENT),
            (MapAccess::COHERENT, BufferFlags::MAP_COHERENT),
        ];
        for (needs, flag) in required {
            if access.contains(needs) && !buffer.flags.contains(flag) {
                return invalid(format!("map access {:?} requires storage flag {:?}", needs, flag));
            }
        }
        if access.contains(MapAccess::FLUSH_EXPLICIT) && !access.contains(MapAccess::WRITE) {
            return invalid("FLUSH_EXPLICIT requires WRITE access");
        }
        buffer.mapping = Some(Mapping { offset, len, access });
        // SAFETY: `offset` was bounds-checked above.
        Ok(unsafe { NonNull::new_unchecked(buffer.memory.ptr.as_ptr().add(offset)) })
    }

    fn flush_mapped(&mut self, id: ObjectId, offset: usize, len: usize) -> Result<(), GpuError> {
        let buffer = self.buffer(id)?;
        let mapping = buffer.mapping.as_ref().ok_or(GpuError::NotMapped(id))?;
        if !mapping.access.contains(MapAccess::FLUSH_EXPLICIT) {
            return invalid("buffer was not mapped with FLUSH_EXPLICIT");
        }
        check_range(offset, len, mapping.len)?;
        let absolute = mapping.offset + offset;
        self.commands.push(Command::FlushMapped { buffer: id, offset: absolute, len });
        Ok(())
    }

    fn framebuffer_status(&self, id: ObjectId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&id) else {
            return FramebufferStatus::Unsupported;
        };
        if fb.attachments.is_empty() {
            return FramebufferStatus::MissingAttachment;
        }
        let mut size = None;
        for (attachment, texture) in &fb.attachments {
            let Some(texture) = self.textures.get(texture) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            let depth_slot = matches!(attachment, Attachment::Depth);
            if depth_slot != texture.image.format.is_depth() {
                return FramebufferStatus::IncompleteAttachment;
            }
            let dims = (texture.image.width, texture.image.height);
            if *size.get_or_insert(dims) != dims {
                return FramebufferStatus::IncompleteAttachment;
            }
        }
        for buffer in &fb.draw_buffers {
            if matches!(buffer, Attachment::Depth) || !fb.attachments.contains_key(buffer) {
                return FramebufferStatus::IncompleteDrawBuffer;
            }
        }
        FramebufferStatus::Complete
    }

    fn draw_targets(&self) -> Result<Vec<ObjectId>, GpuError> {
        let id = self.bindings.draw_framebuffer;
        if self.framebuffer_status(id) != FramebufferStatus::Complete {
            return invalid(format!("draw framebuffer {} is incomplete", id));
        }
        let fb = self.framebuffer(id)?;
        Ok(fb.draw_buffers.iter().filter_map(|a| fb.attachments.get(a).copied()).collect())
    }

    fn clear(&mut self, mask: ClearMask) -> Result<(), GpuError> {
        let targets = self.draw_targets()?;
        let fb = self.bindings.draw_framebuffer;
        if mask.contains(ClearMask::COLOR) {
            let color = self.raster.clear_color;
            for id in targets {
                if let Some(texture) = self.textures.get_mut(&id) {
                    texture.image.fill(color);
                }
            }
        }
        if mask.contains(ClearMask::DEPTH) && self.raster.depth_write {
            let depth = self.framebuffer(fb)?.attachments.get(&Attachment::Depth).copied();
            if let Some(texture) = depth.and_then(|id| self.textures.get_mut(&id)) {
                texture.image.fill([1.0, 0.0, 0.0, 1.0]);
            }
        }
        self.commands.push(Command::Clear { framebuffer: fb, mask });
        Ok(())
    }

    fn current_blend(&self) -> Option<Blend> {
        self.raster.blend.then_some(Blend {
            src: self.raster.blend_func.0,
            dst: self.raster.blend_func.1,
            equation: self.raster.blend_equation,
        })
    }

    fn check_vertex_inputs(&self) -> Result<(), GpuError> {
        let Some(vao) = self.vertex_arrays.get(&self.bindings.vertex_array) else {
            return Ok(());
        };
        for (index, attrib) in vao.attribs.iter().enumerate() {
            if attrib.enabled && !vao.bindings.contains_key(&attrib.binding) {
                return invalid(format!(
                    "attribute {} is enabled but binding {} has no vertex buffer",
                    index, attrib.binding
                ));
            }
        }
        Ok(())
    }

    fn record_draw(&mut self, primitive: Primitive, kind: DrawKind) -> Result<(), GpuError> {
        let program_id = self.bindings.program;
        let program = self.program(program_id).map_err(|_| GpuError::InvalidOperation("draw without a program".into()))?;
        if !program.linked {
            return invalid(format!("program {} is not linked", program_id));
        }
        if self.failing_group.is_some() && self.failing_group.as_deref() == self.groups.last().map(String::as_str) {
            let group = self.failing_group.take().unwrap_or_default();
            return invalid(format!("injected draw failure in '{}'", group));
        }
        let targets = self.draw_targets()?;
        self.check_vertex_inputs()?;
        if let DrawKind::Elements { count, index_type, offset, .. } = kind {
            let vao = self
                .vertex_arrays
                .get(&self.bindings.vertex_array)
                .ok_or_else(|| GpuError::InvalidOperation("indexed draw without a vertex array".into()))?;
            let elements = self.buffer(vao.element_buffer)?;
            check_range(offset, count as usize * index_type.size(), elements.memory.len)?;
        }
        if let DrawKind::Arrays { .. } = kind {
            self.evaluate_fullscreen(program_id, &targets)?;
        }
        self.commands.push(Command::Draw(DrawRecord {
            primitive,
            kind,
            program: program_id,
            framebuffer: self.bindings.draw_framebuffer,
            vertex_array: self.bindings.vertex_array,
            group: self.groups.last().cloned(),
            depth_test: self.raster.depth_test,
            depth_write: self.raster.depth_write,
            blend: self.current_blend(),
        }));
        Ok(())
    }

    fn evaluate_fullscreen(&mut self, program_id: ObjectId, targets: &[ObjectId]) -> Result<(), GpuError> {
        let program = self.program(program_id)?;
        let Some(sampler) = self
            .labels
            .get(&(ObjectKind::Program, program_id))
            .and_then(|label| self.copy_passes.get(label))
        else {
            return Ok(());
        };
        let unit = program
            .uniforms
            .iter()
            .position(|u| u == sampler)
            .and_then(|loc| program.values.get(&(loc as i32)))
            .map(|v| match v {
                UniformValue::Int(unit) => *unit as u32,
                UniformValue::UInt(unit) => *unit,
                _ => 0,
            })
            .unwrap_or(0);
        let source = match self.bindings.texture_units.get(&unit).and_then(|id| self.textures.get(id)) {
            Some(texture) => texture.image.clone(),
            None => return invalid(format!("copy pass samples unit {} with no texture bound", unit)),
        };
        let blend = self.current_blend();
        for id in targets {
            let Some(target) = self.textures.get_mut(id) else { continue };
            let (w, h, format) = (target.image.width, target.image.height, target.image.format);
            for y in 0..h {
                for x in 0..w {
                    let u = (x as f32 + 0.5) / w as f32;
                    let v = (y as f32 + 0.5) / h as f32;
                    let src = source.sample(u, v);
                    let slot = &mut target.image.texels[(y * w + x) as usize];
                    let value = match blend {
                        Some(blend) => blend.apply(src, *slot),
                        None => src,
                    };
                    *slot = Image::store(format, value);
                }
            }
        }
        Ok(())
    }

    fn link(&mut self, program_id: ObjectId, shader_ids: &[ObjectId]) -> BuildOutput {
        let mut log = Vec::new();
        let mut stages = Vec::new();
        let mut reflections = Vec::new();
        for id in shader_ids {
            match self.shaders.get(id) {
                Some(shader) if shader.compiled => {
                    if stages.contains(&shader.stage) {
                        log.push(format!("error: more than one {:?} shader attached", shader.stage));
                    }
                    stages.push(shader.stage);
                    reflections.push((shader.stage, shader.reflection.clone()));
                }
                Some(_) => log.push(format!("error: shader {} is not compiled", id)),
                None => log.push(format!("error: shader {} does not exist", id)),
            }
        }
        if stages.contains(&ShaderStage::Compute) {
            if stages.len() > 1 {
                log.push("error: compute shaders cannot be linked with other stages".to_string());
            }
        } else {
            if !stages.contains(&ShaderStage::Vertex) {
                log.push("error: program lacks a vertex shader".to_string());
            }
            if !stages.contains(&ShaderStage::Fragment) {
                log.push("error: program lacks a fragment shader".to_string());
            }
        }
        let Some(program) = self.programs.get_mut(&program_id) else {
            return BuildOutput { success: false, log: format!("error: program {} does not exist", program_id) };
        };
        if !log.is_empty() {
            program.linked = false;
            return BuildOutput { success: false, log: log.join("\n") };
        }
        *program = ProgramStore { linked: true, ..Default::default() };
        for (_, reflection) in reflections {
            for name in reflection.uniforms {
                if !program.uniforms.contains(&name) {
                    program.uniforms.push(name);
                }
            }
            for name in reflection.blocks {
                if !program.blocks.contains(&name) {
                    program.blocks.push(name);
                }
            }
        }
        BuildOutput { success: true, log: String::new() }
    }
}

/// Headless implementation of [`Device`].
pub struct HeadlessDevice {
    state: Mutex<State>,
    callback: Mutex<Option<Arc<dyn Fn(&DebugMessage) + Send + Sync>>>,
    size: (u32, u32),
}

impl std::fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessDevice").field("size", &self.size).finish()
    }
}

impl HeadlessDevice {
    /// Device whose default framebuffer is `width` x `height` RGBA8 with a depth buffer.
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        log::debug!("headless device {}x{}", width, height);
        Arc::new(Self { state: Mutex::new(State::new(width, height)), callback: Mutex::new(None), size: (width, height) })
    }

    pub fn default_framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    /// While held, new fences stay unsignaled until [`signal_fences`](Self::signal_fences).
    pub fn hold_fences(&self, hold: bool) {
        self.state.lock().hold_fences = hold;
    }

    /// Complete all outstanding device work.
    pub fn signal_fences(&self) {
        self.state.lock().syncs.values_mut().for_each(|s| *s = true);
    }

    pub fn live_syncs(&self) -> usize {
        self.state.lock().syncs.len()
    }

    pub fn live_objects(&self, kind: ObjectKind) -> usize {
        let state = self.state.lock();
        match kind {
            ObjectKind::Buffer => state.buffers.len(),
            ObjectKind::Texture => state.textures.len() - state.internal_textures.len(),
            ObjectKind::VertexArray => state.vertex_arrays.len(),
            ObjectKind::Framebuffer => state.framebuffers.len() - 1,
            ObjectKind::Shader => state.shaders.len(),
            ObjectKind::Program => state.programs.len(),
        }
    }

    pub fn is_mapped(&self, buffer: ObjectId) -> bool {
        self.state.lock().buffers.get(&buffer).is_some_and(|b| b.mapping.is_some())
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Draws recorded inside the named debug group.
    pub fn draws_in_group(&self, group: &str) -> Vec<DrawRecord> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(d) if d.group.as_deref() == Some(group) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn debug_groups(&self) -> Vec<String> {
        self.state.lock().groups.clone()
    }

    pub fn label(&self, kind: ObjectKind, id: ObjectId) -> Option<String> {
        self.state.lock().labels.get(&(kind, id)).cloned()
    }

    pub fn vertex_attrib(&self, vao: ObjectId, index: u32) -> Option<VertexAttrib> {
        self.state.lock().vertex_arrays.get(&vao).and_then(|v| v.attribs.get(index as usize).copied())
    }

    /// Buffer bound to a vertex-array binding point: `(buffer, offset, stride)`.
    pub fn vertex_binding(&self, vao: ObjectId, binding: u32) -> Option<(ObjectId, usize, u32)> {
        self.state.lock().vertex_arrays.get(&vao).and_then(|v| v.bindings.get(&binding).copied())
    }

    pub fn uniform_value(&self, program: ObjectId, name: &str) -> Option<UniformValue> {
        let state = self.state.lock();
        let program = state.programs.get(&program)?;
        let location = program.uniforms.iter().position(|u| u == name)? as i32;
        program.values.get(&location).copied()
    }

    /// Evaluate full-screen draws of programs labelled `program_label` as a
    /// copy of the texture bound to the unit named by the `sampler` uniform.
    pub fn evaluate_copy_pass(&self, program_label: &str, sampler: &str) {
        self.state.lock().copy_passes.insert(program_label.to_string(), sampler.to_string());
    }

    /// Fail the next draw issued inside the debug group `group` with
    /// [`GpuError::InvalidOperation`].
    pub fn fail_next_draw_in(&self, group: &str) {
        self.state.lock().failing_group = Some(group.to_string());
    }

    pub fn texture_unit(&self, unit: u32) -> Option<ObjectId> {
        self.state.lock().bindings.texture_units.get(&unit).copied()
    }

    fn emit(&self, message: DebugMessage) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&message);
        }
    }

    /// Mirror API errors onto the debug channel, like a driver with debug output enabled.
    fn report<T>(&self, result: Result<T, GpuError>) -> Result<T, GpuError> {
        if let Err(e) = &result {
            self.emit(DebugMessage {
                source: DebugSource::Api,
                kind: DebugKind::Error,
                severity: DebugSeverity::High,
                id: 1,
                message: e.to_string(),
            });
        }
        result
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(&self, size: usize, data: Option<&[u8]>, flags: BufferFlags) -> Result<ObjectId, GpuError> {
        if data.is_some_and(|d| d.len() != size) {
            return self.report(Err(GpuError::ObjectCreation {
                kind: ObjectKind::Buffer,
                reason: "initial data does not match the buffer size".into(),
            }));
        }
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::Buffer);
        state.buffers.insert(id, BufferStore { memory: HostAllocation::new(size, data), flags, mapping: None });
        Ok(id)
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<ObjectId, GpuError> {
        if desc.width == 0 || desc.height == 0 || desc.levels == 0 {
            return self.report(Err(GpuError::ObjectCreation {
                kind: ObjectKind::Texture,
                reason: format!("invalid extent {}x{} with {} levels", desc.width, desc.height, desc.levels),
            }));
        }
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::Texture);
        state.textures.insert(
            id,
            TextureStore { image: Image::new(desc.format, desc.width, desc.height), filter: Default::default() },
        );
        Ok(id)
    }

    fn create_vertex_array(&self) -> Result<ObjectId, GpuError> {
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::VertexArray);
        state.vertex_arrays.insert(
            id,
            VertexArrayStore {
                attribs: [VertexAttrib::default(); MAX_VERTEX_ATTRIBS as usize],
                bindings: HashMap::new(),
                element_buffer: NULL_OBJECT,
            },
        );
        Ok(id)
    }

    fn create_framebuffer(&self) -> Result<ObjectId, GpuError> {
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::Framebuffer);
        state
            .framebuffers
            .insert(id, FramebufferStore { attachments: HashMap::new(), draw_buffers: vec![Attachment::Color(0)] });
        Ok(id)
    }

    fn create_shader(&self, stage: ShaderStage) -> Result<ObjectId, GpuError> {
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::Shader);
        state.shaders.insert(id, ShaderStore { stage, compiled: false, reflection: Reflection::default() });
        Ok(id)
    }

    fn create_program(&self) -> Result<ObjectId, GpuError> {
        let mut state = self.state.lock();
        let id = state.created(ObjectKind::Program);
        state.programs.insert(id, ProgramStore::default());
        Ok(id)
    }

    fn destroy_object(&self, kind: ObjectKind, id: ObjectId) {
        if id == NULL_OBJECT {
            return;
        }
        let existed = self.state.lock().destroy(kind, id);
        if !existed {
            self.emit(DebugMessage {
                source: DebugSource::Api,
                kind: DebugKind::Error,
                severity: DebugSeverity::Medium,
                id: 2,
                message: format!("destroy of unknown {:?} {}", kind, id),
            });
        }
    }

    fn object_label(&self, kind: ObjectKind, id: ObjectId, label: &str) {
        self.state.lock().labels.insert((kind, id), label.to_string());
    }

    fn buffer_sub_data(&self, buffer: ObjectId, offset: usize, data: &[u8]) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let state = self.state.lock();
            let store = state.buffer(buffer)?;
            if !store.flags.contains(BufferFlags::DYNAMIC_STORAGE) {
                return invalid(format!("buffer {} lacks DYNAMIC_STORAGE", buffer));
            }
            check_range(offset, data.len(), store.memory.len)?;
            store.memory.write(offset, data);
            Ok(())
        })();
        self.report(result)
    }

    fn get_buffer_sub_data(&self, buffer: ObjectId, offset: usize, out: &mut [u8]) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let state = self.state.lock();
            let store = state.buffer(buffer)?;
            if store.mapping.as_ref().is_some_and(|m| !m.access.contains(MapAccess::PERSISTENT)) {
                return invalid(format!("buffer {} is mapped without PERSISTENT", buffer));
            }
            check_range(offset, out.len(), store.memory.len)?;
            store.memory.read(offset, out);
            Ok(())
        })();
        self.report(result)
    }

    fn map_buffer_range(&self, buffer: ObjectId, offset: usize, len: usize, access: MapAccess) -> Result<NonNull<u8>, GpuError> {
        let result = self.state.lock().map(buffer, offset, len, access);
        self.report(result)
    }

    fn flush_mapped_buffer_range(&self, buffer: ObjectId, offset: usize, len: usize) -> Result<(), GpuError> {
        let result = self.state.lock().flush_mapped(buffer, offset, len);
        self.report(result)
    }

    fn unmap_buffer(&self, buffer: ObjectId) -> Result<(), GpuError> {
        let result = self
            .state
            .lock()
            .buffer_mut(buffer)
            .and_then(|b| b.mapping.take().map(|_| ()).ok_or(GpuError::NotMapped(buffer)));
        self.report(result)
    }

    fn bind_uniform_buffer_range(&self, binding: u32, buffer: ObjectId, offset: usize, size: usize) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            let len = state.buffer(buffer)?.memory.len;
            check_range(offset, size, len)?;
            if offset % UNIFORM_BUFFER_OFFSET_ALIGNMENT != 0 {
                return invalid(format!(
                    "uniform range offset {} is not a multiple of {}",
                    offset, UNIFORM_BUFFER_OFFSET_ALIGNMENT
                ));
            }
            state.bindings.uniform_ranges.insert(binding, (buffer, offset, size));
            state.commands.push(Command::BindUniformRange { binding, buffer, offset, size });
            Ok(())
        })();
        self.report(result)
    }

    fn uniform_buffer_offset_alignment(&self) -> usize {
        UNIFORM_BUFFER_OFFSET_ALIGNMENT
    }

    fn texture_filter(&self, texture: ObjectId, min: Filter, mag: Filter) -> Result<(), GpuError> {
        let result = match self.state.lock().textures.get_mut(&texture) {
            Some(t) => {
                t.filter = (min, mag);
                Ok(())
            }
            None => Err(GpuError::UnknownObject { kind: ObjectKind::Texture, id: texture }),
        };
        self.report(result)
    }

    fn bind_texture_unit(&self, unit: u32, texture: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if texture == NULL_OBJECT {
                state.bindings.texture_units.remove(&unit);
                return Ok(());
            }
            if !state.textures.contains_key(&texture) {
                return Err(GpuError::UnknownObject { kind: ObjectKind::Texture, id: texture });
            }
            state.bindings.texture_units.insert(unit, texture);
            Ok(())
        })();
        self.report(result)
    }

    fn get_texture_image(&self, texture: ObjectId) -> Result<Readback, GpuError> {
        let result = self
            .state
            .lock()
            .textures
            .get(&texture)
            .map(|t| t.image.readback())
            .ok_or(GpuError::UnknownObject { kind: ObjectKind::Texture, id: texture });
        self.report(result)
    }

    fn framebuffer_texture(&self, framebuffer: ObjectId, attachment: Attachment, texture: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if framebuffer == NULL_OBJECT {
                return invalid("cannot attach textures to the default framebuffer");
            }
            if texture != NULL_OBJECT && !state.textures.contains_key(&texture) {
                return Err(GpuError::UnknownObject { kind: ObjectKind::Texture, id: texture });
            }
            let fb = state
                .framebuffers
                .get_mut(&framebuffer)
                .ok_or(GpuError::UnknownObject { kind: ObjectKind::Framebuffer, id: framebuffer })?;
            if texture == NULL_OBJECT {
                fb.attachments.remove(&attachment);
            } else {
                fb.attachments.insert(attachment, texture);
            }
            Ok(())
        })();
        self.report(result)
    }

    fn framebuffer_draw_buffers(&self, framebuffer: ObjectId, buffers: &[Attachment]) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            let fb = state
                .framebuffers
                .get_mut(&framebuffer)
                .ok_or(GpuError::UnknownObject { kind: ObjectKind::Framebuffer, id: framebuffer })?;
            fb.draw_buffers = buffers.to_vec();
            Ok(())
        })();
        self.report(result)
    }

    fn check_framebuffer_status(&self, framebuffer: ObjectId) -> FramebufferStatus {
        self.state.lock().framebuffer_status(framebuffer)
    }

    fn bind_draw_framebuffer(&self, framebuffer: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            state.framebuffer(framebuffer)?;
            state.bindings.draw_framebuffer = framebuffer;
            state.commands.push(Command::BindFramebuffer(framebuffer));
            Ok(())
        })();
        self.report(result)
    }

    fn read_pixels(&self, framebuffer: ObjectId, attachment: Attachment) -> Result<Readback, GpuError> {
        let result = (|| -> Result<Readback, GpuError> {
            let state = self.state.lock();
            let fb = state.framebuffer(framebuffer)?;
            let texture = fb
                .attachments
                .get(&attachment)
                .and_then(|id| state.textures.get(id))
                .ok_or_else(|| GpuError::InvalidOperation(format!("{:?} is not attached", attachment)))?;
            Ok(texture.image.readback())
        })();
        self.report(result)
    }

    fn vertex_array_vertex_buffer(&self, vao: ObjectId, binding: u32, buffer: ObjectId, offset: usize, stride: u32) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if binding >= MAX_VERTEX_ATTRIBS {
                return invalid(format!("binding {} out of range", binding));
            }
            if buffer != NULL_OBJECT {
                state.buffer(buffer)?;
            }
            let vao = state.vao_mut(vao)?;
            if buffer == NULL_OBJECT {
                vao.bindings.remove(&binding);
            } else {
                vao.bindings.insert(binding, (buffer, offset, stride));
            }
            Ok(())
        })();
        self.report(result)
    }

    fn vertex_array_element_buffer(&self, vao: ObjectId, buffer: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if buffer != NULL_OBJECT {
                state.buffer(buffer)?;
            }
            state.vao_mut(vao)?.element_buffer = buffer;
            Ok(())
        })();
        self.report(result)
    }

    fn vertex_array_attrib_format(
        &self,
        vao: ObjectId,
        attrib: u32,
        size: u32,
        ty: ScalarType,
        normalized: bool,
        relative_offset: u32,
    ) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            if !(1..=4).contains(&size) {
                return invalid(format!("attribute size {} must be 1..=4", size));
            }
            let mut state = self.state.lock();
            let slot = state
                .vao_mut(vao)?
                .attribs
                .get_mut(attrib as usize)
                .ok_or_else(|| GpuError::InvalidOperation(format!("attribute {} out of range", attrib)))?;
            slot.size = size;
            slot.ty = ty;
            slot.normalized = normalized;
            slot.relative_offset = relative_offset;
            Ok(())
        })();
        self.report(result)
    }

    fn vertex_array_attrib_binding(&self, vao: ObjectId, attrib: u32, binding: u32) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            if binding >= MAX_VERTEX_ATTRIBS {
                return invalid(format!("binding {} out of range", binding));
            }
            let mut state = self.state.lock();
            let slot = state
                .vao_mut(vao)?
                .attribs
                .get_mut(attrib as usize)
                .ok_or_else(|| GpuError::InvalidOperation(format!("attribute {} out of range", attrib)))?;
            slot.binding = binding;
            Ok(())
        })();
        self.report(result)
    }

    fn vertex_array_attrib_enabled(&self, vao: ObjectId, attrib: u32, enabled: bool) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            let slot = state
                .vao_mut(vao)?
                .attribs
                .get_mut(attrib as usize)
                .ok_or_else(|| GpuError::InvalidOperation(format!("attribute {} out of range", attrib)))?;
            slot.enabled = enabled;
            Ok(())
        })();
        self.report(result)
    }

    fn bind_vertex_array(&self, vao: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if vao != NULL_OBJECT && !state.vertex_arrays.contains_key(&vao) {
                return Err(GpuError::UnknownObject { kind: ObjectKind::VertexArray, id: vao });
            }
            state.bindings.vertex_array = vao;
            Ok(())
        })();
        self.report(result)
    }

    fn compile_shader(&self, shader: ObjectId, source: &str) -> BuildOutput {
        let outcome = glsl::validate(source);
        let mut state = self.state.lock();
        let Some(store) = state.shaders.get_mut(&shader) else {
            return BuildOutput { success: false, log: format!("error: shader {} does not exist", shader) };
        };
        match outcome {
            Ok(()) => {
                store.compiled = true;
                store.reflection = glsl::reflect(source);
                BuildOutput { success: true, log: String::new() }
            }
            Err(log) => {
                store.compiled = false;
                BuildOutput { success: false, log }
            }
        }
    }

    fn link_program(&self, program: ObjectId, shaders: &[ObjectId]) -> BuildOutput {
        self.state.lock().link(program, shaders)
    }

    fn use_program(&self, program: ObjectId) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            if program != NULL_OBJECT && !state.program(program)?.linked {
                return invalid(format!("program {} is not linked", program));
            }
            state.bindings.program = program;
            state.commands.push(Command::UseProgram(program));
            Ok(())
        })();
        self.report(result)
    }

    fn uniform_location(&self, program: ObjectId, name: &str) -> Option<i32> {
        let state = self.state.lock();
        let program = state.programs.get(&program).filter(|p| p.linked)?;
        program.uniforms.iter().position(|u| u == name).map(|i| i as i32)
    }

    fn program_uniform(&self, program: ObjectId, location: i32, value: UniformValue) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            let store = state
                .programs
                .get_mut(&program)
                .ok_or(GpuError::UnknownObject { kind: ObjectKind::Program, id: program })?;
            if location < 0 || location as usize >= store.uniforms.len() {
                return invalid(format!("uniform location {} out of range for program {}", location, program));
            }
            store.values.insert(location, value);
            Ok(())
        })();
        self.report(result)
    }

    fn uniform_block_index(&self, program: ObjectId, name: &str) -> Option<u32> {
        let state = self.state.lock();
        let program = state.programs.get(&program).filter(|p| p.linked)?;
        program.blocks.iter().position(|b| b == name).map(|i| i as u32)
    }

    fn uniform_block_binding(&self, program: ObjectId, block: u32, binding: u32) -> Result<(), GpuError> {
        let result = (|| -> Result<(), GpuError> {
            let mut state = self.state.lock();
            let store = state
                .programs
                .get_mut(&program)
                .ok_or(GpuError::UnknownObject { kind: ObjectKind::Program, id: program })?;
            if block as usize >= store.blocks.len() {
                return invalid(format!("uniform block {} out of range", block));
            }
            store.block_bindings.insert(block, binding);
            Ok(())
        })();
        self.report(result)
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        let mut state = self.state.lock();
        let raster = &mut state.raster;
        match capability {
            Capability::DepthTest => raster.depth_test = enabled,
            Capability::Blend => raster.blend = enabled,
            Capability::CullFace => raster.cull_face = enabled,
            Capability::ScissorTest => raster.scissor_test = enabled,
        }
    }

    fn depth_func(&self, func: CompareFunc) {
        self.state.lock().raster.depth_func = func;
    }

    fn depth_mask(&self, write: bool) {
        self.state.lock().raster.depth_write = write;
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        self.state.lock().raster.blend_func = (src, dst);
    }

    fn blend_equation(&self, equation: BlendEquation) {
        self.state.lock().raster.blend_equation = equation;
    }

    fn clear_color(&self, rgba: [f32; 4]) {
        self.state.lock().raster.clear_color = rgba;
    }

    fn clear(&self, mask: ClearMask) -> Result<(), GpuError> {
        let result = self.state.lock().clear(mask);
        self.report(result)
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.state.lock().raster.viewport = (x, y, width, height);
    }

    fn draw_arrays(&self, primitive: Primitive, first: u32, count: u32) -> Result<(), GpuError> {
        let result = self.state.lock().record_draw(primitive, DrawKind::Arrays { first, count });
        self.report(result)
    }

    fn draw_elements_base_vertex(
        &self,
        primitive: Primitive,
        count: u32,
        index_type: IndexType,
        offset: usize,
        base_vertex: i32,
    ) -> Result<(), GpuError> {
        let kind = DrawKind::Elements { count, index_type, offset, base_vertex };
        let result = self.state.lock().record_draw(primitive, kind);
        self.report(result)
    }

    fn fence_sync(&self) -> Result<SyncHandle, GpuError> {
        let mut state = self.state.lock();
        let handle = SyncHandle(state.next_sync);
        state.next_sync += 1;
        let signaled = !state.hold_fences;
        state.syncs.insert(handle.0, signaled);
        state.commands.push(Command::FenceSync(handle));
        Ok(handle)
    }

    fn client_wait_sync(&self, sync: SyncHandle, timeout: Duration) -> WaitStatus {
        match self.state.lock().syncs.get(&sync.0) {
            None => return WaitStatus::WaitFailed,
            Some(true) => return WaitStatus::AlreadySignaled,
            Some(false) => {}
        }
        if !timeout.is_zero() {
            std::thread::sleep(timeout);
        }
        match self.state.lock().syncs.get(&sync.0) {
            None => WaitStatus::WaitFailed,
            Some(true) => WaitStatus::ConditionSatisfied,
            Some(false) => WaitStatus::TimeoutExpired,
        }
    }

    fn delete_sync(&self, sync: SyncHandle) {
        self.state.lock().syncs.remove(&sync.0);
    }

    fn push_debug_group(&self, message: &str) {
        {
            let mut state = self.state.lock();
            state.groups.push(message.to_string());
            state.commands.push(Command::PushGroup(message.to_string()));
        }
        self.emit(DebugMessage {
            source: DebugSource::Application,
            kind: DebugKind::PushGroup,
            severity: DebugSeverity::Notification,
            id: 0,
            message: message.to_string(),
        });
    }

    fn pop_debug_group(&self) {
        let popped = {
            let mut state = self.state.lock();
            let popped = state.groups.pop();
            if popped.is_some() {
                state.commands.push(Command::PopGroup);
            }
            popped
        };
        match popped {
            Some(name) => self.emit(DebugMessage {
                source: DebugSource::Application,
                kind: DebugKind::PopGroup,
                severity: DebugSeverity::Notification,
                id: 0,
                message: name,
            }),
            None => self.emit(DebugMessage {
                source: DebugSource::Api,
                kind: DebugKind::Error,
                severity: DebugSeverity::High,
                id: 3,
                message: "debug group stack underflow".into(),
            }),
        }
    }

    fn set_debug_callback(&self, callback: Option<DebugCallback>) {
        *self.callback.lock() = callback.map(Arc::from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_framebuffer_is_complete() {
        let device = HeadlessDevice::new(16, 9);
        assert_eq!(device.check_framebuffer_status(NULL_OBJECT), FramebufferStatus::Complete);
        let pixels = device.read_pixels(NULL_OBJECT, Attachment::Color(0)).unwrap();
        assert_eq!((pixels.width, pixels.height), (16, 9));
        assert_eq!(device.live_objects(ObjectKind::Texture), 0);
        assert_eq!(device.live_objects(ObjectKind::Framebuffer), 0);
    }

    #[test]
    fn api_errors_reach_the_debug_callback() {
        let device = HeadlessDevice::new(4, 4);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        device.set_debug_callback(Some(Box::new(move |m: &DebugMessage| {
            if m.kind == DebugKind::Error {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })));
        assert!(device.draw_arrays(Primitive::Triangles, 0, 3).is_err());
        device.pop_debug_group();
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registered_copy_pass_blends_into_draw_buffers() {
        let device = HeadlessDevice::new(2, 2);
        let vs = device.create_shader(ShaderStage::Vertex).unwrap();
        let fs = device.create_shader(ShaderStage::Fragment).unwrap();
        assert!(device.compile_shader(vs, "void main() {}").success);
        assert!(device
            .compile_shader(fs, "uniform sampler2D src;\nvoid main() {}")
            .success);
        let program = device.create_program().unwrap();
        assert!(device.link_program(program, &[vs, fs]).success);
        device.object_label(ObjectKind::Program, program, "copy");

        let texture = device
            .create_texture(&TextureDesc { format: TextureFormat::Rgba32F, width: 1, height: 1, levels: 1 })
            .unwrap();
        let fb = device.create_framebuffer().unwrap();
        device.framebuffer_texture(fb, Attachment::Color(0), texture).unwrap();
        device.bind_draw_framebuffer(fb).unwrap();
        device.clear_color([0.25, 0.0, 0.0, 1.0]);
        device.clear(ClearMask::COLOR).unwrap();
        device.bind_draw_framebuffer(NULL_OBJECT).unwrap();
        device.clear_color([0.0, 0.0, 0.5, 1.0]);
        device.clear(ClearMask::COLOR).unwrap();

        device.bind_texture_unit(3, texture).unwrap();
        device.use_program(program).unwrap();
        let location = device.uniform_location(program, "src").unwrap();
        device.program_uniform(program, location, UniformValue::Int(3)).unwrap();
        device.set_capability(Capability::Blend, true);
        device.blend_func(BlendFactor::One, BlendFactor::One);
        device.draw_arrays(Primitive::Triangles, 0, 6).unwrap();
        let pixels = device.read_pixels(NULL_OBJECT, Attachment::Color(0)).unwrap();
        let cleared = Image::store(TextureFormat::Rgba8, [0.0, 0.0, 0.5, 1.0]);
        assert!(pixels.texels.iter().all(|t| *t == cleared));

        device.evaluate_copy_pass("copy", "src");
        device.draw_arrays(Primitive::Triangles, 0, 6).unwrap();
        let pixels = device.read_pixels(NULL_OBJECT, Attachment::Color(0)).unwrap();
        let expected = Image::store(TextureFormat::Rgba8, [0.25, 0.0, 0.5, 1.0]);
        assert!(pixels.texels.iter().all(|t| *t == expected));
    }

    #[test]
    fn uniform_ranges_must_be_aligned() {
        let device = HeadlessDevice::new(2, 2);
        assert_eq!(device.uniform_buffer_offset_alignment(), UNIFORM_BUFFER_OFFSET_ALIGNMENT);
        let buffer = device.create_buffer(1024, None, BufferFlags::empty()).unwrap();
        device.bind_uniform_buffer_range(0, buffer, 256, 512).unwrap();
        assert!(matches!(
            device.bind_uniform_buffer_range(0, buffer, 100, 512),
            Err(GpuError::InvalidOperation(_))
        ));
        assert!(matches!(
            device.bind_uniform_buffer_range(0, buffer, 768, 512),
            Err(GpuError::OutOfBounds { .. })
        ));
        let bound: Vec<_> = device
            .commands()
            .into_iter()
            .filter(|c| matches!(c, Command::BindUniformRange { .. }))
            .collect();
        assert_eq!(bound, vec![Command::BindUniformRange { binding: 0, buffer, offset: 256, size: 512 }]);
    }

    #[test]
    fn injected_draw_failure_fires_once_in_its_group() {
        let device = HeadlessDevice::new(2, 2);
        let vs = device.create_shader(ShaderStage::Vertex).unwrap();
        let fs = device.create_shader(ShaderStage::Fragment).unwrap();
        device.compile_shader(vs, "void main() {}");
        device.compile_shader(fs, "void main() {}");
        let program = device.create_program().unwrap();
        device.link_program(program, &[vs, fs]);
        device.use_program(program).unwrap();

        device.fail_next_draw_in("lighting");
        device.push_debug_group("geometry");
        device.draw_arrays(Primitive::Triangles, 0, 3).unwrap();
        device.pop_debug_group();
        device.push_debug_group("lighting");
        assert!(matches!(device.draw_arrays(Primitive::Triangles, 0, 3), Err(GpuError::InvalidOperation(_))));
        device.draw_arrays(Primitive::Triangles, 0, 3).unwrap();
        device.pop_debug_group();
        assert_eq!(device.draws_in_group("lighting").len(), 1);
    }

    #[test]
    fn indexed_draw_checks_vertex_inputs() {
        let device = HeadlessDevice::new(2, 2);
        let vs = device.create_shader(ShaderStage::Vertex).unwrap();
        let fs = device.create_shader(ShaderStage::Fragment).unwrap();
        device.compile_shader(vs, "void main() {}");
        device.compile_shader(fs, "void main() {}");
        let program = device.create_program().unwrap();
        device.link_program(program, &[vs, fs]);
        device.use_program(program).unwrap();

        let vao = device.create_vertex_array().unwrap();
        let indices = device.create_buffer(12, Some(&[0u8; 12]), BufferFlags::empty()).unwrap();
        device.vertex_array_element_buffer(vao, indices).unwrap();
        device.vertex_array_attrib_enabled(vao, 0, true).unwrap();
        device.bind_vertex_array(vao).unwrap();
        assert!(device.draw_elements_base_vertex(Primitive::Triangles, 3, IndexType::U32, 0, 0).is_err());

        let positions = device.create_buffer(36, None, BufferFlags::empty()).unwrap();
        device.vertex_array_vertex_buffer(vao, 0, positions, 0, 12).unwrap();
        device.draw_elements_base_vertex(Primitive::Triangles, 3, IndexType::U32, 0, 0).unwrap();
        assert!(matches!(
            device.draw_elements_base_vertex(Primitive::Triangles, 3, IndexType::U32, 4, 0),
            Err(GpuError::OutOfBounds { .. })
        ));
    }
}
