use std::collections::HashMap;

use glow::HasContext;

use super::locations::LocationTable;
use super::{GpuDriver, ProgramHandle, ShaderHandle, UniformData, UniformLocation};
use crate::types::ShaderStage;

/// OpenGL backend on top of a `glow` context.
///
/// Driver objects are kept in side tables keyed by the crate's own handles so
/// the same code serves native and web contexts, whose object types differ.
pub struct GlowDriver<G: HasContext> {
    gl: G,
    next_name: u32,
    programs: HashMap<ProgramHandle, G::Program>,
    shaders: HashMap<ShaderHandle, G::Shader>,
    locations: LocationTable<G::UniformLocation>,
    current: Option<ProgramHandle>,
}

impl<G: HasContext> GlowDriver<G> {
    pub fn new(gl: G) -> Self {
        Self {
            gl,
            next_name: 1,
            programs: HashMap::new(),
            shaders: HashMap::new(),
            locations: LocationTable::default(),
            current: None,
        }
    }

    pub fn context(&self) -> &G {
        &self.gl
    }

    fn allocate_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name = self.next_name.wrapping_add(1).max(1);
        name
    }
}

impl<G: HasContext> GpuDriver for GlowDriver<G> {
    fn create_program(&mut self) -> Option<ProgramHandle> {
        let program = match unsafe { self.gl.create_program() } {
            Ok(program) => program,
            Err(err) => {
                tracing::debug!(error = %err, "glCreateProgram failed");
                return None;
            }
        };
        let handle = ProgramHandle::new(self.allocate_name())?;
        self.programs.insert(handle, program);
        Some(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(native) = self.programs.remove(&program) {
            unsafe { self.gl.delete_program(native) };
        }
        self.locations.forget(program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderHandle> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = match unsafe { self.gl.create_shader(kind) } {
            Ok(shader) => shader,
            Err(err) => {
                tracing::debug!(error = %err, %stage, "glCreateShader failed");
                return None;
            }
        };
        let handle = ShaderHandle::new(self.allocate_name())?;
        self.shaders.insert(handle, shader);
        Some(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if let Some(native) = self.shaders.remove(&shader) {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> bool {
        let Some(&native) = self.shaders.get(&shader) else {
            return false;
        };
        unsafe {
            self.gl.shader_source(native, source);
            self.gl.compile_shader(native);
            self.gl.get_shader_compile_status(native)
        }
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        self.shaders
            .get(&shader)
            .map(|&native| unsafe { self.gl.get_shader_info_log(native) })
            .unwrap_or_default()
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        if let (Some(&program), Some(&shader)) =
            (self.programs.get(&program), self.shaders.get(&shader))
        {
            unsafe { self.gl.attach_shader(program, shader) };
        }
    }

    fn bind_attribute_location(&mut self, program: ProgramHandle, slot: u32, name: &str) {
        if let Some(&native) = self.programs.get(&program) {
            unsafe { self.gl.bind_attrib_location(native, slot, name) };
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> bool {
        let Some(&native) = self.programs.get(&program) else {
            return false;
        };
        self.locations.forget(program);
        unsafe {
            self.gl.link_program(native);
            self.gl.get_program_link_status(native)
        }
    }

    fn validate_program(&mut self, program: ProgramHandle) -> bool {
        let Some(&native) = self.programs.get(&program) else {
            return false;
        };
        // Validation reduces to the link status on this backend.
        unsafe { self.gl.get_program_link_status(native) }
    }

    fn program_info_log(&self, program: ProgramHandle) -> String {
        self.programs
            .get(&program)
            .map(|&native| unsafe { self.gl.get_program_info_log(native) })
            .unwrap_or_default()
    }

    fn uniform_block_index(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        let native = *self.programs.get(&program)?;
        unsafe { self.gl.get_uniform_block_index(native, name) }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        let native = program.and_then(|handle| self.programs.get(&handle).copied());
        unsafe { self.gl.use_program(native) };
        self.current = program.filter(|_| native.is_some());
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let native = *self.programs.get(&program)?;
        let gl = &self.gl;
        self.locations
            .resolve(program, name, || unsafe { gl.get_uniform_location(native, name) })
    }

    fn upload_uniform(&mut self, location: UniformLocation, data: UniformData<'_>) {
        let Some(native) = self.locations.native(location) else {
            return;
        };
        let native = Some(native);
        unsafe {
            match data {
                UniformData::Ints { components, values } => match components {
                    1 => self.gl.uniform_1_i32_slice(native, values),
                    2 => self.gl.uniform_2_i32_slice(native, values),
                    3 => self.gl.uniform_3_i32_slice(native, values),
                    _ => self.gl.uniform_4_i32_slice(native, values),
                },
                UniformData::Floats { components, values } => match components {
                    1 => self.gl.uniform_1_f32_slice(native, values),
                    2 => self.gl.uniform_2_f32_slice(native, values),
                    3 => self.gl.uniform_3_f32_slice(native, values),
                    _ => self.gl.uniform_4_f32_slice(native, values),
                },
                UniformData::Matrix { dimension, values } => match dimension {
                    2 => self.gl.uniform_matrix_2_f32_slice(native, false, values),
                    3 => self.gl.uniform_matrix_3_f32_slice(native, false, values),
                    _ => self.gl.uniform_matrix_4_f32_slice(native, false, values),
                },
            }
        }
    }
}
