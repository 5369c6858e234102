//! The seam between program management and the graphics API.
//!
//! Types:
//!
//! - [`GpuDriver`] is the handful of GL-style calls a program needs.
//! - [`ProgramHandle`], [`ShaderHandle`] and [`UniformLocation`] are opaque
//!   driver names; handles are never zero.
//! - [`UniformData`] describes a single typed upload.
//!
//! Backends: [`HeadlessDriver`] (always available, used by tests and dry runs)
//! and `GlowDriver` behind the `glow` feature.
use std::fmt;
use std::num::NonZeroU32;

use crate::types::ShaderStage;

mod headless;
mod locations;
#[cfg(feature = "glow")]
mod gl;

pub use headless::{DriverStats, HeadlessDriver, Upload, UploadedValue};
#[cfg(feature = "glow")]
pub use gl::GlowDriver;

/// Linked (or linking) program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramHandle(NonZeroU32);

impl ProgramHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shader object for a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderHandle(NonZeroU32);

impl ShaderHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Driver-assigned uniform location. Only meaningful for the program it was
/// queried from, and only until that program is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniformLocation(pub u32);

/// Values for one uniform upload. `values` holds every element of an array
/// uniform back to back; matrices are column-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Ints { components: usize, values: &'a [i32] },
    Floats { components: usize, values: &'a [f32] },
    Matrix { dimension: usize, values: &'a [f32] },
}

impl UniformData<'_> {
    /// Single `int`, as used for sampler units.
    pub fn int(value: &i32) -> UniformData<'_> {
        UniformData::Ints {
            components: 1,
            values: std::slice::from_ref(value),
        }
    }

    pub fn mat4(values: &[f32; 16]) -> UniformData<'_> {
        UniformData::Matrix {
            dimension: 4,
            values,
        }
    }
}

/// GL-style calls used to build, bind and feed programs.
///
/// Every call must be made on the thread that owns the rendering context;
/// methods take `&mut self` so the borrow checker serialises callers.
pub trait GpuDriver {
    /// Allocates a program object. `None` means no context is current.
    fn create_program(&mut self) -> Option<ProgramHandle>;
    fn delete_program(&mut self, program: ProgramHandle);

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderHandle>;
    fn delete_shader(&mut self, shader: ShaderHandle);
    /// Uploads `source` and compiles it, returning the compile status.
    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> bool;
    fn shader_info_log(&self, shader: ShaderHandle) -> String;

    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle);
    fn bind_attribute_location(&mut self, program: ProgramHandle, slot: u32, name: &str);
    fn link_program(&mut self, program: ProgramHandle) -> bool;
    fn validate_program(&mut self, program: ProgramHandle) -> bool;
    fn program_info_log(&self, program: ProgramHandle) -> String;
    fn uniform_block_index(&mut self, program: ProgramHandle, name: &str) -> Option<u32>;

    /// Makes `program` current, or clears the current program.
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn current_program(&self) -> Option<ProgramHandle>;

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    /// Writes to `location` of the current program.
    fn upload_uniform(&mut self, location: UniformLocation, data: UniformData<'_>);
}
