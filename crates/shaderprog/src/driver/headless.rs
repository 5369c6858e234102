use std::collections::{BTreeMap, HashMap};

use super::{GpuDriver, ProgramHandle, ShaderHandle, UniformData, UniformLocation};
use crate::types::ShaderStage;

/// Call counters exposed for assertions and dry-run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub programs_created: usize,
    pub programs_deleted: usize,
    pub shaders_created: usize,
    pub shaders_deleted: usize,
    pub compiles: usize,
    pub links: usize,
    pub validations: usize,
    pub attribute_bindings: usize,
    pub location_queries: usize,
    pub block_queries: usize,
    pub uploads: usize,
}

/// Owned copy of an upload's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadedValue {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
}

/// A recorded [`GpuDriver::upload_uniform`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub program: Option<ProgramHandle>,
    pub location: UniformLocation,
    pub value: UploadedValue,
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<ShaderHandle>,
    attributes: BTreeMap<String, u32>,
    linked: bool,
    log: String,
    uniforms: BTreeMap<String, UniformLocation>,
    blocks: Vec<String>,
}

/// Software stand-in for a GL context.
///
/// Tracks object lifetimes, reflects uniform names from the `uniform`
/// declarations of the linked sources, and records uploads. Faults can be
/// injected to exercise the failure paths: a missing context, a compile
/// failure for one stage, link and validation failures. A source without a
/// `main(` entry point also fails to compile.
#[derive(Debug)]
pub struct HeadlessDriver {
    context: bool,
    fail_compile: Option<ShaderStage>,
    fail_link: bool,
    fail_validate: bool,
    next_name: u32,
    next_location: u32,
    shaders: HashMap<ShaderHandle, ShaderObject>,
    programs: HashMap<ProgramHandle, ProgramObject>,
    current: Option<ProgramHandle>,
    uploads: Vec<Upload>,
    stats: DriverStats,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDriver {
    pub fn new() -> Self {
        Self {
            context: true,
            fail_compile: None,
            fail_link: false,
            fail_validate: false,
            next_name: 1,
            next_location: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current: None,
            uploads: Vec::new(),
            stats: DriverStats::default(),
        }
    }

    /// A driver whose context has not been created yet.
    pub fn without_context() -> Self {
        Self {
            context: false,
            ..Self::new()
        }
    }

    /// Simulates context creation or loss. Losing the context drops every
    /// object, like a real driver tearing down its share group.
    pub fn set_context_available(&mut self, available: bool) {
        if self.context && !available {
            self.programs.clear();
            self.shaders.clear();
            self.current = None;
        }
        self.context = available;
    }

    pub fn fail_compile(&mut self, stage: Option<ShaderStage>) {
        self.fail_compile = stage;
    }

    pub fn fail_link(&mut self, fail: bool) {
        self.fail_link = fail;
    }

    pub fn fail_validate(&mut self, fail: bool) {
        self.fail_validate = fail;
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    /// Most recent upload to `location`.
    pub fn last_upload(&self, location: UniformLocation) -> Option<&Upload> {
        self.uploads.iter().rev().find(|upload| upload.location == location)
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Attribute slots bound on `program` before its last link.
    pub fn attribute_bindings(&self, program: ProgramHandle) -> Vec<(String, u32)> {
        self.programs
            .get(&program)
            .map(|object| {
                object
                    .attributes
                    .iter()
                    .map(|(name, slot)| (name.clone(), *slot))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn allocate_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }
}

impl GpuDriver for HeadlessDriver {
    fn create_program(&mut self) -> Option<ProgramHandle> {
        if !self.context {
            return None;
        }
        let handle = ProgramHandle::new(self.allocate_name())?;
        self.programs.insert(handle, ProgramObject::default());
        self.stats.programs_created += 1;
        Some(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            self.stats.programs_deleted += 1;
        }
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderHandle> {
        if !self.context {
            return None;
        }
        let handle = ShaderHandle::new(self.allocate_name())?;
        self.shaders.insert(
            handle,
            ShaderObject {
                stage,
                source: String::new(),
                compiled: false,
                log: String::new(),
            },
        );
        self.stats.shaders_created += 1;
        Some(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if self.shaders.remove(&shader).is_some() {
            self.stats.shaders_deleted += 1;
        }
    }

    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> bool {
        self.stats.compiles += 1;
        let injected = self.fail_compile;
        let Some(object) = self.shaders.get_mut(&shader) else {
            return false;
        };
        object.source = source.to_string();
        object.compiled = false;
        object.log.clear();

        if injected == Some(object.stage) {
            object.log = format!("0:1(1): error: injected {} compile failure", object.stage);
        } else if !source.contains("main(") {
            object.log = "0:1(1): error: entry point 'main' not found".to_string();
        } else {
            object.compiled = true;
        }
        object.compiled
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        self.shaders
            .get(&shader)
            .map(|object| object.log.clone())
            .unwrap_or_default()
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.attached.push(shader);
        }
    }

    fn bind_attribute_location(&mut self, program: ProgramHandle, slot: u32, name: &str) {
        self.stats.attribute_bindings += 1;
        if let Some(object) = self.programs.get_mut(&program) {
            object.attributes.insert(name.to_string(), slot);
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> bool {
        self.stats.links += 1;
        let Some(object) = self.programs.get(&program) else {
            return false;
        };

        let mut stages = Vec::new();
        let mut uniforms = Vec::new();
        let mut blocks = Vec::new();
        for shader in &object.attached {
            if let Some(stage) = self.shaders.get(shader).filter(|stage| stage.compiled) {
                stages.push(stage.stage);
                scan_uniforms(&stage.source, &mut uniforms, &mut blocks);
            }
        }

        let log = if self.fail_link {
            Some("error: injected link failure".to_string())
        } else if !stages.contains(&ShaderStage::Vertex) || !stages.contains(&ShaderStage::Fragment)
        {
            Some("error: program needs a compiled vertex and fragment shader".to_string())
        } else {
            None
        };

        let mut reflected = BTreeMap::new();
        if log.is_none() {
            for name in uniforms {
                if !reflected.contains_key(&name) {
                    let location = UniformLocation(self.next_location);
                    self.next_location += 1;
                    reflected.insert(name, location);
                }
            }
        }

        let Some(object) = self.programs.get_mut(&program) else {
            return false;
        };
        object.linked = log.is_none();
        object.log = log.unwrap_or_default();
        object.uniforms = reflected;
        object.blocks = blocks;
        object.linked
    }

    fn validate_program(&mut self, program: ProgramHandle) -> bool {
        self.stats.validations += 1;
        let fail = self.fail_validate;
        match self.programs.get_mut(&program) {
            Some(object) if object.linked && !fail => true,
            Some(object) => {
                object.log = "validation failed: program is not executable".to_string();
                false
            }
            None => false,
        }
    }

    fn program_info_log(&self, program: ProgramHandle) -> String {
        self.programs
            .get(&program)
            .map(|object| object.log.clone())
            .unwrap_or_default()
    }

    fn uniform_block_index(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.stats.block_queries += 1;
        let object = self.programs.get(&program).filter(|object| object.linked)?;
        let index = object.blocks.iter().position(|block| block == name)?;
        u32::try_from(index).ok()
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current = program.filter(|handle| {
            self.programs
                .get(handle)
                .is_some_and(|object| object.linked)
        });
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.stats.location_queries += 1;
        let object = self.programs.get(&program).filter(|object| object.linked)?;
        let base = name.strip_suffix("[0]").unwrap_or(name);
        object.uniforms.get(base).copied()
    }

    fn upload_uniform(&mut self, location: UniformLocation, data: UniformData<'_>) {
        self.stats.uploads += 1;
        let value = match data {
            UniformData::Ints { values, .. } => UploadedValue::Ints(values.to_vec()),
            UniformData::Floats { values, .. } | UniformData::Matrix { values, .. } => {
                UploadedValue::Floats(values.to_vec())
            }
        };
        self.uploads.push(Upload {
            program: self.current,
            location,
            value,
        });
    }
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Collects top-level uniform names and uniform block names from GLSL text.
fn scan_uniforms(source: &str, uniforms: &mut Vec<String>, blocks: &mut Vec<String>) {
    for line in source.lines() {
        let mut line = line.trim();
        if let Some(rest) = line.strip_prefix("layout") {
            match rest.find(')') {
                Some(close) => line = rest[close + 1..].trim_start(),
                None => continue,
            }
        }
        let Some(declaration) = line.strip_prefix("uniform") else {
            continue;
        };
        if !declaration.starts_with(char::is_whitespace) {
            continue;
        }
        let declaration = declaration
            .split("//")
            .next()
            .unwrap_or_default()
            .trim();

        if let Some((head, _)) = declaration.split_once('{') {
            if let Some(block) = head.split_whitespace().last() {
                blocks.push(block.to_string());
            }
            continue;
        }
        let Some((body, _)) = declaration.split_once(';') else {
            // `uniform Block` with the brace on the next line.
            if let Some(block) = declaration.split_whitespace().last() {
                blocks.push(block.to_string());
            }
            continue;
        };

        let mut tokens = body
            .split_whitespace()
            .filter(|token| !PRECISION_QUALIFIERS.contains(token));
        if tokens.next().is_none() {
            continue;
        }
        let names: String = tokens.collect::<Vec<_>>().join(" ");
        for name in names.split(',') {
            let name = name.split('[').next().unwrap_or_default().trim();
            if !name.is_empty() {
                uniforms.push(name.to_string());
            }
        }
    }
}
