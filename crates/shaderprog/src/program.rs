//! A single shader program and its hydrate/evict lifecycle.
//!
//! ```text
//!   new() ──▶ Cold ──hydrate()──▶ Hydrated ──bind()──▶ reflect once, draw
//!              ▲  │                  │
//!              │  └─ no context ─────┼──▶ Deferred (still Cold, retry later)
//!              │                     │
//!              └─────── evict() ─────┘
//!   compile/link failure ──▶ Failed (bind() refuses forever)
//! ```
//!
//! Source text and declarations survive eviction, so a program can be rebuilt
//! after context loss without the caller re-declaring anything.
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, error, info, warn};

use crate::binding::BindingCache;
use crate::driver::{GpuDriver, ProgramHandle, ShaderHandle, UniformData};
use crate::error::{PreprocessError, ProgramError};
use crate::preprocess::{inflate_includes, load_and_inflate, SourceLoader};
use crate::types::{
    AttributeSemantic, Capabilities, Hydration, ProgramId, ProgramState, ShaderStage,
    TransformSlot,
};
use crate::uniform::Uniform;

/// Uniform block shared by every lit program.
pub const LIGHTING_BLOCK: &str = "lighting";

#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    name: String,
    vertex_source: String,
    fragment_source: String,
    capabilities: Capabilities,
    uniforms: Vec<Uniform>,
    samplers: Vec<String>,
    handle: Option<ProgramHandle>,
    state: ProgramState,
    bindings: BindingCache,
    normal_latched: bool,
    validate: bool,
}

impl ShaderProgram {
    /// Loads both stages through `loader` and inflates their includes. The
    /// program is named after its fragment shader.
    pub fn new(
        id: ProgramId,
        vertex: &str,
        fragment: &str,
        capabilities: Capabilities,
        loader: &dyn SourceLoader,
    ) -> Result<Self, PreprocessError> {
        let vertex_source = load_and_inflate(loader, vertex)?;
        let fragment_source = load_and_inflate(loader, fragment)?;
        Ok(Self::assemble(
            id,
            fragment.to_string(),
            vertex_source,
            fragment_source,
            capabilities,
        ))
    }

    /// Builds a program from source text already in hand. Includes are still
    /// resolved through `loader`.
    pub fn from_sources(
        id: ProgramId,
        name: impl Into<String>,
        vertex_source: &str,
        fragment_source: &str,
        capabilities: Capabilities,
        loader: &dyn SourceLoader,
    ) -> Result<Self, PreprocessError> {
        let vertex_source = inflate_includes(vertex_source, loader)?;
        let fragment_source = inflate_includes(fragment_source, loader)?;
        Ok(Self::assemble(
            id,
            name.into(),
            vertex_source,
            fragment_source,
            capabilities,
        ))
    }

    fn assemble(
        id: ProgramId,
        name: String,
        vertex_source: String,
        fragment_source: String,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            id,
            name,
            vertex_source,
            fragment_source,
            capabilities,
            uniforms: Vec::new(),
            samplers: Vec::new(),
            handle: None,
            state: ProgramState::Cold,
            bindings: BindingCache::new(),
            normal_latched: false,
            validate: cfg!(debug_assertions),
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn is_hydrated(&self) -> bool {
        self.state == ProgramState::Hydrated
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn bindings(&self) -> &BindingCache {
        &self.bindings
    }

    pub fn lighting_block_index(&self) -> Option<u32> {
        self.bindings.lighting_block()
    }

    /// Enables driver-side validation after each successful link.
    pub fn set_validation(&mut self, enabled: bool) {
        self.validate = enabled;
    }

    // Declarations

    /// Replaces every declared uniform.
    pub fn set_uniforms(&mut self, uniforms: impl IntoIterator<Item = Uniform>) {
        self.uniforms.clear();
        for uniform in uniforms {
            self.add_uniform(uniform);
        }
        self.bindings.mark_dirty();
    }

    /// Declares a uniform and returns its index. A uniform with the same name
    /// is replaced in place.
    pub fn add_uniform(&mut self, uniform: Uniform) -> usize {
        self.bindings.mark_dirty();
        match self.uniform_index(uniform.name()) {
            Some(index) => {
                warn!(
                    program = %self.id,
                    uniform = %uniform.name(),
                    "uniform declared twice; replacing earlier declaration"
                );
                self.uniforms[index] = uniform;
                index
            }
            None => {
                self.uniforms.push(uniform);
                self.uniforms.len() - 1
            }
        }
    }

    /// Replaces the sampler list. Texture units follow the order given.
    pub fn set_samplers<S: Into<String>>(&mut self, samplers: impl IntoIterator<Item = S>) {
        self.samplers = samplers.into_iter().map(Into::into).collect();
        self.bindings.mark_dirty();
    }

    pub fn add_sampler(&mut self, name: impl Into<String>) {
        self.samplers.push(name.into());
        self.bindings.mark_dirty();
    }

    pub fn samplers(&self) -> &[String] {
        &self.samplers
    }

    /// Declares a vertex attribute, enabling its capability bit.
    ///
    /// # Panics
    ///
    /// Panics if the program is hydrated: attribute slots are bound at link
    /// time and cannot change afterwards.
    pub fn add_attribute(&mut self, semantic: AttributeSemantic) {
        assert!(
            self.state != ProgramState::Hydrated,
            "attribute '{semantic}' declared on hydrated program {} '{}'",
            self.id,
            self.name
        );
        if let Some(capability) = semantic.capability() {
            self.capabilities |= capability;
        }
    }

    // Lifecycle

    /// Builds the GPU program.
    ///
    /// Returns [`Hydration::Deferred`] when no context can allocate objects;
    /// the program stays cold and the call may be repeated. Compile and link
    /// failures mark the program failed and are returned on every later call.
    pub fn hydrate(&mut self, driver: &mut dyn GpuDriver) -> Result<Hydration, ProgramError> {
        match self.state {
            ProgramState::Hydrated => return Ok(Hydration::Linked),
            ProgramState::Failed => {
                return Err(ProgramError::Failed {
                    id: self.id,
                    name: self.name.clone(),
                })
            }
            ProgramState::Cold => {}
        }

        let Some(program) = driver.create_program() else {
            info!(program = %self.id, name = %self.name, "no rendering context; deferring hydration");
            return Ok(Hydration::Deferred);
        };

        let vertex = match self.compile_stage(driver, ShaderStage::Vertex) {
            Ok(Some(shader)) => shader,
            Ok(None) => {
                driver.delete_program(program);
                return Ok(Hydration::Deferred);
            }
            Err(err) => {
                driver.delete_program(program);
                return Err(self.fail(err));
            }
        };
        let fragment = match self.compile_stage(driver, ShaderStage::Fragment) {
            Ok(Some(shader)) => shader,
            Ok(None) => {
                driver.delete_shader(vertex);
                driver.delete_program(program);
                return Ok(Hydration::Deferred);
            }
            Err(err) => {
                driver.delete_shader(vertex);
                driver.delete_program(program);
                return Err(self.fail(err));
            }
        };

        driver.attach_shader(program, vertex);
        driver.attach_shader(program, fragment);
        let position = AttributeSemantic::Position;
        driver.bind_attribute_location(program, position.slot(), position.attribute_name());
        for semantic in AttributeSemantic::OPTIONAL {
            if semantic
                .capability()
                .is_some_and(|capability| self.capabilities.contains(capability))
            {
                driver.bind_attribute_location(program, semantic.slot(), semantic.attribute_name());
            }
        }

        if !driver.link_program(program) {
            let log = driver.program_info_log(program);
            driver.delete_shader(vertex);
            driver.delete_shader(fragment);
            driver.delete_program(program);
            error!(program = %self.id, name = %self.name, log = %log.trim_end(), "shader program failed to link");
            return Err(self.fail(ProgramError::Link {
                id: self.id,
                name: self.name.clone(),
                log,
            }));
        }

        let lighting = driver.uniform_block_index(program, LIGHTING_BLOCK);
        driver.delete_shader(vertex);
        driver.delete_shader(fragment);

        if self.validate && !driver.validate_program(program) {
            let log = driver.program_info_log(program);
            warn!(program = %self.id, name = %self.name, log = %log.trim_end(), "shader program failed validation");
        }

        self.handle = Some(program);
        self.state = ProgramState::Hydrated;
        self.bindings.set_lighting_block(lighting);
        self.bindings.mark_dirty();
        debug!(
            program = %self.id,
            name = %self.name,
            handle = %program,
            lighting_block = ?lighting,
            "shader program hydrated"
        );
        Ok(Hydration::Linked)
    }

    /// Compiles one stage. `Ok(None)` means the context vanished mid-build.
    fn compile_stage(
        &self,
        driver: &mut dyn GpuDriver,
        stage: ShaderStage,
    ) -> Result<Option<ShaderHandle>, ProgramError> {
        let Some(shader) = driver.create_shader(stage) else {
            return Ok(None);
        };
        let source = match stage {
            ShaderStage::Vertex => &self.vertex_source,
            ShaderStage::Fragment => &self.fragment_source,
        };
        if driver.compile_shader(shader, source) {
            let log = driver.shader_info_log(shader);
            if !log.trim().is_empty() {
                debug!(program = %self.id, %stage, log = %log.trim_end(), "shader compiled with diagnostics");
            }
            return Ok(Some(shader));
        }

        let log = driver.shader_info_log(shader);
        driver.delete_shader(shader);
        error!(
            program = %self.id,
            name = %self.name,
            %stage,
            log = %log.trim_end(),
            source = %numbered(source),
            "shader stage failed to compile"
        );
        Err(ProgramError::Compile {
            id: self.id,
            name: self.name.clone(),
            stage,
            log,
            code: source.clone(),
        })
    }

    fn fail(&mut self, err: ProgramError) -> ProgramError {
        self.state = ProgramState::Failed;
        self.handle = None;
        err
    }

    /// Releases the GPU program, keeping source and declarations.
    ///
    /// Safe to call in any state. A failed program stays failed.
    pub fn evict(&mut self, driver: &mut dyn GpuDriver) {
        if let Some(handle) = self.handle.take() {
            driver.delete_program(handle);
            debug!(program = %self.id, name = %self.name, handle = %handle, "shader program evicted");
        }
        for uniform in &mut self.uniforms {
            uniform.reset();
        }
        self.bindings.invalidate();
        self.normal_latched = false;
        if self.state == ProgramState::Hydrated {
            self.state = ProgramState::Cold;
        }
    }

    /// Makes the program current, reflecting locations on the first bind after
    /// a (re)hydration or declaration change. Returns `false` if the program is
    /// not hydrated.
    pub fn bind(&mut self, driver: &mut dyn GpuDriver) -> bool {
        let Some(handle) = self.handle.filter(|_| self.state == ProgramState::Hydrated) else {
            return false;
        };
        driver.use_program(Some(handle));
        if self.bindings.needs_rebind() {
            self.bindings.reflect(
                driver,
                handle,
                self.capabilities,
                &mut self.uniforms,
                &self.samplers,
            );
            debug!(
                program = %self.id,
                uniforms = self.uniforms.len(),
                samplers = self.samplers.len(),
                "reflected program bindings"
            );
        }
        true
    }

    /// Clears the driver's current program, whichever program that is.
    pub fn unbind(&self, driver: &mut dyn GpuDriver) {
        driver.use_program(None);
    }

    /// Clears once-per-frame latches. Must run at the start of every frame.
    pub fn begin_frame(&mut self) {
        self.normal_latched = false;
    }

    /// Whether this program is current. Locations resolved earlier stay valid
    /// while a declaration change waits for the next reflection, since the
    /// program object is unchanged; new declarations have no location yet.
    fn is_active(&self, driver: &dyn GpuDriver) -> bool {
        self.handle.is_some() && driver.current_program() == self.handle
    }

    // Uniform lookup and values

    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|uniform| uniform.name() == name)
    }

    pub fn uniform(&self, index: usize) -> Option<&Uniform> {
        self.uniforms.get(index)
    }

    pub fn uniform_by_name(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.iter().find(|uniform| uniform.name() == name)
    }

    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    /// Declared names the driver did not report after the last reflection.
    pub fn unresolved_names(&self) -> Vec<&str> {
        let uniforms = self
            .uniforms
            .iter()
            .filter(|uniform| uniform.location().is_none())
            .map(Uniform::name);
        let samplers = self
            .bindings
            .samplers()
            .iter()
            .filter(|binding| binding.location.is_none())
            .map(|binding| binding.name.as_str());
        uniforms.chain(samplers).collect()
    }

    /// Writes raw bytes to the uniform at `index`. Returns whether a driver
    /// upload was issued.
    pub fn set_uniform_at(&mut self, driver: &mut dyn GpuDriver, index: usize, bytes: &[u8]) -> bool {
        let active = self.is_active(driver);
        match self.uniforms.get_mut(index) {
            Some(uniform) => uniform.set(bytes, driver, active),
            None => false,
        }
    }

    /// Writes raw bytes to the uniform called `name`. Unknown names are
    /// ignored.
    pub fn set_uniform_value(&mut self, driver: &mut dyn GpuDriver, name: &str, bytes: &[u8]) -> bool {
        match self.uniform_index(name) {
            Some(index) => self.set_uniform_at(driver, index, bytes),
            None => false,
        }
    }

    pub fn set_vec3(&mut self, driver: &mut dyn GpuDriver, name: &str, value: Vec3) -> bool {
        self.set_uniform_value(driver, name, bytemuck::bytes_of(&value))
    }

    pub fn set_vec4(&mut self, driver: &mut dyn GpuDriver, name: &str, value: Vec4) -> bool {
        self.set_uniform_value(driver, name, bytemuck::bytes_of(&value))
    }

    pub fn set_mat4(&mut self, driver: &mut dyn GpuDriver, name: &str, value: &Mat4) -> bool {
        self.set_uniform_value(driver, name, bytemuck::bytes_of(value))
    }

    pub fn set_int(&mut self, driver: &mut dyn GpuDriver, name: &str, value: i32) -> bool {
        self.set_uniform_value(driver, name, bytemuck::bytes_of(&value))
    }

    pub fn set_float(&mut self, driver: &mut dyn GpuDriver, name: &str, value: f32) -> bool {
        self.set_uniform_value(driver, name, bytemuck::bytes_of(&value))
    }

    // Transforms

    pub fn set_vertex_transform(&mut self, driver: &mut dyn GpuDriver, mvp: &Mat4) -> bool {
        self.upload_transform(driver, TransformSlot::ModelViewProjection, mvp)
    }

    pub fn set_texture_transform(&mut self, driver: &mut dyn GpuDriver, matrix: &Mat4) -> bool {
        self.upload_transform(driver, TransformSlot::TextureNormal, matrix)
    }

    /// Uploads the normal transform at most once per frame; later calls are
    /// ignored until [`ShaderProgram::begin_frame`].
    pub fn set_normal_transform(&mut self, driver: &mut dyn GpuDriver, matrix: &Mat4) -> bool {
        if self.normal_latched {
            return false;
        }
        let uploaded = self.upload_transform(driver, TransformSlot::NormalNormal, matrix);
        self.normal_latched = uploaded;
        uploaded
    }

    fn upload_transform(&mut self, driver: &mut dyn GpuDriver, slot: TransformSlot, matrix: &Mat4) -> bool {
        if !self.is_active(driver) {
            return false;
        }
        let Some(location) = self.bindings.transform(slot) else {
            return false;
        };
        driver.upload_uniform(location, UniformData::mat4(&matrix.to_cols_array()));
        true
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if let Some(handle) = self.handle {
            warn!(
                program = %self.id,
                name = %self.name,
                handle = %handle,
                "shader program dropped while hydrated; call evict() first"
            );
        }
    }
}

/// Source listing with line numbers for compile diagnostics.
fn numbered(source: &str) -> String {
    let mut listing = String::with_capacity(source.len() + source.len() / 8);
    for (index, line) in source.lines().enumerate() {
        listing.push_str(&format!("\n{:>4} | {line}", index + 1));
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::HeadlessDriver;
    use crate::preprocess::MemoryLoader;
    use crate::uniform::UniformKind;

    const VERTEX: &str = "\
uniform mat4 mvp_matrix;
uniform mat4 norm_norm_matrix;
void main() {}
";
    const FRAGMENT: &str = "\
uniform vec3 tint;
uniform sampler2D diffuse;
void main() {}
";

    fn program() -> ShaderProgram {
        let loader = MemoryLoader::new();
        ShaderProgram::from_sources(
            ProgramId::new(1),
            "test",
            VERTEX,
            FRAGMENT,
            Capabilities::empty(),
            &loader,
        )
        .expect("program")
    }

    #[test]
    fn attribute_declaration_sets_capability() {
        let mut program = program();
        program.add_attribute(AttributeSemantic::Normal);
        program.add_attribute(AttributeSemantic::Position);
        assert_eq!(program.capabilities(), Capabilities::NORMAL);
    }

    #[test]
    #[should_panic(expected = "declared on hydrated program")]
    fn attribute_after_hydration_panics() {
        let mut driver = HeadlessDriver::new();
        let mut program = program();
        program.hydrate(&mut driver).expect("hydrate");
        program.add_attribute(AttributeSemantic::Color);
    }

    #[test]
    fn duplicate_uniform_replaces_in_place() {
        let mut program = program();
        let first = program.add_uniform(Uniform::new(UniformKind::Float, "tint", 1));
        let second = program.add_uniform(Uniform::new(UniformKind::Float3, "tint", 1));
        assert_eq!(first, second);
        assert_eq!(program.uniforms().len(), 1);
        assert_eq!(program.uniform(first).unwrap().kind(), UniformKind::Float3);
    }

    #[test]
    fn normal_transform_latches_until_next_frame() {
        let mut driver = HeadlessDriver::new();
        let mut program = program();
        program.add_attribute(AttributeSemantic::Normal);
        program.hydrate(&mut driver).expect("hydrate");
        assert!(program.bind(&mut driver));

        assert!(program.set_normal_transform(&mut driver, &Mat4::IDENTITY));
        assert!(!program.set_normal_transform(&mut driver, &Mat4::IDENTITY));
        program.begin_frame();
        assert!(program.set_normal_transform(&mut driver, &Mat4::IDENTITY));
    }

    #[test]
    fn gated_transform_is_not_reflected_without_capability() {
        let mut driver = HeadlessDriver::new();
        let mut program = program();
        program.hydrate(&mut driver).expect("hydrate");
        assert!(program.bind(&mut driver));
        assert!(program.bindings().transform(TransformSlot::NormalNormal).is_none());
        assert!(program.set_vertex_transform(&mut driver, &Mat4::IDENTITY));
        assert!(!program.set_normal_transform(&mut driver, &Mat4::IDENTITY));
    }

    #[test]
    fn values_wait_for_bind() {
        let mut driver = HeadlessDriver::new();
        let mut program = program();
        program.add_uniform(Uniform::new(UniformKind::Float3, "tint", 1));
        program.hydrate(&mut driver).expect("hydrate");

        assert!(!program.set_vec3(&mut driver, "tint", Vec3::ONE));
        assert_eq!(driver.stats().uploads, 0);

        assert!(program.bind(&mut driver));
        assert!(program.set_vec3(&mut driver, "tint", Vec3::new(0.5, 0.25, 1.0)));
        let location = program.uniform_by_name("tint").unwrap().location().unwrap();
        let upload = driver.last_upload(location).expect("upload");
        assert_eq!(
            upload.value,
            crate::driver::UploadedValue::Floats(vec![0.5, 0.25, 1.0])
        );
    }

    #[test]
    fn unresolved_names_lists_inactive_declarations() {
        let mut driver = HeadlessDriver::new();
        let mut program = program();
        program.add_uniform(Uniform::new(UniformKind::Float3, "tint", 1));
        program.add_uniform(Uniform::new(UniformKind::Float, "typo", 1));
        program.set_samplers(["diffuse", "missing"]);
        program.hydrate(&mut driver).expect("hydrate");
        assert!(program.bind(&mut driver));
        assert_eq!(program.unresolved_names(), vec!["typo", "missing"]);
        assert_eq!(program.bindings().sampler_unit("missing"), Some(1));
        program.evict(&mut driver);
    }

    #[test]
    fn numbered_listing_counts_from_one() {
        assert_eq!(numbered("a\nb\n"), "\n   1 | a\n   2 | b");
    }
}
