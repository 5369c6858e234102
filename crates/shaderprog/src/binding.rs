//! Per-program cache of everything reflection resolves after a link: uniform
//! locations (stored on the uniforms themselves), sampler units, the fixed
//! transform locations and the lighting block index.
//!
//! The cache starts dirty and is refreshed by the first `bind()` after each
//! hydration or declaration change; eviction drops every cached location.
use crate::driver::{GpuDriver, ProgramHandle, UniformData, UniformLocation};
use crate::types::{Capabilities, TransformSlot};
use crate::uniform::Uniform;

/// Sampler name with the texture unit it was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub location: Option<UniformLocation>,
    pub unit: u32,
}

#[derive(Debug)]
pub struct BindingCache {
    transforms: [Option<UniformLocation>; 3],
    samplers: Vec<SamplerBinding>,
    lighting_block: Option<u32>,
    needs_rebind: bool,
    reflections: usize,
}

impl Default for BindingCache {
    fn default() -> Self {
        Self {
            transforms: [None; 3],
            samplers: Vec::new(),
            lighting_block: None,
            needs_rebind: true,
            reflections: 0,
        }
    }
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_rebind(&self) -> bool {
        self.needs_rebind
    }

    /// Number of reflection passes run over the program's lifetime.
    pub fn reflections(&self) -> usize {
        self.reflections
    }

    pub fn transform(&self, slot: TransformSlot) -> Option<UniformLocation> {
        self.transforms[slot.index()]
    }

    pub fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }

    pub fn sampler_unit(&self, name: &str) -> Option<u32> {
        self.samplers
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| binding.unit)
    }

    pub fn lighting_block(&self) -> Option<u32> {
        self.lighting_block
    }

    pub(crate) fn set_lighting_block(&mut self, index: Option<u32>) {
        self.lighting_block = index;
    }

    /// Requests a reflection pass on the next bind.
    pub(crate) fn mark_dirty(&mut self) {
        self.needs_rebind = true;
    }

    /// Drops every cached location; used when the program object goes away.
    pub(crate) fn invalidate(&mut self) {
        self.transforms = [None; 3];
        self.samplers.clear();
        self.lighting_block = None;
        self.needs_rebind = true;
    }

    /// Resolves uniform, sampler and transform locations for `program`, which
    /// must be the driver's current program so sampler units can be written.
    pub(crate) fn reflect(
        &mut self,
        driver: &mut dyn GpuDriver,
        program: ProgramHandle,
        capabilities: Capabilities,
        uniforms: &mut [Uniform],
        samplers: &[String],
    ) {
        for uniform in uniforms.iter_mut() {
            let location = driver.uniform_location(program, uniform.name());
            if location.is_none() {
                tracing::debug!(uniform = %uniform.name(), "uniform not active in program");
            }
            uniform.set_location(location);
        }

        self.samplers.clear();
        for (unit, name) in (0u32..).zip(samplers) {
            let location = driver.uniform_location(program, name);
            match location {
                Some(location) => {
                    let value = unit as i32;
                    driver.upload_uniform(location, UniformData::int(&value));
                }
                None => tracing::debug!(sampler = %name, unit, "sampler not active in program"),
            }
            self.samplers.push(SamplerBinding {
                name: name.clone(),
                location,
                unit,
            });
        }

        for slot in TransformSlot::ALL {
            let enabled = slot
                .required_capability()
                .map_or(true, |required| capabilities.contains(required));
            self.transforms[slot.index()] = if enabled {
                driver.uniform_location(program, slot.uniform_name())
            } else {
                None
            };
        }

        self.needs_rebind = false;
        self.reflections += 1;
    }
}
