//! Owns every live program for one rendering context.
//!
//! The registry hands out program ids, walks all programs on frame start and
//! context loss, and applies the host's [`FatalPolicy`] when a program fails
//! to build.
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info};

use crate::driver::GpuDriver;
use crate::error::{PreprocessError, ProgramError};
use crate::preprocess::SourceLoader;
use crate::program::ShaderProgram;
use crate::types::{Capabilities, FatalPolicy, Hydration, ProgramId, ProgramState};

/// Outcome of [`ProgramRegistry::hydrate_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationSummary {
    pub linked: usize,
    pub deferred: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct Registered {
    name: String,
    program: ShaderProgram,
}

#[derive(Debug)]
pub struct ProgramRegistry {
    programs: BTreeMap<ProgramId, Registered>,
    names: HashMap<String, ProgramId>,
    next_id: u64,
    policy: FatalPolicy,
    validate: bool,
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new(FatalPolicy::default())
    }
}

impl ProgramRegistry {
    pub fn new(policy: FatalPolicy) -> Self {
        Self {
            programs: BTreeMap::new(),
            names: HashMap::new(),
            next_id: 1,
            policy,
            validate: cfg!(debug_assertions),
        }
    }

    /// Validation setting applied to programs registered from now on.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn policy(&self) -> FatalPolicy {
        self.policy
    }

    /// Registers a program built by `build` under `name`. The closure receives
    /// the id the program must carry.
    pub fn insert_with<E>(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce(ProgramId) -> Result<ShaderProgram, E>,
    ) -> Result<ProgramId, E> {
        let id = ProgramId::new(self.next_id);
        let mut program = build(id)?;
        self.next_id += 1;
        program.set_validation(self.validate);

        let name = name.into();
        if let Some(previous) = self.names.insert(name.clone(), id) {
            debug!(name = %name, previous = %previous, id = %id, "program name now refers to a newer program");
        }
        debug!(id = %id, name = %name, "registered shader program");
        self.programs.insert(id, Registered { name, program });
        Ok(id)
    }

    /// Loads `vertex` and `fragment` through `loader` and registers the result
    /// under `name`.
    pub fn load(
        &mut self,
        name: impl Into<String>,
        vertex: &str,
        fragment: &str,
        capabilities: Capabilities,
        loader: &dyn SourceLoader,
    ) -> Result<ProgramId, PreprocessError> {
        self.insert_with(name, |id| {
            ShaderProgram::new(id, vertex, fragment, capabilities, loader)
        })
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, id: ProgramId) -> Option<&ShaderProgram> {
        self.programs.get(&id).map(|entry| &entry.program)
    }

    pub fn get_mut(&mut self, id: ProgramId) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(&id).map(|entry| &mut entry.program)
    }

    pub fn id_of(&self, name: &str) -> Option<ProgramId> {
        self.names.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&ShaderProgram> {
        self.get(self.id_of(name)?)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut ShaderProgram> {
        let id = self.id_of(name)?;
        self.get_mut(id)
    }

    /// Programs in id order with the name each was registered under.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShaderProgram)> + '_ {
        self.programs
            .values()
            .map(|entry| (entry.name.as_str(), &entry.program))
    }

    /// Evicts and forgets a program.
    pub fn remove(&mut self, id: ProgramId, driver: &mut dyn GpuDriver) -> Option<ShaderProgram> {
        let Registered { name, mut program } = self.programs.remove(&id)?;
        program.evict(driver);
        if self.names.get(&name) == Some(&id) {
            self.names.remove(&name);
        }
        Some(program)
    }

    /// Clears per-frame latches on every program.
    pub fn begin_frame(&mut self) {
        for entry in self.programs.values_mut() {
            entry.program.begin_frame();
        }
    }

    /// Returns every program to the cold state after context loss.
    pub fn evict_all(&mut self, driver: &mut dyn GpuDriver) {
        for entry in self.programs.values_mut() {
            entry.program.evict(driver);
        }
        info!(programs = self.programs.len(), "evicted all shader programs");
    }

    /// Hydrates every cold program. Programs that already failed are counted
    /// but not retried.
    pub fn hydrate_all(&mut self, driver: &mut dyn GpuDriver) -> Result<HydrationSummary, ProgramError> {
        let mut summary = HydrationSummary::default();
        let policy = self.policy;
        for Registered { program, .. } in self.programs.values_mut() {
            match program.state() {
                ProgramState::Hydrated => summary.linked += 1,
                ProgramState::Failed => summary.failed += 1,
                ProgramState::Cold => match program.hydrate(driver) {
                    Ok(Hydration::Linked) => summary.linked += 1,
                    Ok(Hydration::Deferred) => summary.deferred += 1,
                    Err(err) => {
                        summary.failed += 1;
                        escalate(policy, err)?;
                    }
                },
            }
        }
        debug!(?summary, "hydrated shader programs");
        Ok(summary)
    }

    /// Hydrates `id` if needed and binds it. `Ok(false)` means the program
    /// cannot be drawn this frame (no context yet, or it failed earlier).
    pub fn ensure_bound(&mut self, id: ProgramId, driver: &mut dyn GpuDriver) -> Result<bool, ProgramError> {
        let policy = self.policy;
        let program = self
            .get_mut(id)
            .ok_or(ProgramError::UnknownProgram(id))?;
        match program.state() {
            ProgramState::Failed => return Ok(false),
            ProgramState::Cold => match program.hydrate(driver) {
                Ok(Hydration::Linked) => {}
                Ok(Hydration::Deferred) => return Ok(false),
                Err(err) => {
                    escalate(policy, err)?;
                    return Ok(false);
                }
            },
            ProgramState::Hydrated => {}
        }
        Ok(program.bind(driver))
    }

    /// Evicts everything before the registry goes away.
    pub fn shutdown(mut self, driver: &mut dyn GpuDriver) {
        self.evict_all(driver);
        self.programs.clear();
    }
}

/// Applies the fatal policy to a compile or link failure.
fn escalate(policy: FatalPolicy, err: ProgramError) -> Result<(), ProgramError> {
    match policy {
        FatalPolicy::Propagate => Err(err),
        FatalPolicy::Abort => {
            error!(error = %err, "unrecoverable shader program failure; aborting");
            std::process::abort()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::HeadlessDriver;
    use crate::preprocess::MemoryLoader;
    use crate::types::ShaderStage;

    fn loader() -> MemoryLoader {
        MemoryLoader::new()
            .with("basic.vert", "uniform mat4 mvp_matrix;\nvoid main() {}\n")
            .with("basic.frag", "void main() {}\n")
    }

    #[test]
    fn ids_are_sequential_and_names_resolve() {
        let loader = loader();
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        let a = registry
            .load("a", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();
        let b = registry
            .load("b", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();
        assert_eq!(a.get() + 1, b.get());
        assert_eq!(registry.id_of("b"), Some(b));
        assert_eq!(registry.by_name("a").unwrap().name(), "basic.frag");
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn failed_preprocessing_does_not_consume_an_id() {
        let loader = loader();
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        assert!(registry
            .load("x", "missing.vert", "basic.frag", Capabilities::empty(), &loader)
            .is_err());
        let id = registry
            .load("y", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();
        assert_eq!(id, ProgramId::new(1));
    }

    #[test]
    fn ensure_bound_hydrates_lazily_once_context_exists() {
        let loader = loader();
        let mut driver = HeadlessDriver::without_context();
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        let id = registry
            .load("a", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();

        assert!(!registry.ensure_bound(id, &mut driver).unwrap());
        driver.set_context_available(true);
        assert!(registry.ensure_bound(id, &mut driver).unwrap());
        assert!(registry.get(id).unwrap().is_hydrated());
        registry.shutdown(&mut driver);
        assert_eq!(driver.live_programs(), 0);
    }

    #[test]
    fn propagate_policy_returns_link_errors() {
        let loader = loader();
        let mut driver = HeadlessDriver::new();
        driver.fail_link(true);
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        let id = registry
            .load("a", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();

        let err = registry.hydrate_all(&mut driver).unwrap_err();
        assert!(matches!(err, ProgramError::Link { .. }));
        assert_eq!(registry.get(id).unwrap().state(), ProgramState::Failed);

        driver.fail_link(false);
        let summary = registry.hydrate_all(&mut driver).unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!registry.ensure_bound(id, &mut driver).unwrap());
    }

    #[test]
    fn compile_failure_leaves_no_driver_objects() {
        let loader = loader();
        let mut driver = HeadlessDriver::new();
        driver.fail_compile(Some(ShaderStage::Fragment));
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        registry
            .load("a", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();
        assert!(registry.hydrate_all(&mut driver).is_err());
        assert_eq!(driver.live_programs(), 0);
        assert_eq!(driver.live_shaders(), 0);
    }

    #[test]
    fn remove_evicts_and_forgets_name() {
        let loader = loader();
        let mut driver = HeadlessDriver::new();
        let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
        let id = registry
            .load("a", "basic.vert", "basic.frag", Capabilities::empty(), &loader)
            .unwrap();
        assert!(registry.ensure_bound(id, &mut driver).unwrap());

        let program = registry.remove(id, &mut driver).expect("removed");
        assert_eq!(program.state(), ProgramState::Cold);
        assert_eq!(driver.live_programs(), 0);
        assert_eq!(registry.id_of("a"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut driver = HeadlessDriver::new();
        let mut registry = ProgramRegistry::default();
        assert!(matches!(
            registry.ensure_bound(ProgramId::new(9), &mut driver),
            Err(ProgramError::UnknownProgram(_))
        ));
    }
}
