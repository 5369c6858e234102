//! Wraps a shader library directory: its `programs.toml` manifest plus the
//! GLSL files the manifest names. Loading validates the manifest up front so
//! later failures point at shader code rather than configuration.
//!
//! Types:
//!
//! - `PackError` classifies manifest, I/O, and source assembly failures.
//! - `ProgramPack` stores the root directory and the parsed manifest.
//!
//! Functions:
//!
//! - `ProgramPack::load` reads `programs.toml` from a directory;
//!   `ProgramPack::from_manifest_path` reads an explicitly named manifest.
//! - `ProgramPack::ensure_sources` confirms every stage source resolves.
//! - `build_program` turns one manifest entry into a declared, cold
//!   `ShaderProgram`; `ProgramPack::register_all` does so for every entry.
use std::fs;
use std::path::{Path, PathBuf};

use shaderprog::{PreprocessError, ProgramId, ProgramRegistry, ShaderProgram, SourceLoader};
use thiserror::Error;
use tracing::debug;

use crate::manifest::{ProgramEntry, ProgramManifest};
use crate::source::DirectoryLoader;

pub const MANIFEST_FILE: &str = "programs.toml";

#[derive(Debug, Error)]
pub enum PackError {
    #[error("manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("manifest validation failed: {0:?}")]
    ManifestValidation(Vec<String>),

    #[error("program '{program}' could not be assembled")]
    Source {
        program: String,
        #[source]
        source: PreprocessError,
    },

    #[error("program '{program}' is invalid: {reason}")]
    Declaration { program: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ProgramPack {
    root: PathBuf,
    manifest: ProgramManifest,
}

impl ProgramPack {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackError> {
        let root = root.as_ref();
        Self::from_manifest_path(root.join(MANIFEST_FILE))
    }

    /// Loads a manifest stored anywhere; its directory becomes the pack root.
    pub fn from_manifest_path(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let manifest_path = path.as_ref();
        if !manifest_path.is_file() {
            return Err(PackError::ManifestMissing(manifest_path.to_path_buf()));
        }

        let manifest_raw = fs::read_to_string(manifest_path)?;
        let manifest = ProgramManifest::from_toml_str(&manifest_raw)?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(PackError::ManifestValidation(issues));
        }

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(
            manifest = %manifest_path.display(),
            programs = manifest.programs.len(),
            "loaded program manifest"
        );
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn manifest(&self) -> &ProgramManifest {
        &self.manifest
    }

    pub fn programs(&self) -> impl Iterator<Item = &ProgramEntry> {
        self.manifest.programs.iter()
    }

    /// Loader searching only the pack root for files with `extension`.
    pub fn loader(&self, extension: &str) -> DirectoryLoader {
        DirectoryLoader::new(vec![self.root.clone()], extension)
    }

    /// Confirms every declared stage source resolves through `loader`.
    pub fn ensure_sources(&self, loader: &DirectoryLoader) -> Result<(), PackError> {
        let missing: Vec<String> = self
            .programs()
            .flat_map(|entry| {
                loader
                    .missing([entry.vertex.as_str(), entry.fragment.as_str()])
                    .into_iter()
                    .map(move |name| format!("program '{}': missing shader source '{name}'", entry.name))
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PackError::ManifestValidation(missing))
        }
    }

    /// Builds every manifest entry into `registry`, returning ids in manifest
    /// order.
    pub fn register_all(
        &self,
        registry: &mut ProgramRegistry,
        loader: &dyn SourceLoader,
    ) -> Result<Vec<ProgramId>, PackError> {
        self.programs()
            .map(|entry| {
                registry.insert_with(entry.name.clone(), |id| build_program(id, entry, loader))
            })
            .collect()
    }
}

/// Loads, inflates and declares one program. The result is cold.
pub fn build_program(
    id: ProgramId,
    entry: &ProgramEntry,
    loader: &dyn SourceLoader,
) -> Result<ShaderProgram, PackError> {
    let declaration = |reason: String| PackError::Declaration {
        program: entry.name.clone(),
        reason,
    };
    let attributes = entry.attribute_semantics().map_err(declaration)?;
    let uniforms = entry
        .uniforms
        .iter()
        .map(|uniform| uniform.to_uniform())
        .collect::<Result<Vec<_>, _>>()
        .map_err(declaration)?;

    let mut program = ShaderProgram::new(
        id,
        &entry.vertex,
        &entry.fragment,
        entry.capabilities(),
        loader,
    )
    .map_err(|source| PackError::Source {
        program: entry.name.clone(),
        source,
    })?;
    for attribute in attributes {
        program.add_attribute(attribute);
    }
    program.set_uniforms(uniforms);
    program.set_samplers(entry.samplers.iter().cloned());
    Ok(program)
}
