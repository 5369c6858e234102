//! Defines the `programs.toml` schema: which vertex/fragment pair each named
//! program uses, and which uniforms, samplers and vertex attributes it
//! declares before its first hydration.
//!
//! ```toml
//! [[program]]
//! name = "lit"
//! vertex = "lit.vert"
//! fragment = "lit.frag"
//! attributes = ["normal", "texcoord"]
//! samplers = ["albedo"]
//!
//! [[program.uniform]]
//! kind = "vec3"
//! name = "tint"
//! ```
//!
//! Types:
//!
//! - `ProgramManifest` is the ordered list of program entries.
//! - `ProgramEntry` names the two stage sources and the declarations.
//! - `UniformEntry` is one `(kind, name, array_size)` uniform declaration.
//!
//! Functions:
//!
//! - `ProgramManifest::validate` returns human-readable issues so loaders can
//!   report every misconfiguration at once instead of failing on the first.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shaderprog::{AttributeSemantic, Capabilities, Uniform, UniformKind};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProgramManifest {
    #[serde(default, rename = "program")]
    pub programs: Vec<ProgramEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgramEntry {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default, rename = "uniform")]
    pub uniforms: Vec<UniformEntry>,
    #[serde(default)]
    pub samplers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UniformEntry {
    pub kind: String,
    pub name: String,
    #[serde(default = "default_array_size")]
    pub array_size: usize,
}

fn default_array_size() -> usize {
    1
}

impl UniformEntry {
    pub fn kind(&self) -> Result<UniformKind, String> {
        self.kind.parse()
    }

    pub fn to_uniform(&self) -> Result<Uniform, String> {
        Ok(Uniform::new(self.kind()?, self.name.clone(), self.array_size))
    }
}

impl ProgramEntry {
    pub fn attribute_semantics(&self) -> Result<Vec<AttributeSemantic>, String> {
        self.attributes.iter().map(|raw| raw.parse()).collect()
    }

    /// Capability mask implied by the declared attributes.
    pub fn capabilities(&self) -> Capabilities {
        self.attributes
            .iter()
            .filter_map(|raw| raw.parse::<AttributeSemantic>().ok())
            .filter_map(AttributeSemantic::capability)
            .fold(Capabilities::empty(), |mask, bit| mask | bit)
    }
}

impl ProgramManifest {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn program(&self, name: &str) -> Option<&ProgramEntry> {
        self.programs.iter().find(|entry| entry.name == name)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.programs.is_empty() {
            issues.push("manifest must declare at least one program".to_string());
        }

        let mut names = HashSet::new();
        for entry in &self.programs {
            let program = entry.name.as_str();
            if program.trim().is_empty() {
                issues.push("program with empty name".to_string());
            } else if !names.insert(program) {
                issues.push(format!("program '{program}' declared more than once"));
            }
            if entry.vertex.trim().is_empty() {
                issues.push(format!("program '{program}' has no vertex source"));
            }
            if entry.fragment.trim().is_empty() {
                issues.push(format!("program '{program}' has no fragment source"));
            }
            if let Err(err) = entry.attribute_semantics() {
                issues.push(format!("program '{program}': {err}"));
            }

            let mut uniforms = HashSet::new();
            for uniform in &entry.uniforms {
                if uniform.name.trim().is_empty() {
                    issues.push(format!("program '{program}' declares a uniform with empty name"));
                } else if !uniforms.insert(uniform.name.as_str()) {
                    issues.push(format!(
                        "program '{program}' declares uniform '{}' more than once",
                        uniform.name
                    ));
                }
                match uniform.kind() {
                    Err(err) => issues.push(format!("program '{program}': {err}")),
                    Ok(kind) if kind.is_matrix() && uniform.array_size > 1 => {
                        issues.push(format!(
                            "program '{program}' uniform '{}': {kind} cannot be an array",
                            uniform.name
                        ));
                    }
                    Ok(_) => {}
                }
                if uniform.array_size == 0 {
                    issues.push(format!(
                        "program '{program}' uniform '{}' has array_size 0",
                        uniform.name
                    ));
                }
            }

            let mut samplers = HashSet::new();
            for sampler in &entry.samplers {
                if sampler.trim().is_empty() {
                    issues.push(format!("program '{program}' declares a sampler with empty name"));
                } else if !samplers.insert(sampler.as_str()) {
                    issues.push(format!(
                        "program '{program}' declares sampler '{sampler}' more than once"
                    ));
                } else if uniforms.contains(sampler.as_str()) {
                    issues.push(format!(
                        "program '{program}' uses '{sampler}' as both uniform and sampler"
                    ));
                }
            }
        }
        issues
    }
}
