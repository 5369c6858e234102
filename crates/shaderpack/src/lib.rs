//! Shader libraries on disk: search roots for GLSL sources and the
//! `programs.toml` manifest describing which programs to build from them.
mod manifest;
mod pack;
mod source;

pub use manifest::{ProgramEntry, ProgramManifest, UniformEntry};
pub use pack::{build_program, PackError, ProgramPack, MANIFEST_FILE};
pub use source::{DirectoryLoader, DEFAULT_EXTENSION};
