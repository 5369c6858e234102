use std::io;

use thiserror::Error;

use crate::types::{ProgramId, ShaderStage};

/// Failures while flattening `#include` directives into a single source.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("shader resource '{name}' could not be loaded")]
    Missing {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("circular include of '{name}' (include chain: {chain})")]
    CircularInclude { name: String, chain: String },

    #[error("malformed include directive in '{resource}': {line:?}")]
    MalformedDirective { resource: String, line: String },

    #[error("shader resource '{name}' is empty")]
    EmptySource { name: String },
}

/// Failures that permanently disable a program.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to compile {stage} shader for program {id} '{name}': {log}")]
    Compile {
        id: ProgramId,
        name: String,
        stage: ShaderStage,
        log: String,
        code: String,
    },

    #[error("failed to link program {id} '{name}': {log}")]
    Link {
        id: ProgramId,
        name: String,
        log: String,
    },

    #[error("program {id} '{name}' previously failed to build")]
    Failed { id: ProgramId, name: String },

    #[error("no program registered with id {0}")]
    UnknownProgram(ProgramId),
}
