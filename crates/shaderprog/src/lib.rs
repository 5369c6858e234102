//! Shader program lifecycle for a GL-style renderer.
//!
//! The crate assembles shader text, builds programs against a [`GpuDriver`],
//! caches reflected locations and survives context loss. The overall flow is:
//!
//! ```text
//!   SourceLoader ──▶ preprocess (includes) ──▶ ShaderProgram::new
//!                                                  │ declare uniforms / samplers / attributes
//!                                                  ▼
//!   frame loop ──▶ ProgramRegistry::begin_frame ──▶ ensure_bound ──▶ hydrate ──▶ bind ──▶ set_*
//!                                                  ▲
//!   context loss ──▶ ProgramRegistry::evict_all ───┘ (programs go cold, rebuilt lazily)
//! ```
//!
//! Everything that touches the driver runs on the thread that owns the
//! rendering context. The driver is passed explicitly to each call rather than
//! stored, so a program never outlives the context it was built in without the
//! caller noticing.
mod binding;
pub mod driver;
mod error;
mod preprocess;
mod program;
mod registry;
mod types;
mod uniform;

pub use binding::{BindingCache, SamplerBinding};
pub use driver::{GpuDriver, HeadlessDriver};
pub use error::{PreprocessError, ProgramError};
pub use preprocess::{inflate_includes, load_and_inflate, MemoryLoader, SourceLoader};
pub use program::{ShaderProgram, LIGHTING_BLOCK};
pub use registry::{HydrationSummary, ProgramRegistry};
pub use types::{
    AttributeSemantic, Capabilities, FatalPolicy, Hydration, ProgramId, ProgramState, ShaderStage,
    TransformSlot,
};
pub use uniform::{Uniform, UniformKind};
