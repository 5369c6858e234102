use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Optional vertex attributes a program consumes.
    ///
    /// The mask gates which fixed attribute slots are bound before linking and
    /// which transform uniforms are reflected afterwards, so it must be settled
    /// before the first hydration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const TEXCOORD = 1 << 0;
        const NORMAL = 1 << 1;
        const COLOR = 1 << 2;
    }
}

/// Vertex attribute semantics with a fixed slot in every program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Color,
    Texcoord,
}

impl AttributeSemantic {
    /// Attributes bound when the corresponding capability bit is present.
    pub const OPTIONAL: [AttributeSemantic; 3] = [Self::Texcoord, Self::Color, Self::Normal];

    /// Attribute location the slot is bound to before linking.
    pub fn slot(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Color => 2,
            Self::Texcoord => 3,
        }
    }

    /// Name of the vertex input in shader source.
    pub fn attribute_name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Normal => "normal",
            Self::Color => "color",
            Self::Texcoord => "texcoord",
        }
    }

    /// Capability bit implied by declaring this attribute. Position is always
    /// bound and has none.
    pub fn capability(self) -> Option<Capabilities> {
        match self {
            Self::Position => None,
            Self::Normal => Some(Capabilities::NORMAL),
            Self::Color => Some(Capabilities::COLOR),
            Self::Texcoord => Some(Capabilities::TEXCOORD),
        }
    }
}

impl FromStr for AttributeSemantic {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "position" | "vertex" => Ok(Self::Position),
            "normal" => Ok(Self::Normal),
            "color" | "colour" => Ok(Self::Color),
            "texcoord" | "uv" => Ok(Self::Texcoord),
            other => Err(format!("unknown vertex attribute '{other}'")),
        }
    }
}

impl fmt::Display for AttributeSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_name())
    }
}

/// Pipeline stage a shader object is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Fixed transform uniforms every program may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformSlot {
    ModelViewProjection,
    TextureNormal,
    NormalNormal,
}

impl TransformSlot {
    pub const ALL: [TransformSlot; 3] = [
        Self::ModelViewProjection,
        Self::TextureNormal,
        Self::NormalNormal,
    ];

    pub fn uniform_name(self) -> &'static str {
        match self {
            Self::ModelViewProjection => "mvp_matrix",
            Self::TextureNormal => "tex_norm_matrix",
            Self::NormalNormal => "norm_norm_matrix",
        }
    }

    /// Capability that must be present for the slot to be reflected.
    pub fn required_capability(self) -> Option<Capabilities> {
        match self {
            Self::ModelViewProjection => None,
            Self::TextureNormal => Some(Capabilities::TEXCOORD),
            Self::NormalNormal => Some(Capabilities::NORMAL),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::ModelViewProjection => 0,
            Self::TextureNormal => 1,
            Self::NormalNormal => 2,
        }
    }
}

/// Identifier handed out by the registry that owns a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(u64);

impl ProgramId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a program sits in its hydrate/evict lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// No GPU object: never hydrated, evicted, or waiting for a context.
    Cold,
    /// Linked program object owned by the current context.
    Hydrated,
    /// Compilation or linking failed; the program will never bind.
    Failed,
}

/// Result of a hydration attempt that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// The program is linked and ready to bind.
    Linked,
    /// No context could allocate a program object; retry on a later frame.
    Deferred,
}

/// What the host wants to happen when a program fails to compile or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// Log the failure and terminate the process.
    #[default]
    Abort,
    /// Hand the error back to the caller. The program stays failed.
    Propagate,
}
