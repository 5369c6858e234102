//! Typed uniform holders.
//!
//! A [`Uniform`] pairs a declared name and [`UniformKind`] with the location the
//! driver assigned after linking and the last value written from the CPU side.
//! Values arrive as raw bytes laid out exactly like the GLSL type (tightly
//! packed `i32`/`f32` components, column-major matrices) and are kept in a
//! typed store so uploads never need to reinterpret unaligned memory.
use std::fmt;
use std::str::FromStr;

use crate::driver::{GpuDriver, UniformData, UniformLocation};

/// Semantic type of a declared uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Int,
    Int2,
    Int3,
    Int4,
    Float,
    Float2,
    Float3,
    Float4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformKind {
    pub const ALL: [UniformKind; 11] = [
        Self::Int,
        Self::Int2,
        Self::Int3,
        Self::Int4,
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Mat2,
        Self::Mat3,
        Self::Mat4,
    ];

    /// Scalar components in a single element.
    pub fn components(self) -> usize {
        match self {
            Self::Int | Self::Float => 1,
            Self::Int2 | Self::Float2 => 2,
            Self::Int3 | Self::Float3 => 3,
            Self::Int4 | Self::Float4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Size in bytes of a single element.
    pub fn footprint(self) -> usize {
        self.components() * 4
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, Self::Mat2 | Self::Mat3 | Self::Mat4)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Int2 | Self::Int3 | Self::Int4)
    }

    /// GLSL spelling of the type.
    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Int2 => "ivec2",
            Self::Int3 => "ivec3",
            Self::Int4 => "ivec4",
            Self::Float => "float",
            Self::Float2 => "vec2",
            Self::Float3 => "vec3",
            Self::Float4 => "vec4",
            Self::Mat2 => "mat2",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

impl FromStr for UniformKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "int" => Ok(Self::Int),
            "int2" | "ivec2" => Ok(Self::Int2),
            "int3" | "ivec3" => Ok(Self::Int3),
            "int4" | "ivec4" => Ok(Self::Int4),
            "float" => Ok(Self::Float),
            "float2" | "vec2" => Ok(Self::Float2),
            "float3" | "vec3" => Ok(Self::Float3),
            "float4" | "vec4" => Ok(Self::Float4),
            "mat2" => Ok(Self::Mat2),
            "mat3" => Ok(Self::Mat3),
            "mat4" => Ok(Self::Mat4),
            other => Err(format!("unsupported uniform type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UniformValue {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
}

impl UniformValue {
    fn zeroed(kind: UniformKind, len: usize) -> Self {
        if kind.is_integer() {
            Self::Ints(vec![0; len])
        } else {
            Self::Floats(vec![0.0; len])
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Ints(values) => bytemuck::cast_slice_mut(values.as_mut_slice()),
            Self::Floats(values) => bytemuck::cast_slice_mut(values.as_mut_slice()),
        }
    }
}

/// A declared uniform owned by a single program.
#[derive(Debug, Clone)]
pub struct Uniform {
    name: String,
    kind: UniformKind,
    array_size: usize,
    location: Option<UniformLocation>,
    value: UniformValue,
}

impl Uniform {
    /// Creates a uniform of `kind`. Matrices are always single instances; other
    /// kinds treat an array size of zero as one.
    pub fn new(kind: UniformKind, name: impl Into<String>, array_size: usize) -> Self {
        let array_size = if kind.is_matrix() {
            1
        } else {
            array_size.max(1)
        };
        Self {
            name: name.into(),
            kind,
            array_size,
            location: None,
            value: UniformValue::zeroed(kind, kind.components() * array_size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    /// Bytes consumed by [`Uniform::set`].
    pub fn byte_len(&self) -> usize {
        self.kind.footprint() * self.array_size
    }

    pub fn location(&self) -> Option<UniformLocation> {
        self.location
    }

    pub fn set_location(&mut self, location: Option<UniformLocation>) {
        self.location = location;
    }

    /// Forgets the location so values are never written through a handle from
    /// a destroyed program.
    pub fn reset(&mut self) {
        self.location = None;
    }

    /// Last value written, for integer kinds.
    pub fn int_values(&self) -> Option<&[i32]> {
        match &self.value {
            UniformValue::Ints(values) => Some(values),
            UniformValue::Floats(_) => None,
        }
    }

    /// Last value written, for float and matrix kinds.
    pub fn float_values(&self) -> Option<&[f32]> {
        match &self.value {
            UniformValue::Floats(values) => Some(values),
            UniformValue::Ints(_) => None,
        }
    }

    /// Stores `bytes` and uploads them when `active` (the owning program is the
    /// driver's current program) and the location is resolved.
    ///
    /// Returns whether an upload was issued. Slices shorter than
    /// [`Uniform::byte_len`] are rejected; trailing bytes are ignored.
    pub fn set(&mut self, bytes: &[u8], driver: &mut dyn GpuDriver, active: bool) -> bool {
        let len = self.byte_len();
        if bytes.len() < len {
            tracing::warn!(
                uniform = %self.name,
                kind = %self.kind,
                expected = len,
                provided = bytes.len(),
                "uniform value too short; ignoring"
            );
            return false;
        }
        self.value.bytes_mut().copy_from_slice(&bytes[..len]);

        match self.location {
            Some(location) if active => {
                driver.upload_uniform(location, self.data());
                true
            }
            _ => false,
        }
    }

    fn data(&self) -> UniformData<'_> {
        match (&self.value, self.kind) {
            (UniformValue::Ints(values), kind) => UniformData::Ints {
                components: kind.components(),
                values,
            },
            (UniformValue::Floats(values), UniformKind::Mat2) => UniformData::Matrix {
                dimension: 2,
                values,
            },
            (UniformValue::Floats(values), UniformKind::Mat3) => UniformData::Matrix {
                dimension: 3,
                values,
            },
            (UniformValue::Floats(values), UniformKind::Mat4) => UniformData::Matrix {
                dimension: 4,
                values,
            },
            (UniformValue::Floats(values), kind) => UniformData::Floats {
                components: kind.components(),
                values,
            },
        }
    }
}
