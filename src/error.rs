use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::engine::EngineState;
use crate::scene::ObjectId;

/// Pipeline stage that produced a shader diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Link => "link",
        })
    }
}

/// A shader stage failed to compile or the program failed to link.
///
/// `log` carries the driver diagnostic verbatim.
#[derive(Debug, Clone, Error)]
#[error("{stage} stage of program `{program}` failed:\n{log}")]
pub struct ShaderCompileError {
    pub program: String,
    pub stage: ShaderStage,
    pub log: String,
}

impl ShaderCompileError {
    pub fn new(program: impl Into<String>, stage: ShaderStage, log: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            stage,
            log: log.into(),
        }
    }
}

/// Fetching or decoding an asset failed.
#[derive(Debug, Error)]
#[error("failed to load {}: {reason}", path.display())]
pub struct AssetLoadError {
    pub path: PathBuf,
    pub reason: String,
}

impl AssetLoadError {
    pub fn new(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// An object referenced GPU resources that were not ready or did not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceContractViolation {
    #[error("object `{name}` references mesh {mesh} which was never uploaded")]
    UnknownMesh { name: String, mesh: u32 },
    #[error("object `{name}` references texture {texture} which was never uploaded")]
    UnknownTexture { name: String, texture: u32 },
    #[error("object `{name}` draws {requested} indices but its mesh holds {available}")]
    IndexCountMismatch {
        name: String,
        requested: u32,
        available: u32,
    },
    #[error("object {0} is not registered")]
    UnknownObject(ObjectId),
}

/// Errors surfaced by the rendering core.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    ShaderCompile(#[from] ShaderCompileError),
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),
    #[error(transparent)]
    ResourceContract(#[from] ResourceContractViolation),
    #[error("engine is {state:?}; operation requires a ready engine")]
    NotReady { state: EngineState },
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("GPU error: {0}")]
    Gpu(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
