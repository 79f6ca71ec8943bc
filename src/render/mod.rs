//! Two-pass shadow-mapped forward renderer.
//!
//! Each frame is described by a [`FramePlan`]: a shadow pass rendering scene
//! depth from the directional light, followed by a main pass drawing the lit
//! scene from the camera. Plans are pure data built from camera, light and
//! registry state; a [`RenderBackend`] executes them. [`WgpuBackend`] draws
//! to a window surface and [`HeadlessBackend`] records plans for tooling and
//! tests.

mod frame;
mod gpu;
mod headless;
mod main_pass;
mod shader;
mod shadow_pass;

pub use frame::{DrawCall, FramePlan, FrameReport};
pub use gpu::{GpuLayouts, GpuPrograms, WgpuBackend};
pub use headless::HeadlessBackend;
pub use main_pass::{MainPass, MainPassPlan, CLEAR_COLOR};
pub use shader::{ProgramLayout, ShaderProgram};
pub use shadow_pass::{
    light_eye_position, light_space_matrix, ShadowPass, ShadowPassPlan, ShadowTarget,
    SHADOW_MAP_SIZE,
};

use crate::error::RenderResult;
use crate::mesh::{MeshData, TextureData};

/// Backend-owned vertex/index buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(u32);

impl MeshHandle {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Backend-owned colour texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// WGSL source text for one program. The vertex module exports `vs_main`
/// and the fragment module exports `fs_main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(
        label: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Sources for both programs compiled at engine initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    /// Lit, shadowed program used by the main pass.
    pub lit: ShaderSources,
    /// Position-only program used by the shadow pass.
    pub depth: ShaderSources,
}

/// Executes frame plans and owns every GPU resource.
pub trait RenderBackend {
    /// Compiles both programs and creates the shadow target. Either everything
    /// is installed or nothing is.
    fn initialize(&mut self, programs: &ProgramSources) -> RenderResult<()>;

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle>;

    fn upload_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle>;

    /// Number of indices uploaded for `mesh`, if it exists.
    fn mesh_index_count(&self, mesh: MeshHandle) -> Option<u32>;

    fn has_texture(&self, texture: TextureHandle) -> bool;

    /// Output size in physical pixels.
    fn viewport_size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn submit_frame(&mut self, frame: &FramePlan) -> RenderResult<()>;
}
