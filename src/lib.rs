//! Shadow-mapped forward renderer for small physics-driven scenes.
//!
//! A [`GraphicsEngine`] owns a camera, a directional light and an ordered
//! registry of textured meshes. Every frame it renders scene depth from the
//! light into a shadow map, then draws the lit scene from the camera while
//! sampling that map. Rendering goes through the [`RenderBackend`] trait so
//! the same engine runs against a window surface or headless.

pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod light;
pub mod logging;
pub mod mesh;
pub mod obj;
pub mod panel;
pub mod physics;
pub mod render;
pub mod scene;

pub use app::{print_final_state, Simulation};
pub use assets::{primitive_model, AssetLoader, ModelAsset};
pub use camera::Camera;
pub use config::EngineConfig;
pub use engine::{EngineState, GraphicsEngine};
pub use error::{
    AssetLoadError, RenderError, RenderResult, ResourceContractViolation, ShaderCompileError,
    ShaderStage,
};
pub use input::{InputState, KeyCode, NamedKey};
pub use light::{DirectionalLight, Light, PointLight, SpotLight};
pub use logging::{init_logging, LoggingConfig};
pub use mesh::{MeshData, TextureData};
pub use obj::load_obj_from_str;
pub use panel::{ControlBindings, ControlPanel, PanelAction};
pub use physics::{BodyTransform, PhysicsConfig, PhysicsWorld, RigidBody};
pub use render::{
    FramePlan, FrameReport, HeadlessBackend, MeshHandle, ProgramSources, RenderBackend,
    ShaderProgram, ShaderSources, TextureHandle, WgpuBackend,
};
pub use scene::{ObjectId, SceneObject, SceneRegistry, Transform};
