use glam::Mat4;

use crate::camera::Camera;
use crate::light::DirectionalLight;
use crate::scene::{ObjectId, SceneObject, SceneRegistry};

use super::main_pass::{MainPass, MainPassPlan};
use super::shadow_pass::{ShadowPass, ShadowPassPlan};
use super::{MeshHandle, TextureHandle};

/// One indexed triangle draw of a scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub object: ObjectId,
    pub mesh: MeshHandle,
    pub texture: TextureHandle,
    pub index_count: u32,
    pub model: Mat4,
}

impl DrawCall {
    pub(crate) fn for_object(id: ObjectId, object: &SceneObject) -> Self {
        Self {
            object: id,
            mesh: object.mesh,
            texture: object.texture,
            index_count: object.index_count,
            model: object.model_matrix(),
        }
    }
}

/// Draws every registered object in insertion order.
pub(crate) fn draw_list(scene: &SceneRegistry) -> Vec<DrawCall> {
    scene
        .iter()
        .map(|(id, object)| DrawCall::for_object(id, object))
        .collect()
}

/// Everything a backend needs to render one frame: the shadow pass, then the
/// main pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub index: u64,
    pub shadow: ShadowPassPlan,
    pub main: MainPassPlan,
}

impl FramePlan {
    /// Builds both passes from current state. Nothing is carried over from
    /// earlier frames.
    pub fn build(
        index: u64,
        camera: &Camera,
        light: &DirectionalLight,
        scene: &SceneRegistry,
        viewport: (u32, u32),
    ) -> Self {
        Self {
            index,
            shadow: ShadowPass::plan(light, scene),
            main: MainPass::plan(camera, light, scene, viewport),
        }
    }

    pub fn report(&self) -> FrameReport {
        FrameReport {
            index: self.index,
            shadow_draws: self.shadow.draws.len(),
            main_draws: self.main.draws.len(),
        }
    }
}

/// Summary of a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub index: u64,
    pub shadow_draws: usize,
    pub main_draws: usize,
}
