//! Lit pass drawing the scene from the camera and sampling the shadow map.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::trace;

use crate::camera::Camera;
use crate::light::DirectionalLight;
use crate::scene::SceneRegistry;

use super::frame::{draw_list, DrawCall};
use super::gpu::{DepthBuffer, FrameBindings, SceneResources, FRAME_GROUP};
use super::shader::ShaderProgram;
use super::shadow_pass::light_space_matrix;

pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.1,
    a: 1.0,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MainPassPlan {
    pub viewport: (u32, u32),
    pub view: Mat4,
    pub projection: Mat4,
    /// Camera position, kept for view-dependent terms.
    pub view_position: Vec3,
    pub light_direction: Vec3,
    pub light_color: Vec3,
    pub light_intensity: f32,
    pub light_space: Mat4,
    pub draws: Vec<DrawCall>,
}

pub struct MainPass;

impl MainPass {
    pub fn plan(
        camera: &Camera,
        light: &DirectionalLight,
        scene: &SceneRegistry,
        viewport: (u32, u32),
    ) -> MainPassPlan {
        MainPassPlan {
            viewport,
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            view_position: camera.position,
            light_direction: light.direction,
            light_color: light.color,
            light_intensity: light.intensity,
            light_space: light_space_matrix(light),
            draws: draw_list(scene),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct FrameUniform {
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    light_space: [[f32; 4]; 4],
    view_position: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
}

impl From<&MainPassPlan> for FrameUniform {
    fn from(plan: &MainPassPlan) -> Self {
        Self {
            view: plan.view.to_cols_array_2d(),
            projection: plan.projection.to_cols_array_2d(),
            light_space: plan.light_space.to_cols_array_2d(),
            view_position: plan.view_position.extend(1.0).into(),
            light_direction: plan.light_direction.extend(0.0).into(),
            light_color: plan.light_color.extend(plan.light_intensity).into(),
        }
    }
}

pub(crate) struct MainPassContext<'a> {
    pub target: &'a wgpu::TextureView,
    pub depth: &'a DepthBuffer,
    pub program: &'a ShaderProgram,
    /// Frame uniforms plus the shadow map and its sampler.
    pub frame: &'a FrameBindings,
    pub resources: &'a SceneResources,
}

impl MainPassPlan {
    pub(crate) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        ctx: &MainPassContext<'_>,
    ) {
        let uniform = FrameUniform::from(self);
        queue.write_buffer(&ctx.frame.buffer, 0, bytemuck::bytes_of(&uniform));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let (width, height) = self.viewport;
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        ctx.program.bind(&mut pass);
        pass.set_bind_group(FRAME_GROUP, &ctx.frame.bind_group, &[]);

        for draw in &self.draws {
            ctx.resources.draw(&mut pass, queue, draw, true);
        }
        trace!("main pass recorded {} draws", self.draws.len());
    }
}
