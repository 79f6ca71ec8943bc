//! Depth-only pass rendering the scene from the directional light.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::trace;

use crate::light::DirectionalLight;
use crate::scene::SceneRegistry;

use super::frame::{draw_list, DrawCall};
use super::gpu::{FrameBindings, SceneResources, FRAME_GROUP};
use super::shader::ShaderProgram;

/// Edge length of the square shadow map in texels.
pub const SHADOW_MAP_SIZE: u32 = 1024;

// Fixed orthographic volume around the origin; objects outside it do not
// cast shadows.
const SHADOW_HALF_EXTENT: f32 = 10.0;
const SHADOW_NEAR: f32 = 1.0;
const SHADOW_FAR: f32 = 100.0;
const LIGHT_DISTANCE: f32 = 10.0;

/// Eye of the light view: the light direction negated and scaled by ten.
pub fn light_eye_position(light: &DirectionalLight) -> Vec3 {
    light.direction * -LIGHT_DISTANCE
}

/// Projection times view for the light, looking at the origin with world-up.
///
/// Both passes call this, so the matrix they use is bit-identical.
pub fn light_space_matrix(light: &DirectionalLight) -> Mat4 {
    let projection = Mat4::orthographic_rh(
        -SHADOW_HALF_EXTENT,
        SHADOW_HALF_EXTENT,
        -SHADOW_HALF_EXTENT,
        SHADOW_HALF_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    let view = Mat4::look_at_rh(light_eye_position(light), Vec3::ZERO, Vec3::Y);
    projection * view
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPassPlan {
    pub resolution: u32,
    pub light_space: Mat4,
    pub draws: Vec<DrawCall>,
}

pub struct ShadowPass;

impl ShadowPass {
    pub fn plan(light: &DirectionalLight, scene: &SceneRegistry) -> ShadowPassPlan {
        ShadowPassPlan {
            resolution: SHADOW_MAP_SIZE,
            light_space: light_space_matrix(light),
            draws: draw_list(scene),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct ShadowUniform {
    light_space: [[f32; 4]; 4],
}

pub(crate) struct ShadowPassContext<'a> {
    pub target: &'a ShadowTarget,
    pub program: &'a ShaderProgram,
    pub frame: &'a FrameBindings,
    pub resources: &'a SceneResources,
}

impl ShadowPassPlan {
    pub(crate) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        ctx: &ShadowPassContext<'_>,
    ) {
        let uniform = ShadowUniform {
            light_space: self.light_space.to_cols_array_2d(),
        };
        queue.write_buffer(&ctx.frame.buffer, 0, bytemuck::bytes_of(&uniform));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow-pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(ctx.target.depth_attachment()),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let size = self.resolution as f32;
        pass.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);
        ctx.program.bind(&mut pass);
        pass.set_bind_group(FRAME_GROUP, &ctx.frame.bind_group, &[]);

        for draw in &self.draws {
            ctx.resources.draw(&mut pass, queue, draw, false);
        }
        trace!("shadow pass recorded {} draws", self.draws.len());
        // Dropping the pass ends it and releases the shadow attachment.
    }
}

/// Depth texture the shadow pass renders into and the main pass samples.
pub struct ShadowTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    size: u32,
}

impl ShadowTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(device: &wgpu::Device) -> Self {
        let size = SHADOW_MAP_SIZE;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Nearest filtering, no PCF.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            _texture: texture,
            view,
            sampler,
            size,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn depth_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_eye_is_negated_direction_scaled_by_ten() {
        let light = DirectionalLight::default();
        let eye = light_eye_position(&light);
        assert!(eye.abs_diff_eq(Vec3::new(2.0, 10.0, 3.0), 1e-5));
    }

    #[test]
    fn light_space_looks_at_the_origin() {
        let light = DirectionalLight::default();
        let eye = light_eye_position(&light);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        // The origin sits on the view axis at the eye distance.
        let origin = view.transform_point3(Vec3::ZERO);
        assert!(origin.x.abs() < 1e-5 && origin.y.abs() < 1e-5);
        assert!((origin.z + eye.length()).abs() < 1e-4);

        let clip = light_space_matrix(&light) * Vec3::ZERO.extend(1.0);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&clip.z));
    }

    #[test]
    fn points_beyond_fixed_bounds_fall_outside_the_volume() {
        let light = DirectionalLight {
            direction: Vec3::new(0.0, -1.0, -0.001),
            ..DirectionalLight::default()
        };
        let clip = light_space_matrix(&light) * Vec3::new(15.0, 0.0, 0.0).extend(1.0);
        assert!(clip.x.abs() > 1.0);
    }

    #[test]
    fn plan_uses_fixed_resolution() {
        let plan = ShadowPass::plan(&DirectionalLight::default(), &SceneRegistry::new());
        assert_eq!(plan.resolution, 1024);
        assert!(plan.draws.is_empty());
    }
}
