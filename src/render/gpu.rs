use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use log::{debug, error, info};
use winit::window::{Window, WindowId};

use crate::error::{RenderError, RenderResult, ShaderCompileError};
use crate::mesh::{MeshData, TextureData, VERTEX_STRIDE};
use crate::scene::ObjectId;

use super::frame::{DrawCall, FramePlan};
use super::main_pass::{FrameUniform, MainPassContext};
use super::shader::{ProgramLayout, ShaderProgram};
use super::shadow_pass::{ShadowPassContext, ShadowTarget, ShadowUniform};
use super::{MeshHandle, ProgramSources, RenderBackend, TextureHandle};

pub(crate) const FRAME_GROUP: u32 = 0;
pub(crate) const OBJECT_GROUP: u32 = 1;
pub(crate) const MATERIAL_GROUP: u32 = 2;

const LIT_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const DEPTH_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const VERTEX_BYTES: u64 = (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64;

/// GPU renderer drawing frame plans into a window surface.
pub struct WgpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    layouts: GpuLayouts,
    programs: Option<GpuPrograms>,
    resources: SceneResources,
}

impl WgpuBackend {
    /// Acquires an adapter and device for `window` and configures its surface.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("umbra-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| matches!(mode, wgpu::PresentMode::Mailbox))
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let layouts = GpuLayouts::new(&device);
        let resources = SceneResources::new(&device);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            layouts,
            programs: None,
            resources,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl RenderBackend for WgpuBackend {
    fn initialize(&mut self, programs: &ProgramSources) -> RenderResult<()> {
        let compiled = pollster::block_on(GpuPrograms::compile(
            &self.device,
            &self.layouts,
            programs,
            self.config.format,
        ))?;
        self.programs = Some(compiled);
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
        Ok(self.resources.upload_mesh(&self.device, mesh))
    }

    fn upload_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle> {
        self.resources
            .upload_texture(&self.device, &self.queue, &self.layouts, texture)
    }

    fn mesh_index_count(&self, mesh: MeshHandle) -> Option<u32> {
        self.resources.mesh(mesh).map(|buffers| buffers.index_count)
    }

    fn has_texture(&self, texture: TextureHandle) -> bool {
        self.resources.textures.get(texture.index() as usize).is_some()
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    fn submit_frame(&mut self, frame: &FramePlan) -> RenderResult<()> {
        let programs = self
            .programs
            .as_ref()
            .ok_or_else(|| RenderError::Gpu("programs are not compiled".into()))?;

        for draw in frame.shadow.draws.iter().chain(&frame.main.draws) {
            self.resources
                .ensure_object(&self.device, &self.layouts, draw.object);
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        frame.shadow.encode(
            &mut encoder,
            &self.queue,
            &ShadowPassContext {
                target: &programs.shadow_target,
                program: &programs.depth,
                frame: &programs.shadow_frame,
                resources: &self.resources,
            },
        );
        frame.main.encode(
            &mut encoder,
            &self.queue,
            &MainPassContext {
                target: &view,
                depth: &self.depth,
                program: &programs.lit,
                frame: &programs.frame,
                resources: &self.resources,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Bind group layouts shared by programs and per-object resources.
pub struct GpuLayouts {
    shadow_frame: wgpu::BindGroupLayout,
    frame: wgpu::BindGroupLayout,
    object: wgpu::BindGroupLayout,
    material: wgpu::BindGroupLayout,
}

impl GpuLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let shadow_frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-frame-layout"),
            entries: &[uniform_entry::<ShadowUniform>(0, wgpu::ShaderStages::VERTEX)],
        });

        // The shadow map occupies its own unit in the frame group, apart from
        // the per-object colour texture in the material group.
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-layout"),
            entries: &[
                uniform_entry::<FrameUniform>(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let object = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-layout"),
            entries: &[uniform_entry::<ObjectUniform>(0, wgpu::ShaderStages::VERTEX)],
        });

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self {
            shadow_frame,
            frame,
            object,
            material,
        }
    }
}

fn uniform_entry<T>(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

/// Both linked programs plus the shadow target and per-frame uniforms.
pub struct GpuPrograms {
    lit: ShaderProgram,
    depth: ShaderProgram,
    shadow_target: ShadowTarget,
    shadow_frame: FrameBindings,
    frame: FrameBindings,
}

impl GpuPrograms {
    /// Compiles the lit and depth programs. Nothing is kept unless both link.
    pub async fn compile(
        device: &wgpu::Device,
        layouts: &GpuLayouts,
        sources: &ProgramSources,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderCompileError> {
        let lit = ShaderProgram::compile(
            device,
            &sources.lit,
            &ProgramLayout {
                bind_group_layouts: &[&layouts.frame, &layouts.object, &layouts.material],
                vertex_buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_BYTES,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &LIT_ATTRIBUTES,
                }],
                color_targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
            },
        )
        .await?;

        let depth = ShaderProgram::compile(
            device,
            &sources.depth,
            &ProgramLayout {
                bind_group_layouts: &[&layouts.shadow_frame, &layouts.object],
                vertex_buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_BYTES,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &DEPTH_ATTRIBUTES,
                }],
                color_targets: &[],
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: ShadowTarget::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: wgpu::DepthBiasState {
                        constant: 2,
                        slope_scale: 2.0,
                        clamp: 0.0,
                    },
                }),
            },
        )
        .await?;

        let shadow_target = ShadowTarget::new(device);
        let shadow_frame = FrameBindings::new::<ShadowUniform>(
            device,
            "shadow-frame",
            &layouts.shadow_frame,
            &[],
        );
        let frame = FrameBindings::new::<FrameUniform>(
            device,
            "frame",
            &layouts.frame,
            &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(shadow_target.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(shadow_target.sampler()),
                },
            ],
        );
        debug!(
            "programs `{}` and `{}` ready, shadow map {}px",
            lit.label(),
            depth.label(),
            shadow_target.size()
        );

        Ok(Self {
            lit,
            depth,
            shadow_target,
            shadow_frame,
            frame,
        })
    }
}

/// Per-frame uniform buffer and the bind group exposing it.
pub(crate) struct FrameBindings {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl FrameBindings {
    fn new<T>(
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        extra: &[wgpu::BindGroupEntry<'_>],
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-uniform")),
            size: std::mem::size_of::<T>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }];
        entries.extend_from_slice(extra);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout,
            entries: &entries,
        });
        Self { buffer, bind_group }
    }
}

/// Meshes, textures and per-object uniforms owned by the backend.
pub(crate) struct SceneResources {
    meshes: Vec<MeshBuffers>,
    textures: Vec<GpuTexture>,
    objects: HashMap<ObjectId, ObjectBinding>,
    color_sampler: wgpu::Sampler,
}

impl SceneResources {
    fn new(device: &wgpu::Device) -> Self {
        let color_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("color-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            meshes: Vec::new(),
            textures: Vec::new(),
            objects: HashMap::new(),
            color_sampler,
        }
    }

    fn mesh(&self, handle: MeshHandle) -> Option<&MeshBuffers> {
        self.meshes.get(handle.index() as usize)
    }

    fn upload_mesh(&mut self, device: &wgpu::Device, mesh: &MeshData) -> MeshHandle {
        let handle = MeshHandle::new(self.meshes.len() as u32);
        let label = format!("mesh-{}", handle.index());
        self.meshes.push(MeshBuffers::from_mesh(device, mesh, &label));
        handle
    }

    fn upload_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &GpuLayouts,
        data: &TextureData,
    ) -> RenderResult<TextureHandle> {
        data.validate()?;

        let handle = TextureHandle::new(self.textures.len() as u32);
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("texture-{}", handle.index())),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("material-{}", handle.index())),
            layout: &layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                },
            ],
        });
        self.textures.push(GpuTexture {
            _texture: texture,
            bind_group,
        });
        Ok(handle)
    }

    fn ensure_object(&mut self, device: &wgpu::Device, layouts: &GpuLayouts, id: ObjectId) {
        self.objects
            .entry(id)
            .or_insert_with(|| ObjectBinding::new(device, &layouts.object, id));
    }

    /// Sets the object's model uniform, binds its buffers and issues the draw.
    /// With `material`, the colour texture is bound as well.
    pub(crate) fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        queue: &wgpu::Queue,
        draw: &DrawCall,
        material: bool,
    ) {
        let (Some(mesh), Some(object)) = (self.mesh(draw.mesh), self.objects.get(&draw.object))
        else {
            debug_assert!(false, "object {} drawn before its buffers", draw.object);
            error!("skipping object {}: GPU buffers missing", draw.object);
            return;
        };
        debug_assert!(
            draw.index_count <= mesh.index_count,
            "object {} draws {} of {} indices",
            draw.object,
            draw.index_count,
            mesh.index_count
        );

        object.write_model(queue, draw.model);
        pass.set_bind_group(OBJECT_GROUP, &object.bind_group, &[]);
        if material {
            let Some(texture) = self.textures.get(draw.texture.index() as usize) else {
                debug_assert!(false, "object {} uses a missing texture", draw.object);
                error!("skipping object {}: texture missing", draw.object);
                return;
            };
            pass.set_bind_group(MATERIAL_GROUP, &texture.bind_group, &[]);
        }
        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..draw.index_count, 0, 0..1);
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.index_count(),
        }
    }
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
}

struct ObjectBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ObjectBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, id: ObjectId) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("object-{}-uniform", id.index())),
            size: std::mem::size_of::<ObjectUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("object-{}-bind-group", id.index())),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }

    fn write_model(&self, queue: &wgpu::Queue, model: Mat4) {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let uniform = ObjectUniform {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
        };
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

pub(crate) struct DepthBuffer {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_wgsl_layouts() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 64 + 48);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 3 * 64 + 3 * 16);
        assert_eq!(std::mem::size_of::<ShadowUniform>(), 64);
    }

    #[test]
    fn vertex_layout_matches_mesh_stride() {
        assert_eq!(VERTEX_BYTES, 32);
        assert_eq!(LIT_ATTRIBUTES[2].offset, 24);
    }

    #[test]
    fn normal_matrix_is_padded_per_column() {
        let padded = mat3_to_3x4(Mat3::IDENTITY);
        assert_eq!(padded[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(padded[2], [0.0, 0.0, 1.0, 0.0]);
    }
}
