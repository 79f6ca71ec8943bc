use log::debug;

use crate::error::{ShaderCompileError, ShaderStage};

use super::ShaderSources;

/// Fixed-function state a program is linked against.
pub struct ProgramLayout<'a> {
    pub bind_group_layouts: &'a [&'a wgpu::BindGroupLayout],
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub color_targets: &'a [Option<wgpu::ColorTargetState>],
    pub depth_stencil: Option<wgpu::DepthStencilState>,
}

/// A linked render pipeline built from a vertex and a fragment module.
///
/// A value of this type is always fully linked; compilation failures are
/// returned as [`ShaderCompileError`] and never produce a program.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
}

impl ShaderProgram {
    /// Compiles both stages and links them into a pipeline.
    ///
    /// Each step runs inside a validation error scope so driver diagnostics
    /// come back as errors instead of reaching the device's uncaptured-error
    /// handler. The stage modules are released once the pipeline exists.
    pub async fn compile(
        device: &wgpu::Device,
        sources: &ShaderSources,
        layout: &ProgramLayout<'_>,
    ) -> Result<Self, ShaderCompileError> {
        let label = sources.label.as_str();

        let vertex = compile_stage(device, label, ShaderStage::Vertex, &sources.vertex).await?;
        let fragment =
            compile_stage(device, label, ShaderStage::Fragment, &sources.fragment).await?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label}-layout")),
            bind_group_layouts: layout.bind_group_layouts,
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: layout.vertex_buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: layout.depth_stencil.clone(),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: layout.color_targets,
            }),
            multiview: None,
            cache: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(ShaderCompileError::new(
                label,
                ShaderStage::Link,
                error.to_string(),
            ));
        }

        drop(vertex);
        drop(fragment);
        debug!("linked program {label}");
        Ok(Self {
            label: label.to_string(),
            pipeline,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Makes this program current for subsequent draws in `pass`.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
    }
}

async fn compile_stage(
    device: &wgpu::Device,
    program: &str,
    stage: ShaderStage,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderCompileError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{program}-{stage}")),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match device.pop_error_scope().await {
        Some(error) => Err(ShaderCompileError::new(program, stage, error.to_string())),
        None => Ok(module),
    }
}
