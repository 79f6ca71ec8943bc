//! Shader compilation against a real device. Skipped when no adapter is
//! available, which is the common case on CI machines.

use std::fs;
use std::path::Path;

use pollster::block_on;
use umbra::render::{GpuLayouts, GpuPrograms};
use umbra::{ProgramSources, ShaderSources, ShaderStage};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

fn create_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
    block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()
}

fn shipped_sources() -> ProgramSources {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
    let read = |name: &str| fs::read_to_string(dir.join(name)).unwrap();
    ProgramSources {
        lit: ShaderSources::new("lit", read("lit.vert.wgsl"), read("lit.frag.wgsl")),
        depth: ShaderSources::new("depth", read("shadow.vert.wgsl"), read("shadow.frag.wgsl")),
    }
}

#[test]
fn shipped_shaders_link() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let layouts = GpuLayouts::new(&device);
    let result = block_on(GpuPrograms::compile(
        &device,
        &layouts,
        &shipped_sources(),
        COLOR_FORMAT,
    ));
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn broken_fragment_reports_its_stage() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let mut sources = shipped_sources();
    sources.lit.fragment = "@fragment fn fs_main() -> @location(0) vec4<f32> { return oops; }".into();

    let layouts = GpuLayouts::new(&device);
    let err = block_on(GpuPrograms::compile(&device, &layouts, &sources, COLOR_FORMAT))
        .err()
        .expect("broken shader must not compile");
    assert_eq!(err.stage, ShaderStage::Fragment);
    assert_eq!(err.program, "lit");
    assert!(!err.log.is_empty());
}
