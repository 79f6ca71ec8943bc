use std::collections::VecDeque;

use log::debug;

use crate::error::RenderResult;
use crate::mesh::{MeshData, TextureData};

use super::frame::FramePlan;
use super::{MeshHandle, ProgramSources, RenderBackend, TextureHandle};

const FRAME_HISTORY: usize = 8;

/// Backend that keeps frame plans in memory instead of drawing them.
///
/// Used for `--headless` runs and for exercising the engine without a GPU.
#[derive(Debug)]
pub struct HeadlessBackend {
    viewport: (u32, u32),
    mesh_index_counts: Vec<u32>,
    texture_count: u32,
    programs: Option<ProgramSources>,
    frames: VecDeque<FramePlan>,
    submitted: u64,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: (width, height),
            mesh_index_counts: Vec::new(),
            texture_count: 0,
            programs: None,
            frames: VecDeque::new(),
            submitted: 0,
        }
    }

    pub fn programs(&self) -> Option<&ProgramSources> {
        self.programs.as_ref()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.submitted
    }

    pub fn last_frame(&self) -> Option<&FramePlan> {
        self.frames.back()
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_index_counts.len()
    }

    pub fn texture_count(&self) -> u32 {
        self.texture_count
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl RenderBackend for HeadlessBackend {
    fn initialize(&mut self, programs: &ProgramSources) -> RenderResult<()> {
        self.programs = Some(programs.clone());
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
        let handle = MeshHandle::new(self.mesh_index_counts.len() as u32);
        self.mesh_index_counts.push(mesh.index_count());
        debug!(
            "recorded mesh {} with {} indices",
            handle.index(),
            mesh.index_count()
        );
        Ok(handle)
    }

    fn upload_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle> {
        texture.validate()?;
        let handle = TextureHandle::new(self.texture_count);
        self.texture_count += 1;
        debug!(
            "recorded texture {} ({}x{})",
            handle.index(),
            texture.width,
            texture.height
        );
        Ok(handle)
    }

    fn mesh_index_count(&self, mesh: MeshHandle) -> Option<u32> {
        self.mesh_index_counts.get(mesh.index() as usize).copied()
    }

    fn has_texture(&self, texture: TextureHandle) -> bool {
        texture.index() < self.texture_count
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport = (width, height);
        }
    }

    fn submit_frame(&mut self, frame: &FramePlan) -> RenderResult<()> {
        if self.frames.len() == FRAME_HISTORY {
            self.frames.pop_front();
        }
        self.frames.push_back(frame.clone());
        self.submitted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::light::DirectionalLight;
    use crate::scene::SceneRegistry;

    fn empty_plan(index: u64) -> FramePlan {
        FramePlan::build(
            index,
            &Camera::default(),
            &DirectionalLight::default(),
            &SceneRegistry::new(),
            (800, 600),
        )
    }

    #[test]
    fn handles_are_sequential() {
        let mut backend = HeadlessBackend::default();
        let cube = MeshData::cube(0.5);
        let first = backend.upload_mesh(&cube).unwrap();
        let second = backend.upload_mesh(&cube).unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));
        assert_eq!(backend.mesh_index_count(second), Some(36));
        assert_eq!(backend.mesh_index_count(MeshHandle::new(5)), None);

        let texture = backend
            .upload_texture(&TextureData::solid([255, 255, 255, 255]))
            .unwrap();
        assert!(backend.has_texture(texture));
        assert!(!backend.has_texture(TextureHandle::new(1)));
    }

    #[test]
    fn history_is_bounded() {
        let mut backend = HeadlessBackend::default();
        let total = FRAME_HISTORY as u64 + 3;
        for index in 0..total {
            backend.submit_frame(&empty_plan(index)).unwrap();
        }
        assert_eq!(backend.frames_submitted(), total);
        assert_eq!(backend.frames.len(), FRAME_HISTORY);
        assert_eq!(backend.frames.front().map(|f| f.index), Some(3));
        assert_eq!(backend.last_frame().map(|f| f.index), Some(total - 1));
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut backend = HeadlessBackend::new(640, 480);
        backend.resize(0, 100);
        assert_eq!(backend.viewport_size(), (640, 480));
        backend.resize(1024, 768);
        assert_eq!(backend.viewport_size(), (1024, 768));
    }
}
