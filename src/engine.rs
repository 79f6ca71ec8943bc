use std::fmt;

use log::{debug, error, info, trace};

use crate::camera::Camera;
use crate::error::{RenderError, RenderResult, ResourceContractViolation};
use crate::light::{DirectionalLight, Light};
use crate::mesh::{MeshData, TextureData};
use crate::physics::BodyTransform;
use crate::render::{FramePlan, FrameReport, ProgramSources, RenderBackend};
use crate::scene::{ObjectId, SceneObject, SceneRegistry, Transform};

/// Lifecycle of a [`GraphicsEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Rendering,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Rendering => "rendering",
        })
    }
}

/// Owns the camera, lights and object registry and sequences the shadow and
/// main passes each frame.
pub struct GraphicsEngine<B: RenderBackend> {
    backend: B,
    state: EngineState,
    camera: Camera,
    light: DirectionalLight,
    auxiliary_lights: Vec<Light>,
    scene: SceneRegistry,
    frame_index: u64,
}

impl<B: RenderBackend> GraphicsEngine<B> {
    pub fn new(backend: B) -> Self {
        let (width, height) = backend.viewport_size();
        let mut camera = Camera::default();
        camera.set_aspect(width, height);
        Self {
            backend,
            state: EngineState::Uninitialized,
            camera,
            light: DirectionalLight::default(),
            auxiliary_lights: Vec::new(),
            scene: SceneRegistry::new(),
            frame_index: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Compiles both programs and prepares the shadow target.
    ///
    /// On failure the engine stays uninitialized and can be retried.
    pub fn initialize(&mut self, programs: &ProgramSources) -> RenderResult<()> {
        if self.state != EngineState::Uninitialized {
            return Err(RenderError::NotReady { state: self.state });
        }

        self.state = EngineState::Initializing;
        match self.backend.initialize(programs) {
            Ok(()) => {
                self.state = EngineState::Ready;
                info!(
                    "engine ready with programs `{}` and `{}`",
                    programs.lit.label, programs.depth.label
                );
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Uninitialized;
                error!("engine initialization failed: {err}");
                Err(err)
            }
        }
    }

    /// Registers an object whose mesh and texture are already uploaded. It is
    /// drawn from the next frame on.
    pub fn add_object(&mut self, object: SceneObject) -> RenderResult<ObjectId> {
        self.require_ready()?;
        self.check_resources(&object)?;
        let name = object.name.clone();
        let id = self.scene.push(object);
        debug!("added object `{name}` as {id}");
        Ok(id)
    }

    /// Uploads `texture` and `mesh`, then registers an object drawing all of
    /// the mesh's indices. A rejected texture leaves nothing uploaded.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        mesh: &MeshData,
        texture: &TextureData,
        transform: Transform,
    ) -> RenderResult<ObjectId> {
        self.require_ready()?;
        let texture_handle = self.backend.upload_texture(texture)?;
        let mesh_handle = self.backend.upload_mesh(mesh)?;
        let object = SceneObject::new(name, mesh_handle, texture_handle, mesh.index_count())
            .with_transform(transform);
        self.add_object(object)
    }

    /// Renders the shadow pass followed by the main pass.
    pub fn render_frame(&mut self) -> RenderResult<FrameReport> {
        self.require_ready()?;

        self.state = EngineState::Rendering;
        let plan = FramePlan::build(
            self.frame_index,
            &self.camera,
            &self.light,
            &self.scene,
            self.backend.viewport_size(),
        );
        let submitted = self.backend.submit_frame(&plan);
        self.state = EngineState::Ready;
        submitted?;

        self.frame_index += 1;
        let report = plan.report();
        trace!(
            "frame {} drew {} shadow / {} main",
            report.index,
            report.shadow_draws,
            report.main_draws
        );
        Ok(report)
    }

    /// Copies simulated poses onto their objects. Every id is checked before
    /// any object is touched.
    pub fn apply_transforms(
        &mut self,
        transforms: &[BodyTransform],
    ) -> Result<(), ResourceContractViolation> {
        if let Some(unknown) = transforms
            .iter()
            .find(|transform| self.scene.get(transform.id).is_none())
        {
            return Err(ResourceContractViolation::UnknownObject(unknown.id));
        }
        for transform in transforms {
            if let Some(object) = self.scene.get_mut(transform.id) {
                object.set_pose(transform.position, transform.rotation);
            }
        }
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
        let (width, height) = self.backend.viewport_size();
        self.camera.set_aspect(width, height);
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.light
    }

    /// Stores an additional light. Only the primary directional light is
    /// rendered.
    pub fn add_auxiliary_light(&mut self, light: Light) {
        self.auxiliary_lights.push(light);
    }

    pub fn auxiliary_lights(&self) -> &[Light] {
        &self.auxiliary_lights
    }

    pub fn objects(&self) -> &SceneRegistry {
        &self.scene
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.scene.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.scene.get_mut(id)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }

    fn require_ready(&self) -> RenderResult<()> {
        match self.state {
            EngineState::Ready => Ok(()),
            state => Err(RenderError::NotReady { state }),
        }
    }

    fn check_resources(&self, object: &SceneObject) -> Result<(), ResourceContractViolation> {
        let available = self.backend.mesh_index_count(object.mesh).ok_or_else(|| {
            ResourceContractViolation::UnknownMesh {
                name: object.name.clone(),
                mesh: object.mesh.index(),
            }
        })?;
        if object.index_count > available {
            return Err(ResourceContractViolation::IndexCountMismatch {
                name: object.name.clone(),
                requested: object.index_count,
                available,
            });
        }
        if !self.backend.has_texture(object.texture) {
            return Err(ResourceContractViolation::UnknownTexture {
                name: object.name.clone(),
                texture: object.texture.index(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::error::{ShaderCompileError, ShaderStage};
    use crate::render::{HeadlessBackend, MeshHandle, ShaderSources, TextureHandle};

    fn sources() -> ProgramSources {
        ProgramSources {
            lit: ShaderSources::new("lit", "// vs", "// fs"),
            depth: ShaderSources::new("depth", "// vs", "// fs"),
        }
    }

    fn ready_engine() -> GraphicsEngine<HeadlessBackend> {
        let mut engine = GraphicsEngine::new(HeadlessBackend::new(800, 600));
        engine.initialize(&sources()).unwrap();
        engine
    }

    /// Backend whose program compilation or frame submission always fails.
    struct FailingBackend {
        inner: HeadlessBackend,
        fail_initialize: bool,
    }

    impl RenderBackend for FailingBackend {
        fn initialize(&mut self, programs: &ProgramSources) -> RenderResult<()> {
            if self.fail_initialize {
                return Err(ShaderCompileError::new(
                    programs.lit.label.as_str(),
                    ShaderStage::Fragment,
                    "expected `;`",
                )
                .into());
            }
            self.inner.initialize(programs)
        }

        fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
            self.inner.upload_mesh(mesh)
        }

        fn upload_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle> {
            self.inner.upload_texture(texture)
        }

        fn mesh_index_count(&self, mesh: MeshHandle) -> Option<u32> {
            self.inner.mesh_index_count(mesh)
        }

        fn has_texture(&self, texture: TextureHandle) -> bool {
            self.inner.has_texture(texture)
        }

        fn viewport_size(&self) -> (u32, u32) {
            self.inner.viewport_size()
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.inner.resize(width, height)
        }

        fn submit_frame(&mut self, _frame: &FramePlan) -> RenderResult<()> {
            Err(RenderError::Gpu("device lost".into()))
        }
    }

    #[test]
    fn starts_uninitialized_with_window_aspect() {
        let engine = GraphicsEngine::new(HeadlessBackend::new(800, 600));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!((engine.camera().aspect() - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn render_before_initialize_is_rejected() {
        let mut engine = GraphicsEngine::new(HeadlessBackend::default());
        let err = engine.render_frame().unwrap_err();
        assert!(matches!(
            err,
            RenderError::NotReady {
                state: EngineState::Uninitialized
            }
        ));
    }

    #[test]
    fn failed_initialize_installs_nothing() {
        let mut engine = GraphicsEngine::new(FailingBackend {
            inner: HeadlessBackend::default(),
            fail_initialize: true,
        });
        let err = engine.initialize(&sources()).unwrap_err();
        match err {
            RenderError::ShaderCompile(err) => assert_eq!(err.stage, ShaderStage::Fragment),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.backend().inner.programs().is_none());
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let mut engine = ready_engine();
        assert!(matches!(
            engine.initialize(&sources()),
            Err(RenderError::NotReady {
                state: EngineState::Ready
            })
        ));
    }

    #[test]
    fn added_object_is_drawn_once_per_pass() {
        let mut engine = ready_engine();
        let id = engine
            .spawn(
                "Crate",
                &MeshData::cube(0.5),
                &TextureData::solid([200, 120, 40, 255]),
                Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
            )
            .unwrap();

        let report = engine.render_frame().unwrap();
        assert_eq!(report.shadow_draws, 1);
        assert_eq!(report.main_draws, 1);

        let plan = engine.backend().last_frame().unwrap();
        assert_eq!(plan.shadow.draws[0].object, id);
        assert_eq!(plan.shadow.draws[0].index_count, 36);
        assert_eq!(plan.main.draws[0].object, id);
        assert_eq!(plan.main.draws[0].index_count, 36);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn state_returns_to_ready_after_failed_frame() {
        let mut engine = GraphicsEngine::new(FailingBackend {
            inner: HeadlessBackend::default(),
            fail_initialize: false,
        });
        engine.initialize(&sources()).unwrap();
        assert!(matches!(engine.render_frame(), Err(RenderError::Gpu(_))));
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.frames_rendered(), 0);
    }

    #[test]
    fn add_object_checks_uploaded_resources() {
        let mut engine = ready_engine();
        let missing = SceneObject::new("Ghost", MeshHandle::new(3), TextureHandle::new(0), 6);
        assert!(matches!(
            engine.add_object(missing),
            Err(RenderError::ResourceContract(
                ResourceContractViolation::UnknownMesh { mesh: 3, .. }
            ))
        ));

        let mesh = engine
            .backend_mut()
            .upload_mesh(&MeshData::cube(1.0))
            .unwrap();
        let too_many = SceneObject::new("Greedy", mesh, TextureHandle::new(0), 72);
        assert!(matches!(
            engine.add_object(too_many),
            Err(RenderError::ResourceContract(
                ResourceContractViolation::IndexCountMismatch {
                    requested: 72,
                    available: 36,
                    ..
                }
            ))
        ));

        let untextured = SceneObject::new("Bare", mesh, TextureHandle::new(0), 36);
        assert!(matches!(
            engine.add_object(untextured),
            Err(RenderError::ResourceContract(
                ResourceContractViolation::UnknownTexture { .. }
            ))
        ));
        assert!(engine.objects().is_empty());
    }

    #[test]
    fn rejected_texture_leaves_no_mesh_behind() {
        let mut engine = ready_engine();
        let truncated = TextureData {
            width: 4,
            height: 4,
            pixels: vec![0; 8],
        };
        let err = engine
            .spawn("Broken", &MeshData::cube(0.5), &truncated, Transform::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Gpu(_)));
        assert_eq!(engine.backend().mesh_count(), 0);
        assert_eq!(engine.backend().texture_count(), 0);
        assert!(engine.objects().is_empty());
    }

    #[test]
    fn partial_index_count_is_accepted() {
        let mut engine = ready_engine();
        let mesh = engine
            .backend_mut()
            .upload_mesh(&MeshData::cube(1.0))
            .unwrap();
        let texture = engine
            .backend_mut()
            .upload_texture(&TextureData::solid([255; 4]))
            .unwrap();
        let id = engine
            .add_object(SceneObject::new("Half", mesh, texture, 18))
            .unwrap();
        engine.render_frame().unwrap();
        let draw = engine.backend().last_frame().unwrap().main.draws[0];
        assert_eq!((draw.object, draw.index_count), (id, 18));
    }

    #[test]
    fn transforms_apply_atomically() {
        let mut engine = ready_engine();
        let cube = MeshData::cube(0.5);
        let texture = TextureData::solid([255; 4]);
        let a = engine
            .spawn("A", &cube, &texture, Transform::default())
            .unwrap();
        let b = engine
            .spawn("B", &cube, &texture, Transform::default().with_scale(Vec3::splat(2.0)))
            .unwrap();

        let rotation = Quat::from_rotation_y(0.5);
        engine
            .apply_transforms(&[BodyTransform {
                id: b,
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation,
            }])
            .unwrap();
        let moved = engine.object(b).unwrap();
        assert_eq!(moved.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(moved.transform().scale, Vec3::splat(2.0));

        let other = engine.objects().at(0).map(|(id, _)| id);
        assert_eq!(other, Some(a));
        let bogus = engine.objects().len() as u32 + 10;
        let unknown = crate::scene::ObjectId::from_index(bogus);
        let result = engine.apply_transforms(&[
            BodyTransform {
                id: a,
                position: Vec3::splat(9.0),
                rotation: Quat::IDENTITY,
            },
            BodyTransform {
                id: unknown,
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
            },
        ]);
        assert_eq!(result, Err(ResourceContractViolation::UnknownObject(unknown)));
        assert_eq!(engine.object(a).unwrap().position(), Vec3::ZERO);
    }

    #[test]
    fn resize_updates_camera_aspect() {
        let mut engine = ready_engine();
        engine.resize(1000, 500);
        assert!((engine.camera().aspect() - 2.0).abs() < 1e-6);
        let report = engine.render_frame().unwrap();
        assert_eq!(report.index, 0);
        assert_eq!(
            engine.backend().last_frame().unwrap().main.viewport,
            (1000, 500)
        );
    }

    #[test]
    fn auxiliary_lights_are_stored_not_rendered() {
        let mut engine = ready_engine();
        engine.add_auxiliary_light(Light::Point(crate::light::PointLight {
            position: Vec3::new(0.0, 3.0, 0.0),
            color: Vec3::ONE,
            intensity: 2.0,
        }));
        assert_eq!(engine.auxiliary_lights().len(), 1);
        engine.render_frame().unwrap();
        let plan = engine.backend().last_frame().unwrap();
        assert_eq!(plan.main.light_direction, engine.light().direction);
    }
}
