use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec3;
use log::{debug, info};

use crate::assets::{primitive_model, AssetLoader, ModelAsset};
use crate::config::{EngineConfig, PrimitiveConfig, Shape};
use crate::engine::GraphicsEngine;
use crate::error::RenderResult;
use crate::input::InputState;
use crate::panel::{ControlPanel, PanelAction};
use crate::physics::{PhysicsWorld, RigidBody};
use crate::render::{FrameReport, RenderBackend};
use crate::scene::{ObjectId, SceneRegistry, Transform};

/// Height at which panel-spawned primitives enter the scene.
const SPAWN_HEIGHT: f32 = 5.0;

/// Per-frame driver: physics step, transform hand-off, render, control panel.
pub struct Simulation<B: RenderBackend> {
    engine: GraphicsEngine<B>,
    physics: PhysicsWorld,
    panel: ControlPanel,
    input: Arc<InputState>,
    spawned: u32,
}

impl<B: RenderBackend> Simulation<B> {
    pub fn new(backend: B, config: &EngineConfig, input: Arc<InputState>) -> Self {
        Self {
            engine: GraphicsEngine::new(backend),
            physics: PhysicsWorld::new(config.physics),
            panel: ControlPanel::new(config.controls.clone()),
            input,
            spawned: 0,
        }
    }

    /// Compiles the programs and loads every configured model and primitive.
    pub fn initialize(&mut self, config: &EngineConfig) -> Result<()> {
        let loader = AssetLoader::new(".");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("failed to start asset runtime")?;
        let programs = runtime
            .block_on(loader.load_programs(&config.shaders))
            .context("failed to load shader sources")?;
        self.engine
            .initialize(&programs)
            .context("failed to initialize renderer")?;

        let camera = self.engine.camera_mut();
        camera.set_position(config.camera.position);
        camera.set_target(config.camera.target);
        *self.engine.light_mut() = config.light;

        for model in &config.models {
            let asset = runtime
                .block_on(loader.load_model(&model.mesh, &model.texture))
                .with_context(|| format!("failed to load model `{}`", model.name))?;
            self.spawn(&model.name, &asset, model.position, model.scale, model.mass)
                .with_context(|| format!("failed to add model `{}`", model.name))?;
        }
        for primitive in &config.primitives {
            self.spawn_primitive(primitive)
                .with_context(|| format!("failed to add primitive `{}`", primitive.name))?;
        }

        info!(
            "scene ready: {} objects, {} bodies",
            self.engine.objects().len(),
            self.physics.len()
        );
        Ok(())
    }

    /// Advances physics by `dt`, renders a frame and applies panel input.
    pub fn step(&mut self, dt: f32) -> RenderResult<FrameReport> {
        let transforms = self.physics.step_simulation(dt);
        self.engine.apply_transforms(&transforms)?;
        let rendered = self.engine.render_frame();
        self.apply_panel(dt)?;
        rendered
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.engine.resize(width, height);
    }

    pub fn engine(&self) -> &GraphicsEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GraphicsEngine<B> {
        &mut self.engine
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    fn spawn_primitive(&mut self, primitive: &PrimitiveConfig) -> RenderResult<ObjectId> {
        let asset = primitive_model(primitive);
        self.spawn(
            &primitive.name,
            &asset,
            primitive.position,
            primitive.scale,
            primitive.mass,
        )
    }

    fn spawn(
        &mut self,
        name: &str,
        asset: &ModelAsset,
        position: Vec3,
        scale: Vec3,
        mass: f32,
    ) -> RenderResult<ObjectId> {
        let transform = Transform::from_position(position).with_scale(scale);
        let id = self
            .engine
            .spawn(name, &asset.mesh, &asset.texture, transform)?;
        let half_extents = asset.half_extents(scale);
        let body = if mass > 0.0 {
            RigidBody::dynamic(id, half_extents, mass, position)
        } else {
            RigidBody::fixed(id, half_extents, position)
        };
        self.physics.add_body(body);
        Ok(id)
    }

    fn apply_panel(&mut self, dt: f32) -> RenderResult<()> {
        let actions = self.panel.update(&self.input, self.engine.objects(), dt);
        self.input.end_frame();

        for action in actions {
            match action {
                PanelAction::AddCube => {
                    self.spawned += 1;
                    let name = format!("Cube {}", self.spawned);
                    self.spawn_primitive(&PrimitiveConfig::new(
                        name,
                        Shape::Cube,
                        Vec3::new(0.0, SPAWN_HEIGHT, 0.0),
                    ))?;
                }
                PanelAction::AddSphere => {
                    self.spawned += 1;
                    let name = format!("Sphere {}", self.spawned);
                    self.spawn_primitive(&PrimitiveConfig::new(
                        name,
                        Shape::Sphere,
                        Vec3::new(0.0, SPAWN_HEIGHT, 0.0),
                    ))?;
                }
                PanelAction::Select(id) => {
                    if let Some(object) = self.engine.object(id) {
                        info!("selected {} ({id})", object.name);
                    }
                    for line in self.panel.describe(self.engine.objects()) {
                        debug!("{line}");
                    }
                }
                PanelAction::MoveSelected { id, position } => {
                    self.physics.set_position(id, position);
                    if let Some(object) = self.engine.object_mut(id) {
                        let rotation = object.transform().rotation;
                        object.set_pose(position, rotation);
                    }
                }
                PanelAction::OrbitCamera(yaw) => self.engine.camera_mut().orbit(yaw),
                PanelAction::ZoomCamera(factor) => self.engine.camera_mut().zoom(factor),
            }
        }
        Ok(())
    }
}

pub fn print_final_state(objects: &SceneRegistry) {
    println!("Final object states:");
    for (_, object) in objects.iter() {
        let position = object.position();
        let scale = object.transform().scale;
        println!(
            " - {} pos=({:.2}, {:.2}, {:.2}) scale=({:.2}, {:.2}, {:.2})",
            object.name, position.x, position.y, position.z, scale.x, scale.y, scale.z
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::input::KeyCode;
    use crate::physics::FIXED_TIMESTEP;
    use crate::render::HeadlessBackend;

    fn simulation() -> (Simulation<HeadlessBackend>, Arc<InputState>) {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = EngineConfig::with_base_dir(root);
        let input = Arc::new(InputState::new());
        let mut simulation =
            Simulation::new(HeadlessBackend::new(640, 480), &config, Arc::clone(&input));
        simulation.initialize(&config).unwrap();
        (simulation, input)
    }

    #[test]
    fn builtin_scene_settles_on_the_floor() {
        let (mut simulation, _) = simulation();
        for _ in 0..240 {
            let report = simulation.step(FIXED_TIMESTEP).unwrap();
            assert_eq!(report.shadow_draws, 3);
            assert_eq!(report.main_draws, 3);
        }
        let objects = simulation.engine().objects();
        let (_, crate_box) = objects.at(1).unwrap();
        assert_eq!(crate_box.name, "Crate");
        assert!((crate_box.position().y - 0.5).abs() < 0.01);
        let (_, floor) = objects.at(0).unwrap();
        assert_eq!(floor.position(), Vec3::new(0.0, -0.1, 0.0));
    }

    #[test]
    fn panel_spawns_cubes_into_both_worlds() {
        let (mut simulation, input) = simulation();
        input.set_key_down(KeyCode::Character('C'));
        simulation.step(FIXED_TIMESTEP).unwrap();
        input.set_key_up(KeyCode::Character('C'));
        assert_eq!(simulation.engine().objects().len(), 4);
        assert_eq!(simulation.physics().len(), 4);

        let report = simulation.step(FIXED_TIMESTEP).unwrap();
        assert_eq!(report.main_draws, 4);
        let (_, cube) = simulation.engine().objects().at(3).unwrap();
        assert_eq!(cube.name, "Cube 1");
    }

    #[test]
    fn missing_shader_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::with_base_dir(dir.path());
        let mut simulation = Simulation::new(
            HeadlessBackend::default(),
            &config,
            Arc::new(InputState::new()),
        );
        let err = simulation.initialize(&config).unwrap_err();
        assert!(format!("{err:?}").contains("lit.vert.wgsl"));
    }
}
