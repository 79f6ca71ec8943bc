//! XML engine configuration.
//!
//! ```xml
//! <umbra>
//!   <window><title>Umbra</title><width>1280</width><height>720</height></window>
//!   <shaders>
//!     <lit><vertex>shaders/lit.vert.wgsl</vertex><fragment>shaders/lit.frag.wgsl</fragment></lit>
//!     <depth><vertex>shaders/shadow.vert.wgsl</vertex><fragment>shaders/shadow.frag.wgsl</fragment></depth>
//!   </shaders>
//!   <camera><position>0 5 10</position><target>0 0 0</target></camera>
//!   <light><direction>-0.2 -1 -0.3</direction><color>1 1 1</color><intensity>1</intensity></light>
//!   <physics><gravity>0 -9.81 0</gravity><restitution>0.3</restitution><friction>0.5</friction></physics>
//!   <model><name>Statue</name><mesh>models/statue.obj</mesh><texture>textures/statue.png</texture></model>
//!   <primitive><name>Floor</name><shape>cube</shape><scale>10 0.2 10</scale><mass>0</mass></primitive>
//!   <controls><add_cube>C</add_cube><select_next>Tab</select_next></controls>
//! </umbra>
//! ```
//!
//! Every element is optional. Relative paths resolve against the directory
//! holding the config file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::input::KeyCode;
use crate::light::DirectionalLight;
use crate::panel::ControlBindings;
use crate::physics::PhysicsConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub shaders: ShaderPaths,
    pub camera: CameraConfig,
    pub light: DirectionalLight,
    pub physics: PhysicsConfig,
    pub models: Vec<ModelConfig>,
    pub primitives: Vec<PrimitiveConfig>,
    pub controls: ControlBindings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Umbra".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderPaths {
    pub lit: ProgramPaths,
    pub depth: ProgramPaths,
}

impl ShaderPaths {
    fn in_dir(dir: &Path) -> Self {
        Self {
            lit: ProgramPaths {
                vertex: dir.join("shaders/lit.vert.wgsl"),
                fragment: dir.join("shaders/lit.frag.wgsl"),
            },
            depth: ProgramPaths {
                vertex: dir.join("shaders/shadow.vert.wgsl"),
                fragment: dir.join("shaders/shadow.frag.wgsl"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 10.0),
            target: Vec3::ZERO,
        }
    }
}

/// Mesh and texture loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub mesh: PathBuf,
    pub texture: PathBuf,
    pub position: Vec3,
    pub scale: Vec3,
    pub mass: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Cube,
    Sphere,
}

/// Procedurally generated object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveConfig {
    pub name: String,
    pub shape: Shape,
    pub position: Vec3,
    pub scale: Vec3,
    pub mass: f32,
    /// RGBA8 tint of the checker texture.
    pub color: [u8; 4],
}

impl PrimitiveConfig {
    pub fn new(name: impl Into<String>, shape: Shape, position: Vec3) -> Self {
        Self {
            name: name.into(),
            shape,
            position,
            scale: Vec3::ONE,
            mass: 1.0,
            color: [200, 200, 200, 255],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_base_dir(Path::new("."))
    }
}

impl EngineConfig {
    /// Built-in scene: a static floor, a crate and a ball, with shaders
    /// looked up under `dir`.
    pub fn with_base_dir(dir: &Path) -> Self {
        let floor = PrimitiveConfig {
            scale: Vec3::new(10.0, 0.2, 10.0),
            mass: 0.0,
            color: [90, 110, 90, 255],
            ..PrimitiveConfig::new("Floor", Shape::Cube, Vec3::new(0.0, -0.1, 0.0))
        };
        let crate_box = PrimitiveConfig {
            color: [200, 140, 60, 255],
            ..PrimitiveConfig::new("Crate", Shape::Cube, Vec3::new(0.0, 3.0, 0.0))
        };
        let ball = PrimitiveConfig {
            color: [80, 120, 220, 255],
            ..PrimitiveConfig::new("Ball", Shape::Sphere, Vec3::new(1.5, 5.0, 0.5))
        };

        Self {
            window: WindowConfig::default(),
            shaders: ShaderPaths::in_dir(dir),
            camera: CameraConfig::default(),
            light: DirectionalLight::default(),
            physics: PhysicsConfig::default(),
            models: Vec::new(),
            primitives: vec![floor, crate_box, ball],
            controls: ControlBindings::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_xml(&xml, base).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses a config document. When the document lists any `<model>` or
    /// `<primitive>`, those replace the built-in scene.
    pub fn from_xml(xml: &str, base: &Path) -> Result<Self> {
        let document = Document::parse(xml).context("invalid config XML")?;
        let root = document.root_element();
        if !root.has_tag_name("umbra") {
            bail!("expected <umbra> root element, found <{}>", root.tag_name().name());
        }

        let mut config = Self::with_base_dir(base);

        if let Some(window) = child(&root, "window") {
            let window_config = &mut config.window;
            if let Some(title) = optional_text(&window, "title") {
                window_config.title = title;
            }
            window_config.width = parse_u32(optional_text(&window, "width"), window_config.width)?;
            window_config.height =
                parse_u32(optional_text(&window, "height"), window_config.height)?;
        }

        if let Some(shaders) = child(&root, "shaders") {
            for (tag, paths) in [
                ("lit", &mut config.shaders.lit),
                ("depth", &mut config.shaders.depth),
            ] {
                let Some(program) = child(&shaders, tag) else {
                    continue;
                };
                if let Some(vertex) = optional_text(&program, "vertex") {
                    paths.vertex = base.join(vertex);
                }
                if let Some(fragment) = optional_text(&program, "fragment") {
                    paths.fragment = base.join(fragment);
                }
            }
        }

        if let Some(camera) = child(&root, "camera") {
            config.camera.position =
                parse_vec3(optional_text(&camera, "position"), config.camera.position)
                    .context("<camera><position>")?;
            config.camera.target = parse_vec3(optional_text(&camera, "target"), config.camera.target)
                .context("<camera><target>")?;
        }

        if let Some(light) = child(&root, "light") {
            let light_config = &mut config.light;
            light_config.direction =
                parse_vec3(optional_text(&light, "direction"), light_config.direction)
                    .context("<light><direction>")?;
            light_config.color = parse_vec3(optional_text(&light, "color"), light_config.color)
                .context("<light><color>")?;
            light_config.intensity =
                parse_f32(optional_text(&light, "intensity"), light_config.intensity)
                    .context("<light><intensity>")?;
        }

        if let Some(physics) = child(&root, "physics") {
            let physics_config = &mut config.physics;
            physics_config.gravity =
                parse_vec3(optional_text(&physics, "gravity"), physics_config.gravity)
                    .context("<physics><gravity>")?;
            physics_config.ground_restitution = parse_f32(
                optional_text(&physics, "restitution"),
                physics_config.ground_restitution,
            )
            .context("<physics><restitution>")?;
            physics_config.ground_friction =
                parse_f32(optional_text(&physics, "friction"), physics_config.ground_friction)
                    .context("<physics><friction>")?;
        }

        let models = root
            .children()
            .filter(|node| node.has_tag_name("model"))
            .map(|node| parse_model(&node, base))
            .collect::<Result<Vec<_>>>()?;
        let primitives = root
            .children()
            .filter(|node| node.has_tag_name("primitive"))
            .map(|node| parse_primitive(&node))
            .collect::<Result<Vec<_>>>()?;
        if !models.is_empty() || !primitives.is_empty() {
            config.models = models;
            config.primitives = primitives;
        }

        if let Some(controls) = child(&root, "controls") {
            for binding in controls.children().filter(Node::is_element) {
                let control = binding.tag_name().name();
                let name = binding.text().map(str::trim).unwrap_or_default();
                let key = KeyCode::from_name(name)
                    .ok_or_else(|| anyhow!("unknown key `{name}` for control <{control}>"))?;
                if !config.controls.set(control, key) {
                    bail!("unknown control <{control}>");
                }
            }
        }

        Ok(config)
    }
}

fn parse_model(node: &Node<'_, '_>, base: &Path) -> Result<ModelConfig> {
    let name = required_text(node, "name")?;
    let context = || format!("model `{name}`");
    Ok(ModelConfig {
        mesh: base.join(required_text(node, "mesh").with_context(context)?),
        texture: base.join(required_text(node, "texture").with_context(context)?),
        position: parse_vec3(optional_text(node, "position"), Vec3::ZERO).with_context(context)?,
        scale: parse_vec3(optional_text(node, "scale"), Vec3::ONE).with_context(context)?,
        mass: parse_f32(optional_text(node, "mass"), 1.0).with_context(context)?,
        name,
    })
}

fn parse_primitive(node: &Node<'_, '_>) -> Result<PrimitiveConfig> {
    let name = required_text(node, "name")?;
    let context = || format!("primitive `{name}`");
    let shape = match optional_text(node, "shape").as_deref() {
        None | Some("cube") => Shape::Cube,
        Some("sphere") => Shape::Sphere,
        Some(other) => bail!("primitive `{name}` has unknown shape `{other}`"),
    };
    let defaults = PrimitiveConfig::new(name.clone(), shape, Vec3::ZERO);
    Ok(PrimitiveConfig {
        position: parse_vec3(optional_text(node, "position"), defaults.position)
            .with_context(context)?,
        scale: parse_vec3(optional_text(node, "scale"), defaults.scale).with_context(context)?,
        mass: parse_f32(optional_text(node, "mass"), defaults.mass).with_context(context)?,
        color: parse_color(optional_text(node, "color"), defaults.color).with_context(context)?,
        ..defaults
    })
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn parse_components<const N: usize>(value: &str) -> Result<[f32; N]> {
    let mut components = [0.0; N];
    let mut parts = value.split_whitespace();
    for component in &mut components {
        let part = parts
            .next()
            .ok_or_else(|| anyhow!("`{value}` needs {N} components"))?;
        *component = part
            .parse()
            .with_context(|| format!("`{part}` is not a number"))?;
    }
    if parts.next().is_some() {
        bail!("`{value}` has more than {N} components");
    }
    Ok(components)
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_components::<3>(&value).map(Vec3::from_array),
        None => Ok(default),
    }
}

/// `r g b` or `r g b a` in 0..=255.
fn parse_color(value: Option<String>, default: [u8; 4]) -> Result<[u8; 4]> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parts: Vec<&str> = value.split_whitespace().collect();
    if !(3..=4).contains(&parts.len()) {
        bail!("color `{value}` needs 3 or 4 components");
    }
    let mut color = [255; 4];
    for (slot, part) in color.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .with_context(|| format!("`{part}` is not a colour channel"))?;
    }
    Ok(color)
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float `{value}`: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer `{value}`: {err}")),
        None => Ok(default),
    }
}
