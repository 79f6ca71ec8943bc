//! Keyboard control panel: spawns primitives, selects objects and steers the
//! selection and the camera.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::input::{InputState, KeyCode, NamedKey};
use crate::scene::{ObjectId, SceneRegistry};

const MOVE_SPEED: f32 = 2.0;
const ORBIT_SPEED: f32 = 1.2;
const ZOOM_RATE: f32 = 0.8;

/// Key assigned to each panel control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlBindings {
    pub add_cube: KeyCode,
    pub add_sphere: KeyCode,
    pub select_next: KeyCode,
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_back: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub orbit_left: KeyCode,
    pub orbit_right: KeyCode,
    pub zoom_in: KeyCode,
    pub zoom_out: KeyCode,
}

impl Default for ControlBindings {
    fn default() -> Self {
        Self {
            add_cube: KeyCode::Character('C'),
            add_sphere: KeyCode::Character('V'),
            select_next: KeyCode::Named(NamedKey::Tab),
            move_left: KeyCode::Named(NamedKey::Left),
            move_right: KeyCode::Named(NamedKey::Right),
            move_forward: KeyCode::Named(NamedKey::Up),
            move_back: KeyCode::Named(NamedKey::Down),
            move_up: KeyCode::Named(NamedKey::PageUp),
            move_down: KeyCode::Named(NamedKey::PageDown),
            orbit_left: KeyCode::Character('Q'),
            orbit_right: KeyCode::Character('E'),
            zoom_in: KeyCode::Named(NamedKey::Equal),
            zoom_out: KeyCode::Named(NamedKey::Minus),
        }
    }
}

impl ControlBindings {
    /// Rebinds the control called `control`. Returns `false` if no control has
    /// that name.
    pub fn set(&mut self, control: &str, key: KeyCode) -> bool {
        let slot = match control {
            "add_cube" => &mut self.add_cube,
            "add_sphere" => &mut self.add_sphere,
            "select_next" => &mut self.select_next,
            "move_left" => &mut self.move_left,
            "move_right" => &mut self.move_right,
            "move_forward" => &mut self.move_forward,
            "move_back" => &mut self.move_back,
            "move_up" => &mut self.move_up,
            "move_down" => &mut self.move_down,
            "orbit_left" => &mut self.orbit_left,
            "orbit_right" => &mut self.orbit_right,
            "zoom_in" => &mut self.zoom_in,
            "zoom_out" => &mut self.zoom_out,
            _ => return false,
        };
        *slot = key;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelAction {
    AddCube,
    AddSphere,
    Select(ObjectId),
    MoveSelected { id: ObjectId, position: Vec3 },
    /// Yaw in radians around the camera target.
    OrbitCamera(f32),
    /// Multiplier for the camera's distance to its target.
    ZoomCamera(f32),
}

#[derive(Debug, Default)]
pub struct ControlPanel {
    bindings: ControlBindings,
    selected: Option<ObjectId>,
}

impl ControlPanel {
    pub fn new(bindings: ControlBindings) -> Self {
        Self {
            bindings,
            selected: None,
        }
    }

    pub fn bindings(&self) -> &ControlBindings {
        &self.bindings
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    /// Turns this frame's keyboard state into actions. The caller applies
    /// them; the panel only reads the registry.
    pub fn update(
        &mut self,
        input: &InputState,
        scene: &SceneRegistry,
        dt: f32,
    ) -> Vec<PanelAction> {
        let keys = &self.bindings;
        let mut actions = Vec::new();

        if input.was_pressed(keys.add_cube) {
            actions.push(PanelAction::AddCube);
        }
        if input.was_pressed(keys.add_sphere) {
            actions.push(PanelAction::AddSphere);
        }

        if self.selected.is_some_and(|id| scene.get(id).is_none()) {
            self.selected = None;
        }
        if input.was_pressed(keys.select_next) {
            if let Some(id) = next_selection(scene, self.selected) {
                self.selected = Some(id);
                actions.push(PanelAction::Select(id));
            }
        }

        let axis = |positive: KeyCode, negative: KeyCode| {
            (input.is_key_down(positive) as i32 - input.is_key_down(negative) as i32) as f32
        };
        let keys = &self.bindings;

        let direction = Vec3::new(
            axis(keys.move_right, keys.move_left),
            axis(keys.move_up, keys.move_down),
            axis(keys.move_back, keys.move_forward),
        );
        if direction != Vec3::ZERO {
            if let Some((id, object)) = self
                .selected
                .and_then(|id| scene.get(id).map(|object| (id, object)))
            {
                actions.push(PanelAction::MoveSelected {
                    id,
                    position: object.position() + direction * MOVE_SPEED * dt,
                });
            }
        }

        let orbit = axis(keys.orbit_right, keys.orbit_left);
        if orbit != 0.0 {
            actions.push(PanelAction::OrbitCamera(orbit * ORBIT_SPEED * dt));
        }
        let zoom = axis(keys.zoom_out, keys.zoom_in);
        if zoom != 0.0 {
            actions.push(PanelAction::ZoomCamera(1.0 + zoom * ZOOM_RATE * dt));
        }

        actions
    }

    /// One line per object in draw order, marking the selection.
    pub fn describe(&self, scene: &SceneRegistry) -> Vec<String> {
        scene
            .iter()
            .enumerate()
            .map(|(index, (id, object))| {
                let marker = if Some(id) == self.selected { "*" } else { " " };
                format!("{marker} Object {index}: {}", object.name)
            })
            .collect()
    }
}

fn next_selection(scene: &SceneRegistry, current: Option<ObjectId>) -> Option<ObjectId> {
    let position = current.and_then(|id| scene.iter().position(|(other, _)| other == id));
    let next = position.map_or(0, |index| (index + 1) % scene.len().max(1));
    scene.at(next).map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MeshHandle, TextureHandle};
    use crate::scene::{SceneObject, Transform};

    fn scene_with(count: usize) -> SceneRegistry {
        let mut scene = SceneRegistry::new();
        for index in 0..count {
            scene.push(
                SceneObject::new(
                    format!("Object{index}"),
                    MeshHandle::new(0),
                    TextureHandle::new(0),
                    36,
                )
                .with_transform(Transform::from_position(Vec3::new(index as f32, 1.0, 0.0))),
            );
        }
        scene
    }

    #[test]
    fn spawn_keys_fire_once_per_press() {
        let mut panel = ControlPanel::default();
        let input = InputState::new();
        let scene = SceneRegistry::new();
        input.set_key_down(KeyCode::Character('C'));
        assert_eq!(panel.update(&input, &scene, 0.016), vec![PanelAction::AddCube]);
        input.end_frame();
        assert!(panel.update(&input, &scene, 0.016).is_empty());
    }

    #[test]
    fn selection_cycles_in_insertion_order() {
        let mut panel = ControlPanel::default();
        let input = InputState::new();
        let scene = scene_with(2);
        let ids: Vec<_> = scene.iter().map(|(id, _)| id).collect();
        let tab = KeyCode::Named(NamedKey::Tab);

        let mut picks = Vec::new();
        for _ in 0..3 {
            input.set_key_down(tab);
            picks.extend(panel.update(&input, &scene, 0.016));
            input.set_key_up(tab);
            input.end_frame();
        }
        assert_eq!(
            picks,
            vec![
                PanelAction::Select(ids[0]),
                PanelAction::Select(ids[1]),
                PanelAction::Select(ids[0]),
            ]
        );
        assert_eq!(panel.describe(&scene)[0], "* Object 0: Object0");
    }

    #[test]
    fn held_arrow_moves_the_selection() {
        let mut panel = ControlPanel::default();
        let input = InputState::new();
        let scene = scene_with(1);
        input.set_key_down(KeyCode::Named(NamedKey::Tab));
        panel.update(&input, &scene, 0.0);
        input.end_frame();

        input.set_key_down(KeyCode::Named(NamedKey::Right));
        let actions = panel.update(&input, &scene, 0.5);
        let (id, _) = scene.at(0).unwrap();
        assert_eq!(
            actions,
            vec![PanelAction::MoveSelected {
                id,
                position: Vec3::new(1.0, 1.0, 0.0)
            }]
        );
    }

    #[test]
    fn moving_without_selection_does_nothing() {
        let mut panel = ControlPanel::default();
        let input = InputState::new();
        input.set_key_down(KeyCode::Named(NamedKey::Up));
        assert!(panel.update(&input, &scene_with(1), 0.1).is_empty());
    }

    #[test]
    fn camera_keys_orbit_and_zoom() {
        let mut bindings = ControlBindings::default();
        assert!(bindings.set("zoom_in", KeyCode::Character('Z')));
        assert!(!bindings.set("warp", KeyCode::Character('W')));
        let mut panel = ControlPanel::new(bindings);
        let input = InputState::new();
        input.set_key_down(KeyCode::Character('E'));
        input.set_key_down(KeyCode::Character('Z'));
        let actions = panel.update(&input, &SceneRegistry::new(), 0.5);
        match actions.as_slice() {
            [PanelAction::OrbitCamera(yaw), PanelAction::ZoomCamera(factor)] => {
                assert!((yaw - 0.6).abs() < 1e-6);
                assert!((factor - 0.6).abs() < 1e-6);
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }
}
