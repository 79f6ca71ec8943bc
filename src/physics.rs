//! Minimal rigid-body simulation feeding object poses to the renderer.
//!
//! Bodies are oriented boxes integrated with semi-implicit Euler at a fixed
//! rate. Contacts are resolved against a ground plane at `y = 0` and between
//! bodies using their world-space bounds. The world knows bodies only by
//! [`ObjectId`] and reports poses as [`BodyTransform`] values.

use glam::{Mat3, Quat, Vec3};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::scene::ObjectId;

pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
pub const MAX_SUBSTEPS: u32 = 10;

// Bounce speeds below this settle instead of jittering on the ground.
const REST_SPEED: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub ground_restitution: f32,
    /// Fraction of tangential velocity removed per second of ground contact.
    pub ground_friction: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            ground_restitution: 0.3,
            ground_friction: 0.5,
        }
    }
}

/// Pose of a simulated body, keyed by the object it drives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyTransform {
    pub id: ObjectId,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub id: ObjectId,
    pub half_extents: Vec3,
    /// Zero for static bodies.
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl RigidBody {
    pub fn dynamic(id: ObjectId, half_extents: Vec3, mass: f32, position: Vec3) -> Self {
        Self {
            id,
            half_extents,
            mass: mass.max(f32::EPSILON),
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }

    pub fn fixed(id: ObjectId, half_extents: Vec3, position: Vec3) -> Self {
        Self {
            mass: 0.0,
            ..Self::dynamic(id, half_extents, 1.0, position)
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    fn inverse_mass(&self) -> f32 {
        if self.is_static() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Half size of the world-space box enclosing the rotated body.
    fn world_extents(&self) -> Vec3 {
        let basis = Mat3::from_quat(self.rotation);
        basis.x_axis.abs() * self.half_extents.x
            + basis.y_axis.abs() * self.half_extents.y
            + basis.z_axis.abs() * self.half_extents.z
    }

    fn transform(&self) -> BodyTransform {
        BodyTransform {
            id: self.id,
            position: self.position,
            rotation: self.rotation,
        }
    }
}

#[derive(Debug, Default)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: Vec<RigidBody>,
    accumulator: f32,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            accumulator: 0.0,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn add_body(&mut self, body: RigidBody) {
        self.bodies.push(body);
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn body(&self, id: ObjectId) -> Option<&RigidBody> {
        self.bodies.iter().find(|body| body.id == id)
    }

    /// Teleports a body and clears its motion. Returns `false` for unknown ids.
    pub fn set_position(&mut self, id: ObjectId, position: Vec3) -> bool {
        let Some(body) = self.bodies.iter_mut().find(|body| body.id == id) else {
            return false;
        };
        body.position = position;
        body.velocity = Vec3::ZERO;
        body.angular_velocity = Vec3::ZERO;
        true
    }

    /// Advances the world by `dt` seconds in fixed steps.
    ///
    /// At most [`MAX_SUBSTEPS`] steps run per call; time beyond that is
    /// dropped. Returns the pose of every body afterwards.
    pub fn step_simulation(&mut self, dt: f32) -> Vec<BodyTransform> {
        self.accumulator += dt.max(0.0);
        let mut steps = 0;
        while self.accumulator >= FIXED_TIMESTEP && steps < MAX_SUBSTEPS {
            self.integrate(FIXED_TIMESTEP);
            self.resolve_contacts();
            self.accumulator -= FIXED_TIMESTEP;
            steps += 1;
        }
        if self.accumulator >= FIXED_TIMESTEP {
            trace!("dropping {:.3}s of simulation time", self.accumulator);
            self.accumulator = 0.0;
        }
        self.transforms()
    }

    pub fn transforms(&self) -> Vec<BodyTransform> {
        self.bodies.iter().map(RigidBody::transform).collect()
    }

    fn integrate(&mut self, h: f32) {
        let config = self.config;
        for body in self.bodies.iter_mut().filter(|body| !body.is_static()) {
            body.velocity += config.gravity * h;
            body.position += body.velocity * h;
            if body.angular_velocity != Vec3::ZERO {
                let spin = Quat::from_scaled_axis(body.angular_velocity * h);
                body.rotation = (spin * body.rotation).normalize();
            }

            let lowest = body.position.y - body.world_extents().y;
            if lowest < 0.0 {
                body.position.y -= lowest;
                if body.velocity.y < 0.0 {
                    body.velocity.y = -body.velocity.y * config.ground_restitution;
                    if body.velocity.y < REST_SPEED {
                        body.velocity.y = 0.0;
                    }
                }
                let damping = (1.0 - config.ground_friction * h).clamp(0.0, 1.0);
                body.velocity.x *= damping;
                body.velocity.z *= damping;
                body.angular_velocity *= damping;
            }
        }
    }

    fn resolve_contacts(&mut self) {
        for i in 0..self.bodies.len() {
            for j in i + 1..self.bodies.len() {
                let (head, tail) = self.bodies.split_at_mut(j);
                separate(&mut head[i], &mut tail[0]);
            }
        }
    }
}

/// Pushes two overlapping bodies apart along the axis of least penetration,
/// sharing the correction by inverse mass.
fn separate(a: &mut RigidBody, b: &mut RigidBody) {
    let total_inverse = a.inverse_mass() + b.inverse_mass();
    if total_inverse == 0.0 {
        return;
    }

    let delta = b.position - a.position;
    let overlap = a.world_extents() + b.world_extents() - delta.abs();
    if overlap.min_element() <= 0.0 {
        return;
    }

    let axis = if overlap.x < overlap.y && overlap.x < overlap.z {
        Vec3::X
    } else if overlap.y < overlap.z {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let direction = if delta.dot(axis) < 0.0 { -axis } else { axis };
    let depth = overlap.dot(axis);

    a.position -= direction * depth * (a.inverse_mass() / total_inverse);
    b.position += direction * depth * (b.inverse_mass() / total_inverse);

    let closing = (b.velocity - a.velocity).dot(direction);
    if closing < 0.0 {
        let impulse = direction * closing / total_inverse;
        a.velocity += impulse * a.inverse_mass();
        b.velocity -= impulse * b.inverse_mass();
    }
}
