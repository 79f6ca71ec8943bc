//! Perspective look-at camera.

use glam::{Mat4, Quat, Vec3};

/// Vertical field of view used by every projection.
pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 1000.0;

/// Camera state. Matrices are derived on every call and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect: 1.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            target,
            up,
            ..Self::default()
        }
    }

    /// Updates the aspect ratio after the output viewport changed size.
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Rotates the eye around the target about the up axis.
    pub fn orbit(&mut self, yaw: f32) {
        let offset = self.position - self.target;
        let rotation = Quat::from_axis_angle(self.up.normalize_or_zero(), yaw);
        self.position = self.target + rotation * offset;
    }

    /// Scales the eye distance to the target; factors below one move closer.
    pub fn zoom(&mut self, factor: f32) {
        let offset = (self.position - self.target) * factor.max(0.01);
        if offset.length() > NEAR_PLANE {
            self.position = self.target + offset;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            self.aspect,
            NEAR_PLANE,
            FAR_PLANE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_tracks_every_mutation() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(3.0, 2.0, -4.0));
        assert_eq!(
            camera.view_matrix(),
            Mat4::look_at_rh(Vec3::new(3.0, 2.0, -4.0), Vec3::ZERO, Vec3::Y)
        );
        camera.set_target(Vec3::new(1.0, 0.0, 1.0));
        camera.orbit(0.7);
        assert_eq!(
            camera.view_matrix(),
            Mat4::look_at_rh(camera.position, camera.target, camera.up)
        );
    }

    #[test]
    fn default_camera_over_800x600_viewport() {
        let mut camera = Camera::default();
        camera.set_aspect(800, 600);
        assert!((camera.aspect() - 800.0 / 600.0).abs() < f32::EPSILON);

        let expected = Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, 0.1, 1000.0);
        assert_eq!(camera.projection_matrix(), expected);

        // The right axis stays horizontal, so the view carries no roll.
        let view = camera.view_matrix();
        assert!(view.row(0).y.abs() < 1e-6);
        assert!(view.row(1).y > 0.0);
    }

    #[test]
    fn zero_height_viewport_does_not_divide_by_zero() {
        let mut camera = Camera::default();
        camera.set_aspect(640, 0);
        assert_eq!(camera.aspect(), 640.0);
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut camera = Camera::default();
        let before = camera.position.distance(camera.target);
        camera.orbit(std::f32::consts::FRAC_PI_2);
        assert!((camera.position.distance(camera.target) - before).abs() < 1e-4);
    }

    #[test]
    fn zoom_moves_towards_target() {
        let mut camera = Camera::default();
        let before = camera.position.distance(camera.target);
        camera.zoom(0.5);
        assert!((camera.position.distance(camera.target) - before * 0.5).abs() < 1e-4);
    }
}
