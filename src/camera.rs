use glam::{Mat4, Vec3};

use crate::render::CameraParams;

const MIN_PITCH: f32 = -1.5;
const MAX_PITCH: f32 = 1.5;
const MIN_DISTANCE: f32 = 1.0;
const MAX_DISTANCE: f32 = 40.0;
const DAMPING: f32 = 8.0;

/// Damped orbit camera circling a fixed target.
///
/// Dragging adjusts the goal yaw/pitch and scrolling the goal distance;
/// [`OrbitCamera::update`] eases the live orientation toward those goals
/// each frame so motion keeps gliding briefly after the input stops.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    target: Vec3,
    yaw: f32,
    pitch: f32,
    distance: f32,
    goal_yaw: f32,
    goal_pitch: f32,
    goal_distance: f32,
    fov_degrees: f32,
}

impl OrbitCamera {
    /// Creates a camera at `position` orbiting `target`.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let distance = offset.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let yaw = offset.x.atan2(offset.z);
        let pitch = if distance > f32::EPSILON {
            (offset.y / distance).clamp(-1.0, 1.0).asin()
        } else {
            0.0
        };
        Self {
            target,
            yaw,
            pitch,
            distance,
            goal_yaw: yaw,
            goal_pitch: pitch,
            goal_distance: distance,
            fov_degrees: 45.0,
        }
    }

    /// Applies a drag delta in radians.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.goal_yaw -= delta_yaw;
        self.goal_pitch = (self.goal_pitch + delta_pitch).clamp(MIN_PITCH, MAX_PITCH);
    }

    /// Moves the camera toward (positive) or away from the target.
    pub fn dolly(&mut self, amount: f32) {
        self.goal_distance = (self.goal_distance - amount).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Eases the live orientation toward the input goals.
    pub fn update(&mut self, dt: f32) {
        let blend = 1.0 - (-DAMPING * dt.max(0.0)).exp();
        self.yaw += (self.goal_yaw - self.yaw) * blend;
        self.pitch += (self.goal_pitch - self.pitch) * blend;
        self.distance += (self.goal_distance - self.distance) * blend;
    }

    pub fn position(&self) -> Vec3 {
        let direction = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        );
        self.target + direction * self.distance
    }

    /// View and projection state for the renderer's uniform buffer.
    pub fn params(&self, aspect: f32) -> CameraParams {
        let view = Mat4::look_at_rh(self.position(), self.target, Vec3::Y);
        let projection = Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            aspect.max(0.01),
            0.1,
            100.0,
        );
        CameraParams {
            view_proj: projection * view,
            view,
            fov_y: self.fov_degrees.to_radians(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_round_trips() {
        let camera = OrbitCamera::new(Vec3::new(-4.0, 2.0, -4.0), Vec3::ZERO);
        assert!((camera.position() - Vec3::new(-4.0, 2.0, -4.0)).length() < 1e-4);
    }

    #[test]
    fn damping_converges_to_the_goal() {
        let mut camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        camera.rotate(0.5, 0.2);
        for _ in 0..240 {
            camera.update(1.0 / 60.0);
        }
        assert!((camera.yaw - camera.goal_yaw).abs() < 1e-3);
        assert!((camera.pitch - camera.goal_pitch).abs() < 1e-3);
    }

    #[test]
    fn a_single_step_only_moves_partway() {
        let mut camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        camera.rotate(1.0, 0.0);
        camera.update(1.0 / 60.0);
        let remaining = (camera.goal_yaw - camera.yaw).abs();
        assert!(remaining > 0.1, "damping jumped straight to the goal");
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        camera.rotate(0.0, 10.0);
        assert!(camera.goal_pitch <= MAX_PITCH);
        camera.rotate(0.0, -20.0);
        assert!(camera.goal_pitch >= MIN_PITCH);
    }

    #[test]
    fn dolly_is_clamped() {
        let mut camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        camera.dolly(100.0);
        assert_eq!(camera.goal_distance, MIN_DISTANCE);
        camera.dolly(-500.0);
        assert_eq!(camera.goal_distance, MAX_DISTANCE);
    }

    #[test]
    fn params_transform_the_target_in_front_of_the_camera() {
        let camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        let params = camera.params(16.0 / 9.0);
        let clip = params.view_proj.project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }
}
