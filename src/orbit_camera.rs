use std::f32::consts::FRAC_PI_2;

use glam::Vec3;
use winit::event::MouseButton;

use crate::camera::Camera;
use crate::input::Input;

const ELEVATION_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Orbit controls around a target point.
///
/// Left-drag rotates, the scroll wheel zooms. Every demo starts from a
/// framing chosen for its scene (see [`OrbitCamera::framing`]).
///
/// ```ignore
/// let mut orbit = OrbitCamera::new().target(Vec3::ZERO).distance(5.0);
///
/// // In frame loop:
/// orbit.update(&input);
/// camera = orbit.camera();
/// ```
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    /// Point the camera orbits around.
    pub target: Vec3,
    /// Distance from target.
    pub distance: f32,
    /// Horizontal angle in radians (yaw).
    pub azimuth: f32,
    /// Vertical angle in radians (pitch), clamped short of the poles.
    pub elevation: f32,
    /// Field of view in radians.
    pub fov: f32,
    /// Radians of rotation per pixel of mouse drag.
    pub sensitivity: f32,
    /// Fraction of the current distance zoomed per scroll line.
    pub zoom_step: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 5.0,
            azimuth: 0.0,
            elevation: 0.0,
            fov: 75f32.to_radians(),
            sensitivity: 0.005,
            zoom_step: 0.1,
            min_distance: 0.5,
            max_distance: 400.0,
        }
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera placed so that a sphere of `radius` around the origin fits the view.
    pub fn framing(radius: f32, elevation: f32) -> Self {
        let camera = Self::new();
        let distance = radius / (camera.fov * 0.5).sin();
        camera.distance(distance).elevation(elevation)
    }

    /// Set the target point to orbit around.
    pub fn target(mut self, target: impl Into<Vec3>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the distance from target.
    pub fn distance(mut self, distance: f32) -> Self {
        self.distance = distance.clamp(self.min_distance, self.max_distance);
        self
    }

    /// Set the initial elevation (vertical angle) in radians.
    pub fn elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation.clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        self
    }

    /// Apply this frame's mouse drag and scroll.
    pub fn update(&mut self, input: &Input) {
        if input.mouse_down(MouseButton::Left) {
            let delta = input.mouse_delta();
            self.azimuth -= delta.x * self.sensitivity;
            self.elevation =
                (self.elevation + delta.y * self.sensitivity).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        }

        let scroll = input.scroll_delta().y;
        if scroll != 0.0 {
            self.distance = (self.distance * (1.0 - scroll * self.zoom_step))
                .clamp(self.min_distance, self.max_distance);
        }
    }

    /// Get the current camera state.
    pub fn camera(&self) -> Camera {
        // Spherical to Cartesian conversion
        let offset = Vec3::new(
            self.distance * self.elevation.cos() * self.azimuth.sin(),
            self.distance * self.elevation.sin(),
            self.distance * self.elevation.cos() * self.azimuth.cos(),
        );

        let position = self.target + offset;

        Camera {
            position,
            forward: (self.target - position).normalize_or(Vec3::NEG_Z),
            up: Vec3::Y,
            fov: self.fov,
            ..Camera::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_looks_at_target() {
        let orbit = OrbitCamera::new()
            .target(Vec3::new(1.0, 2.0, 3.0))
            .distance(10.0)
            .elevation(0.4);
        let camera = orbit.camera();

        assert!((camera.position.distance(orbit.target) - 10.0).abs() < 1e-4);
        let to_target = (orbit.target - camera.position).normalize();
        assert!(to_target.dot(camera.forward) > 0.9999);
    }

    #[test]
    fn elevation_is_clamped() {
        let orbit = OrbitCamera::new().elevation(10.0);
        assert!(orbit.elevation < FRAC_PI_2);
    }

    #[test]
    fn framing_grows_with_radius() {
        let near = OrbitCamera::framing(1.0, 0.3);
        let far = OrbitCamera::framing(10.0, 0.3);
        assert!(far.distance > near.distance);
    }
}
