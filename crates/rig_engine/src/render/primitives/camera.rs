//! # 3D Camera System
//!
//! Perspective camera plus damped orbit controls.
//!
//! ## Design Principles
//! - **Backend-agnostic**: only produces matrices
//! - **Deterministic placement**: `reset` and `fit` depend only on their inputs
//! - **Damping**: control input accumulates and is applied a fraction per frame

use crate::foundation::math::{utils, Aabb, Mat4, Point3, Quat, Unit, Vec3};

/// Perspective camera
///
/// Uses a right-handed Y-up coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a new perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Update camera target (look-at point)
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
    }

    /// Set target and up vector together
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
    }

    /// Update aspect ratio for viewport changes
    ///
    /// Zero-height viewports keep the previous ratio.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        if (self.aspect - aspect).abs() > 0.01 {
            log::info!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Distance from the camera to its target
    pub fn distance(&self) -> f32 {
        (self.position - self.target).norm()
    }

    /// Unit vector from the camera towards its target
    pub fn forward(&self) -> Vec3 {
        let dir = self.target - self.position;
        if dir.norm_squared() > f32::EPSILON {
            dir.normalize()
        } else {
            -Vec3::z()
        }
    }

    /// World-to-camera matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        )
    }

    /// Perspective projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// Combined `P × V`
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Move the camera back along its current view direction until `bounds`
    /// fits in the vertical field of view
    pub fn fit_bounds(&mut self, bounds: &Aabb) {
        let center = bounds.center();
        let radius = (bounds.size().norm() * 0.5).max(1e-3);
        let distance = radius / (self.fov * 0.5).sin();
        let direction = -self.forward();

        self.target = center;
        self.position = center + direction * distance;
        self.near = (distance - radius * 2.0).max(0.01);
        self.far = (distance + radius * 4.0).max(self.near + 1.0);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(30.0, 25.0, 30.0), 45.0, 4.0 / 3.0, 0.1, 1000.0)
    }
}

/// Damped orbit controls around a target point.
///
/// Input calls accumulate deltas; `update` applies `damping_factor` of what
/// is pending each frame and keeps the rest for later frames.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    damping_factor: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    pending_zoom: f32,
    pending_pan: Vec3,
    enabled: bool,
}

/// Pending motion below this is dropped
const SETTLE_EPSILON: f32 = 1e-5;

impl OrbitControls {
    /// Controls with the given damping factor in `(0, 1]`
    pub fn new(damping_factor: f32) -> Self {
        Self {
            damping_factor: damping_factor.clamp(f32::EPSILON, 1.0),
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
            pending_pan: Vec3::zeros(),
            enabled: true,
        }
    }

    /// Queue a rotation around the world up axis and the camera right axis (radians)
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        if self.enabled {
            self.pending_yaw += yaw;
            self.pending_pitch += pitch;
        }
    }

    /// Queue a dolly; positive values move closer (fraction of the distance)
    pub fn zoom(&mut self, amount: f32) {
        if self.enabled {
            self.pending_zoom += amount;
        }
    }

    /// Queue a world-space translation of camera and target
    pub fn pan(&mut self, delta: Vec3) {
        if self.enabled {
            self.pending_pan += delta;
        }
    }

    /// Enable or disable input
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }

    /// Drop all pending motion
    pub fn stop(&mut self) {
        self.pending_yaw = 0.0;
        self.pending_pitch = 0.0;
        self.pending_zoom = 0.0;
        self.pending_pan = Vec3::zeros();
    }

    /// Whether motion is still being applied
    pub fn is_moving(&self) -> bool {
        self.pending_yaw.abs() > SETTLE_EPSILON
            || self.pending_pitch.abs() > SETTLE_EPSILON
            || self.pending_zoom.abs() > SETTLE_EPSILON
            || self.pending_pan.norm() > SETTLE_EPSILON
    }

    /// Apply one frame of damped motion, returning whether the camera moved
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        if !self.is_moving() {
            self.stop();
            return false;
        }
        let k = self.damping_factor;
        let (yaw, pitch, zoom, pan) = (
            self.pending_yaw * k,
            self.pending_pitch * k,
            self.pending_zoom * k,
            self.pending_pan * k,
        );
        self.pending_yaw -= yaw;
        self.pending_pitch -= pitch;
        self.pending_zoom -= zoom;
        self.pending_pan -= pan;

        let mut offset = camera.position - camera.target;
        if offset.norm_squared() < 1e-9 {
            offset = Vec3::z();
        }

        offset = Quat::from_axis_angle(&Vec3::y_axis(), yaw) * offset;

        let right = offset.cross(&Vec3::y());
        if let Some(axis) = Unit::try_new(right, 1e-6) {
            let candidate = Quat::from_axis_angle(&axis, pitch) * offset;
            // Stay off the poles
            if candidate.normalize().dot(&Vec3::y()).abs() < 0.995 {
                offset = candidate;
            }
        }

        let distance = (offset.norm() * (1.0 - zoom)).max(0.1);
        offset = offset.normalize() * distance;

        camera.target += pan;
        camera.position = camera.target + offset;
        true
    }
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_matrix_moves_target_in_front() {
        let camera = Camera::default();
        let target_in_view = camera.view_matrix().transform_point(&Point3::origin());
        // Right-handed view space looks down -Z
        assert!(target_in_view.z < 0.0);
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_fit_bounds_centers_target() {
        let mut camera = Camera::default();
        let bounds = Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(3.0, 2.0, 1.0));
        camera.fit_bounds(&bounds);

        assert_relative_eq!(camera.target, Vec3::new(1.0, 1.0, 0.0));
        assert!(camera.distance() > bounds.size().norm() * 0.5);
        assert!(camera.near < camera.distance());
    }

    #[test]
    fn test_damping_converges_to_full_rotation() {
        let mut camera = Camera::default();
        let start_distance = camera.distance();
        let mut controls = OrbitControls::new(0.5);
        controls.rotate(0.4, 0.0);

        let mut frames = 0;
        while controls.update(&mut camera) {
            frames += 1;
            assert!(frames < 100, "damping never settled");
        }
        assert!(frames > 1);
        assert_relative_eq!(camera.distance(), start_distance, epsilon = 1e-3);
        assert!(!controls.is_moving());
    }

    #[test]
    fn test_disabled_controls_ignore_input() {
        let mut camera = Camera::default();
        let before = camera.clone();
        let mut controls = OrbitControls::default();
        controls.set_enabled(false);
        controls.zoom(0.5);
        assert!(!controls.update(&mut camera));
        assert_eq!(camera, before);
    }
}
