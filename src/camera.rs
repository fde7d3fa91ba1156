//! Camera presets producing the per-frame view-projection matrix.

use glam::{Mat4, Vec3};

use crate::params::{CameraPreset, FixedCamera, OrbitCamera, RenderConfig};

/// Camera system with preset-based positioning
pub struct CameraSystem {
    preset: CameraPreset,
}

impl CameraSystem {
    /// Create new camera system with specified preset
    pub fn new(preset: CameraPreset) -> Self {
        Self { preset }
    }

    /// Compute camera position and look-at target for given time
    pub fn compute_position_and_target(&self, time_s: f32) -> (Vec3, Vec3) {
        match &self.preset {
            CameraPreset::Fixed(params) => Self::compute_fixed(params),
            CameraPreset::Orbit(params) => Self::compute_orbit(params, time_s),
        }
    }

    /// Fixed camera: stationary view of the cloud
    fn compute_fixed(p: &FixedCamera) -> (Vec3, Vec3) {
        (Vec3::from_array(p.position), Vec3::from_array(p.target))
    }

    /// Orbit camera: constant-radius circle around the origin
    fn compute_orbit(p: &OrbitCamera, time_s: f32) -> (Vec3, Vec3) {
        let angle = time_s * p.angular_speed_rad_per_s;
        let eye = Vec3::new(angle.cos() * p.radius_m, p.height_m, angle.sin() * p.radius_m);
        (eye, Vec3::ZERO)
    }

    /// Create view-projection matrix for rendering
    ///
    /// # Returns
    /// Tuple of (view_proj_matrix, camera_position)
    pub fn create_view_proj_matrix(
        &self,
        time_s: f32,
        render_config: &RenderConfig,
    ) -> (Mat4, Vec3) {
        let (eye, target) = self.compute_position_and_target(time_s);

        // Always keep Y as up vector (camera never rolls)
        let up = Vec3::Y;

        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh(
            render_config.fov_degrees.to_radians(),
            render_config.aspect_ratio(),
            render_config.near_plane_m,
            render_config.far_plane_m,
        );

        (proj * view, eye)
    }

    /// Camera-space right and up axes (world space), for billboarding
    pub fn billboard_axes(&self, time_s: f32) -> (Vec3, Vec3) {
        let (eye, target) = self.compute_position_and_target(time_s);
        let forward = (target - eye).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        (right, up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_camera_is_stationary() {
        let camera = CameraSystem::new(CameraPreset::default());
        let (eye0, target0) = camera.compute_position_and_target(0.0);
        let (eye1, target1) = camera.compute_position_and_target(100.0);
        assert_eq!(eye0, eye1);
        assert_eq!(target0, target1);
    }

    #[test]
    fn test_orbit_camera_keeps_constant_radius() {
        let params = OrbitCamera::default();
        let camera = CameraSystem::new(CameraPreset::Orbit(params.clone()));

        for t in 0..100 {
            let (eye, target) = camera.compute_position_and_target(t as f32 * 0.37);
            let xz_radius = (eye.x * eye.x + eye.z * eye.z).sqrt();
            assert!(
                (xz_radius - params.radius_m).abs() < 1e-2,
                "radius {} drifted at t={}",
                xz_radius,
                t
            );
            assert_eq!(eye.y, params.height_m);
            assert_eq!(target, Vec3::ZERO);
        }
    }

    #[test]
    fn test_view_proj_matrix_generation() {
        let camera = CameraSystem::new(CameraPreset::default());
        let render_config = RenderConfig::default();

        let (view_proj, eye_pos) = camera.create_view_proj_matrix(0.0, &render_config);

        // Matrix should not be identity or zero
        assert_ne!(view_proj, Mat4::IDENTITY);
        assert_ne!(view_proj, Mat4::ZERO);

        // Eye position should be valid (not NaN or infinite)
        assert!(eye_pos.x.is_finite());
        assert!(eye_pos.y.is_finite());
        assert!(eye_pos.z.is_finite());
    }

    #[test]
    fn test_billboard_axes_are_orthonormal() {
        let camera = CameraSystem::new(CameraPreset::Orbit(OrbitCamera::default()));
        let (right, up) = camera.billboard_axes(3.2);

        assert!((right.length() - 1.0).abs() < 1e-4);
        assert!((up.length() - 1.0).abs() < 1e-4);
        assert!(right.dot(up).abs() < 1e-4);
    }
}
