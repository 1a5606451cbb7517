//! Core types: math re-exports, cameras.

pub use glam::{Mat4, Vec3, vec3};

pub mod camera;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_pv_is_finite() {
        let cam = camera::Camera::new_perspective(
            vec3(0.0, 0.0, 4.0),
            vec3(0.0, 0.0, 0.0),
            Vec3::Y,
            60f32.to_radians(),
            0.1,
            100.0,
            16.0 / 9.0,
        );
        let pv = cam.proj_view();
        let a = pv.to_cols_array();
        assert!(a.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn orbit_pitch_stays_clamped() {
        let mut orbit = camera::OrbitCamera::default();
        orbit.orbit(0.0, 10_000.0);
        assert!(orbit.pitch <= 89f32.to_radians() + 1e-6);
        orbit.orbit(0.0, -20_000.0);
        assert!(orbit.pitch >= -(89f32.to_radians()) - 1e-6);
    }

    #[test]
    fn dolly_respects_distance_limits() {
        let mut orbit = camera::OrbitCamera::default();
        orbit.dolly(1_000.0);
        assert!((orbit.distance - orbit.min_distance).abs() < 1e-6);
        orbit.dolly(-10_000.0);
        assert!((orbit.distance - orbit.max_distance).abs() < 1e-6);
    }

    #[test]
    fn eye_sits_at_orbit_distance_from_target() {
        let orbit = camera::OrbitCamera::default();
        let eye = orbit.eye();
        assert!((eye.distance(orbit.target) - orbit.distance).abs() < 1e-4);
    }
}
