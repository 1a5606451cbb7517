use crate::{Mat4, Vec3};

/// Simple perspective camera (right-handed, depth in [0,1] per glam).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    #[allow(clippy::too_many_arguments)]
    pub fn new_perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_rad: f32,
        z_near: f32,
        z_far: f32,
        aspect: f32,
    ) -> Self {
        Self {
            eye,
            target,
            up,
            fov_y_rad,
            z_near,
            z_far,
            aspect,
        }
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }
}

/// Orbit rig: the camera circles `target` at `distance`, oriented by yaw/pitch.
/// Pitch is clamped short of the poles to avoid the look-at flip.
#[derive(Clone, Copy, Debug)]
pub struct OrbitCamera {
    /// Horizontal angle in radians.
    pub yaw: f32,
    /// Vertical angle in radians, clamped to ±`PITCH_LIMIT`.
    pub pitch: f32,
    pub distance: f32,
    pub target: Vec3,

    pub min_distance: f32,
    pub max_distance: f32,
    pub orbit_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
}

impl OrbitCamera {
    pub const PITCH_LIMIT: f32 = 89.0 * (std::f32::consts::PI / 180.0);

    /// Rotate around the target by a mouse delta in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.orbit_speed;
        self.pitch = (self.pitch + dy * self.orbit_speed)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Translate the target in the camera's right/up plane, scaled by
    /// distance so panning feels consistent at any zoom.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let forward = self.forward();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        let offset = right * (dx * self.pan_speed) + up * (dy * self.pan_speed);
        self.target += offset * self.distance * 0.2;
    }

    /// Move along the view axis; positive `scroll` zooms in.
    pub fn dolly(&mut self, scroll: f32) {
        self.distance =
            (self.distance - scroll * self.zoom_speed).clamp(self.min_distance, self.max_distance);
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        let (cy, sy) = (self.yaw.cos(), self.yaw.sin());
        let (cp, sp) = (self.pitch.cos(), self.pitch.sin());
        Vec3::new(cp * cy, sp, cp * sy).normalize_or_zero()
    }

    /// Spherical -> cartesian eye position relative to the target.
    #[inline]
    pub fn eye(&self) -> Vec3 {
        self.target + self.forward() * self.distance
    }

    /// Perspective camera for this rig at the given aspect ratio.
    pub fn camera(&self, aspect: f32) -> Camera {
        Camera::new_perspective(
            self.eye(),
            self.target,
            Vec3::Y,
            45f32.to_radians(),
            0.01,
            1000.0,
            aspect,
        )
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: (-45f32).to_radians(),
            pitch: 25f32.to_radians(),
            distance: 6.0,
            target: Vec3::ZERO,
            min_distance: 0.5,
            max_distance: 100.0,
            orbit_speed: 0.005,
            pan_speed: 0.005,
            zoom_speed: 0.6,
        }
    }
}
