use glam::{Mat4, Vec3};

const DEFAULT_UP: Vec3 = Vec3::Z;

/// What model drawing needs from the active camera.
pub trait CameraView {
    fn view(&self) -> Mat4;
    fn projection(&self) -> Mat4;
    fn eye_position(&self) -> Vec3;

    fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// Perspective camera looking at a target. World space is Z-up.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, aspect: 16.0 / 9.0, near, far }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.aspect = if height > 0 { width as f32 / height as f32 } else { 1.0 };
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, self.aspect.max(0.0001), self.near, self.far)
    }
}

impl CameraView for Camera3D {
    fn view(&self) -> Mat4 {
        self.view_matrix()
    }

    fn projection(&self) -> Mat4 {
        self.projection_matrix()
    }

    fn eye_position(&self) -> Vec3 {
        self.position
    }
}

impl Default for Camera3D {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -600.0, 400.0), Vec3::ZERO, 35.0_f32.to_radians(), 10.0, 5000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera3d_view_projection_is_finite() {
        let camera = Camera3D::new(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, 60.0_f32.to_radians(), 0.1, 1000.0)
            .with_viewport(1280, 720);
        let vp = camera.view_projection();
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn zero_height_viewport_falls_back_to_square() {
        let camera = Camera3D::default().with_viewport(800, 0);
        assert_eq!(camera.aspect, 1.0);
    }
}
