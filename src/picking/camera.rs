//! Orbit camera with a perspective projection onto view pixels.

use egui::Pos2;
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Vector3};

use crate::config::PickingConfig;

/// Camera orbiting `focus` at `distance`, looking at it from yaw/pitch angles
/// (degrees). Window coordinates have their origin at the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub focus: Point3<f64>,
    pub distance: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    /// World axis drawn pointing up (Y for Y-up data, Z for Z-up data).
    pub up: Vector3<f64>,
    pub fov_y_deg: f64,
    pub near: f64,
    pub far: f64,
    /// Viewport size in pixels.
    pub viewport: [u32; 2],
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&PickingConfig::default(), [800, 600])
    }
}

impl Camera {
    pub fn from_config(cfg: &PickingConfig, viewport: [u32; 2]) -> Self {
        Self {
            focus: Point3::origin(),
            distance: 5.0,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            up: Vector3::y(),
            fov_y_deg: cfg.fov_y_deg,
            near: cfg.near,
            far: cfg.far,
            viewport,
        }
    }

    pub fn eye(&self) -> Point3<f64> {
        let (sy, cy) = self.yaw_deg.to_radians().sin_cos();
        let (sp, cp) = self.pitch_deg.to_radians().sin_cos();
        // Orbit in a frame where `up` replaces +Y.
        let rot = nalgebra::Rotation3::rotation_between(&Vector3::y(), &self.up).unwrap_or_else(nalgebra::Rotation3::identity);
        self.focus + rot * Vector3::new(self.distance * cp * sy, self.distance * sp, self.distance * cp * cy)
    }

    fn aspect(&self) -> f64 {
        let [w, h] = self.viewport;
        if h == 0 {
            1.0
        } else {
            w as f64 / h as f64
        }
    }

    pub fn view_projection(&self) -> Matrix4<f64> {
        let proj = Perspective3::new(self.aspect(), self.fov_y_deg.to_radians(), self.near, self.far);
        let view = Isometry3::look_at_rh(&self.eye(), &self.focus, &self.up);
        proj.as_matrix() * view.to_homogeneous()
    }

    /// Window position and depth in `[0, 1]` of `p`, or `None` when it lies
    /// outside the view frustum's depth range or behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<(Pos2, f32)> {
        let clip = self.view_projection() * p.to_homogeneous();
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        if !(-1.0..=1.0).contains(&ndc.z) {
            return None;
        }
        let [w, h] = self.viewport;
        let x = (ndc.x + 1.0) * 0.5 * w as f64;
        let y = (1.0 - ndc.y) * 0.5 * h as f64;
        Some((Pos2::new(x as f32, y as f32), ((ndc.z + 1.0) * 0.5) as f32))
    }
}
