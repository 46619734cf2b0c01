//! Body orientation as a unit quaternion `w + (x, y, z)`.
//!
//! Only what rotating Jacobian anchors and inertia tensors into the world
//! frame needs.

use crate::{Mat3, Vec3};

/// World orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub w: f64,
    pub v: Vec3,
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, v: Vec3::new(x, y, z) }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle` radians about the unit vector `axis`.
    pub fn from_axis_angle(axis: &Vec3, angle: f64) -> Self {
        let (s, c) = (0.5 * angle).sin_cos();
        Self { w: c, v: axis * s }
    }

    /// Unit-length copy. A degenerate quaternion maps to the identity.
    pub fn normalize(&self) -> Self {
        let len = self.w.hypot(self.v.norm());
        if len < 1e-12 {
            Self::identity()
        } else {
            Self { w: self.w / len, v: self.v / len }
        }
    }

    /// Body-frame vector expressed in the world frame.
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        let t = 2.0 * self.v.cross(v);
        v + self.w * t + self.v.cross(&t)
    }

    /// World-frame vector expressed in the body frame.
    pub fn unrotate(&self, v: &Vec3) -> Vec3 {
        let t = 2.0 * self.v.cross(v);
        v - self.w * t + self.v.cross(&t)
    }

    /// Rotation matrix whose columns are the rotated body axes.
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::from_columns(&[
            self.rotate(&Vec3::x()),
            self.rotate(&Vec3::y()),
            self.rotate(&Vec3::z()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_normalize_degenerate_is_identity() {
        assert_eq!(Quat::new(0.0, 0.0, 0.0, 0.0).normalize(), Quat::identity());
        let q = Quat::new(2.0, 0.0, 0.0, 0.0).normalize();
        assert_relative_eq!(q.w, 1.0);
    }

    #[test]
    fn test_unrotate_inverts_rotate() {
        let axis = Vec3::new(1.0, 2.0, 3.0).normalize();
        let q = Quat::from_axis_angle(&axis, 0.7);
        let v = Vec3::new(0.3, -1.0, 2.5);
        assert_relative_eq!(q.unrotate(&q.rotate(&v)), v, epsilon = 1e-12);
        assert_relative_eq!(q.to_matrix().transpose() * v, q.unrotate(&v), epsilon = 1e-12);
    }

    #[test]
    fn test_quarter_turn_swaps_principal_moments() {
        // World inertia R·diag·Rᵀ of a body turned 90° about z.
        let r = Quat::from_axis_angle(&Vec3::z(), FRAC_PI_2).to_matrix();
        let world = r * Mat3::from_diagonal(&Vec3::new(1.0, 4.0, 9.0)) * r.transpose();
        assert_relative_eq!(world, Mat3::from_diagonal(&Vec3::new(4.0, 1.0, 9.0)), epsilon = 1e-12);
    }

    #[test]
    fn test_world_inertia_is_symmetric() {
        let axis = Vec3::new(0.2, -1.0, 0.5).normalize();
        let r = Quat::from_axis_angle(&axis, 1.1).to_matrix();
        let world = r * Mat3::from_diagonal(&Vec3::new(0.5, 2.0, 3.0)) * r.transpose();
        assert_relative_eq!(world, world.transpose(), epsilon = 1e-12);
        assert_relative_eq!(world.trace(), 5.5, epsilon = 1e-12);
    }
}
