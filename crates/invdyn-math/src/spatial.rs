//! 6D spatial algebra for constraint rows and body mass blocks.
//!
//! Convention: spatial vectors are `[linear; angular]`.
//! A Jacobian row side: `[∂/∂v; ∂/∂ω]`
//! A body force: `[f; τ]`
//!
//! This is the reverse of Featherstone's `[angular; linear]` order. Row
//! Jacobians are produced linear-first by joints, so the mass blocks follow.

use crate::{Mat3, Mat6, Vec3, Vec6};

/// 6D spatial vector: a Jacobian side, a body acceleration or a body force.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialVec {
    /// The underlying 6D vector [linear(3); angular(3)].
    pub data: Vec6,
}

impl SpatialVec {
    /// Create from linear and angular parts.
    #[inline]
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self {
            data: Vec6::new(
                linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
            ),
        }
    }

    /// Zero spatial vector.
    #[inline]
    pub fn zero() -> Self {
        Self {
            data: Vec6::zeros(),
        }
    }

    /// Linear (top 3) component.
    #[inline]
    pub fn linear(&self) -> Vec3 {
        Vec3::new(self.data[0], self.data[1], self.data[2])
    }

    /// Angular (bottom 3) component.
    #[inline]
    pub fn angular(&self) -> Vec3 {
        Vec3::new(self.data[3], self.data[4], self.data[5])
    }

    /// Dot product of two spatial vectors.
    #[inline]
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.data.dot(&other.data)
    }

    /// Scale the linear part by `inv_mass` and the angular part by `inv_inertia`.
    ///
    /// This is `M⁻¹ · self` for a rigid body whose spatial mass is block
    /// diagonal about its center of mass.
    #[inline]
    pub fn scale_by_inverse_mass(&self, inv_mass: f64, inv_inertia: &Mat3) -> SpatialVec {
        SpatialVec::new(self.linear() * inv_mass, inv_inertia * self.angular())
    }
}

/// 6x6 spatial matrix (body mass blocks and their inverses).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMat {
    pub data: Mat6,
}

impl SpatialMat {
    /// Zero matrix.
    #[inline]
    pub fn zero() -> Self {
        Self {
            data: Mat6::zeros(),
        }
    }

    /// Spatial mass of a rigid body about its center of mass.
    ///
    /// M = | mE   0 |
    ///     | 0    I |
    ///
    /// with `I` the world-frame rotational inertia.
    pub fn rigid_body(mass: f64, inertia: &Mat3) -> Self {
        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Mat3::identity() * mass));
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(inertia);
        Self { data: m }
    }

    /// Subtract the rank-one product `a · bᵀ`.
    #[inline]
    pub fn sub_outer(&mut self, a: &Vec6, b: &Vec6) {
        self.data -= a * b.transpose();
    }

    /// Inverse, falling back to the Moore-Penrose pseudo-inverse when the
    /// matrix is singular. Returns zero if neither exists.
    pub fn generalized_inverse(&self) -> SpatialMat {
        if let Some(inv) = self.data.try_inverse() {
            return SpatialMat { data: inv };
        }
        let data = self.data.pseudo_inverse(1e-12).unwrap_or_else(|_| Mat6::zeros());
        SpatialMat { data }
    }
}
