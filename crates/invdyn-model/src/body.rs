//! Rigid body definition.

use invdyn_math::{Mat3, Quat, Vec3};
use std::fmt;

/// Index of a body in a [`Model`](crate::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// Mass properties and pose the solver reads from a body.
///
/// Inertia quantities are about the center of mass, expressed in world
/// frame. A body with zero inverse mass is kinematic (static): it absorbs
/// any force without accelerating.
pub trait Body: Send + fmt::Debug {
    /// Mass (zero or infinite for a kinematic body).
    fn mass(&self) -> f64;
    /// Inverse mass (zero for a kinematic body).
    fn inv_mass(&self) -> f64;
    /// World-frame rotational inertia about the center of mass.
    fn inertia_matrix(&self) -> Mat3;
    /// Inverse of [`Body::inertia_matrix`] (zero for a kinematic body).
    fn inv_world_inertia(&self) -> Mat3;
    /// Rotate a body-local vector into world frame.
    fn rotate_vector(&self, v: &Vec3) -> Vec3;
    /// Rotate a world vector into body-local frame.
    fn unrotate_vector(&self, v: &Vec3) -> Vec3;
    /// World position of the center of mass.
    fn position(&self) -> Vec3;

    /// Whether the body is kinematic (zero inverse mass).
    fn is_kinematic(&self) -> bool {
        self.inv_mass() == 0.0
    }
}

/// A rigid body with a diagonal principal inertia.
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// Name of the body (optional, for debugging).
    pub name: String,
    /// World position of the center of mass.
    pub position: Vec3,
    /// World orientation of the principal axes.
    pub rotation: Quat,
    mass: f64,
    inv_mass: f64,
    principal_inertia: Vec3,
}

impl RigidBody {
    /// Create a dynamic body with the given mass and principal moments.
    pub fn new(name: &str, mass: f64, principal_inertia: Vec3) -> Self {
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        Self {
            name: name.to_string(),
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            mass,
            inv_mass,
            principal_inertia,
        }
    }

    /// Create a kinematic body that never accelerates.
    pub fn fixed(name: &str) -> Self {
        Self::new(name, 0.0, Vec3::zeros())
    }

    /// Uniform sphere.
    pub fn sphere(name: &str, mass: f64, radius: f64) -> Self {
        let i = 2.0 / 5.0 * mass * radius * radius;
        Self::new(name, mass, Vec3::new(i, i, i))
    }

    /// Uniform thin rod of the given length along the local X axis.
    pub fn rod(name: &str, mass: f64, length: f64) -> Self {
        let i = mass * length * length / 12.0;
        Self::new(name, mass, Vec3::new(1e-6 * i, i, i))
    }

    /// Set the world position of the center of mass.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set the world orientation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    /// Principal moments of inertia in the body frame.
    pub fn principal_inertia(&self) -> Vec3 {
        self.principal_inertia
    }

    fn world_from_principal(&self, diag: Vec3) -> Mat3 {
        let r = self.rotation.to_matrix();
        r * Mat3::from_diagonal(&diag) * r.transpose()
    }
}

impl Body for RigidBody {
    fn mass(&self) -> f64 {
        self.mass
    }

    fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    fn inertia_matrix(&self) -> Mat3 {
        if self.inv_mass == 0.0 {
            return Mat3::zeros();
        }
        self.world_from_principal(self.principal_inertia)
    }

    fn inv_world_inertia(&self) -> Mat3 {
        if self.inv_mass == 0.0 {
            return Mat3::zeros();
        }
        let inv = self
            .principal_inertia
            .map(|i| if i > 0.0 { 1.0 / i } else { 0.0 });
        self.world_from_principal(inv)
    }

    fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.rotate(v)
    }

    fn unrotate_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.unrotate(v)
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}
