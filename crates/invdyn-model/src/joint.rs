//! Joint definitions.
//!
//! A joint couples two bodies and, once per step, states its constraint as a
//! set of rows (see [`crate::row`]). The skeleton solver never looks inside a
//! joint beyond this interface.

use crate::body::{Body, BodyId};
use crate::row::{ConstraintParams, Jacobian, JacobianPair, MAX_BOUND, RowDescriptor};
use invdyn_math::Vec3;
use std::fmt;

/// Index of a joint in a [`Model`](crate::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub usize);

/// Constraint between two bodies.
pub trait Joint: Send + fmt::Debug {
    /// Name of the joint (for debugging).
    fn name(&self) -> &str;

    /// The two bodies this joint connects, as `(body0, body1)`.
    ///
    /// Row Jacobians produced by [`Joint::jacobian_derivative`] use the same
    /// order: `JacobianPair::body0` acts on the first body.
    fn bodies(&self) -> (BodyId, BodyId);

    /// Add this joint's rows for the current step to `params`.
    fn jacobian_derivative(&mut self, params: &mut ConstraintParams, body0: &dyn Body, body1: &dyn Body);
}

/// Default position-error correction gain, as a fraction of the error
/// removed per step squared.
pub const DEFAULT_CORRECTION: f64 = 0.2;

/// Coincident points on two bodies, stored in each body's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    local0: Vec3,
    local1: Vec3,
}

impl Anchor {
    fn at_pivot(pivot: &Vec3, body0: &dyn Body, body1: &dyn Body) -> Self {
        Self {
            local0: body0.unrotate_vector(&(pivot - body0.position())),
            local1: body1.unrotate_vector(&(pivot - body1.position())),
        }
    }

    /// Three linear rows that keep the anchor points together.
    fn add_rows(&self, params: &mut ConstraintParams, body0: &dyn Body, body1: &dyn Body, correction: f64) {
        let r0 = body0.rotate_vector(&self.local0);
        let r1 = body1.rotate_vector(&self.local1);
        let error = (body0.position() + r0) - (body1.position() + r1);
        let gain = correction * params.inv_timestep * params.inv_timestep;

        for dir in [Vec3::x(), Vec3::y(), Vec3::z()] {
            let jacobian = JacobianPair::new(Jacobian::point(&dir, &r0), -Jacobian::point(&dir, &r1));
            if let Some(row) = params.add_row(jacobian) {
                row.penetration = -error.dot(&dir);
                row.penetration_stiffness = gain;
            }
        }
    }
}

/// Two unit vectors completing `axis` to an orthonormal basis.
pub fn perpendicular_basis(axis: &Vec3) -> (Vec3, Vec3) {
    let helper = if axis.x.abs() < 0.57 { Vec3::x() } else { Vec3::y() };
    let u = axis.cross(&helper).normalize();
    let v = axis.cross(&u);
    (u, v)
}

/// Spherical joint: the bodies share a point and rotate freely about it.
#[derive(Debug, Clone)]
pub struct BallJoint {
    name: String,
    bodies: (BodyId, BodyId),
    anchor: Anchor,
    /// Position-error correction gain.
    pub correction: f64,
}

impl BallJoint {
    /// Ball joint at world point `pivot`, using the bodies' current poses.
    pub fn at_pivot(
        name: &str,
        (id0, body0): (BodyId, &dyn Body),
        (id1, body1): (BodyId, &dyn Body),
        pivot: Vec3,
    ) -> Self {
        Self {
            name: name.to_string(),
            bodies: (id0, id1),
            anchor: Anchor::at_pivot(&pivot, body0, body1),
            correction: DEFAULT_CORRECTION,
        }
    }
}

impl Joint for BallJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian_derivative(&mut self, params: &mut ConstraintParams, body0: &dyn Body, body1: &dyn Body) {
        self.anchor.add_rows(params, body0, body1, self.correction);
    }
}

/// Drive on a hinge's free axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeMotor {
    /// Desired angular acceleration of body0 relative to body1 about the axis.
    pub target_accel: f64,
    /// Largest torque the motor may apply; `None` for unlimited.
    pub torque_limit: Option<f64>,
}

/// Revolute joint: shared pivot plus a common rotation axis.
///
/// Without a motor the hinge produces five rows and leaves rotation about
/// the axis free. With a motor a sixth row prescribes the angular
/// acceleration about the axis; the row force is the actuator torque.
#[derive(Debug, Clone)]
pub struct HingeJoint {
    name: String,
    bodies: (BodyId, BodyId),
    anchor: Anchor,
    local_axis0: Vec3,
    local_axis1: Vec3,
    /// Position-error correction gain.
    pub correction: f64,
    pub motor: Option<HingeMotor>,
}

impl HingeJoint {
    /// Hinge at world point `pivot` about world direction `axis`.
    pub fn at_pivot(
        name: &str,
        (id0, body0): (BodyId, &dyn Body),
        (id1, body1): (BodyId, &dyn Body),
        pivot: Vec3,
        axis: Vec3,
    ) -> Self {
        let axis = axis.normalize();
        Self {
            name: name.to_string(),
            bodies: (id0, id1),
            anchor: Anchor::at_pivot(&pivot, body0, body1),
            local_axis0: body0.unrotate_vector(&axis),
            local_axis1: body1.unrotate_vector(&axis),
            correction: DEFAULT_CORRECTION,
            motor: None,
        }
    }

    pub fn with_motor(mut self, motor: HingeMotor) -> Self {
        self.motor = Some(motor);
        self
    }
}

impl Joint for HingeJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian_derivative(&mut self, params: &mut ConstraintParams, body0: &dyn Body, body1: &dyn Body) {
        self.anchor.add_rows(params, body0, body1, self.correction);

        let axis0 = body0.rotate_vector(&self.local_axis0);
        let axis1 = body1.rotate_vector(&self.local_axis1);
        let misalignment = axis1.cross(&axis0);
        let gain = self.correction * params.inv_timestep * params.inv_timestep;

        let (u, v) = perpendicular_basis(&axis0);
        for dir in [u, v] {
            let jacobian = JacobianPair::new(Jacobian::rotational(&dir), -Jacobian::rotational(&dir));
            if let Some(row) = params.add_row(jacobian) {
                row.penetration = -misalignment.dot(&dir);
                row.penetration_stiffness = gain;
            }
        }

        if let Some(motor) = self.motor {
            let jacobian = JacobianPair::new(Jacobian::rotational(&axis0), -Jacobian::rotational(&axis0));
            if let Some(row) = params.add_row(jacobian) {
                row.target_accel = motor.target_accel;
                if let Some(limit) = motor.torque_limit {
                    row.low = -limit.abs();
                    row.high = limit.abs();
                }
            }
        }
    }
}

/// Joint whose rows are supplied directly.
#[derive(Debug, Clone)]
pub struct RowJoint {
    name: String,
    bodies: (BodyId, BodyId),
    rows: Vec<RowDescriptor>,
}

impl RowJoint {
    pub fn new(name: &str, body0: BodyId, body1: BodyId) -> Self {
        Self {
            name: name.to_string(),
            bodies: (body0, body1),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: RowDescriptor) -> Self {
        self.rows.push(row);
        self
    }

    pub fn rows_mut(&mut self) -> &mut Vec<RowDescriptor> {
        &mut self.rows
    }
}

impl Joint for RowJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian_derivative(&mut self, params: &mut ConstraintParams, _body0: &dyn Body, _body1: &dyn Body) {
        for row in &self.rows {
            if let Some(slot) = params.add_row(row.jacobian) {
                *slot = *row;
            }
        }
    }
}

/// Point contact with Coulomb friction bounds.
///
/// Produces one unilateral normal row (push only) and two tangent rows
/// whose force is bounded by `friction * normal_load`. The contact normal
/// points from body1 toward body0.
#[derive(Debug, Clone)]
pub struct ContactJoint {
    name: String,
    bodies: (BodyId, BodyId),
    /// World contact point.
    pub point: Vec3,
    /// Unit contact normal.
    pub normal: Vec3,
    /// Penetration depth along the normal (positive when overlapping).
    pub penetration: f64,
    pub friction: f64,
    /// Normal force estimate used to bound the friction rows.
    pub normal_load: f64,
    /// Penetration correction gain.
    pub correction: f64,
    /// An inactive contact produces no rows.
    pub active: bool,
}

impl ContactJoint {
    pub fn new(name: &str, body0: BodyId, body1: BodyId, point: Vec3, normal: Vec3) -> Self {
        Self {
            name: name.to_string(),
            bodies: (body0, body1),
            point,
            normal: normal.normalize(),
            penetration: 0.0,
            friction: 1.0,
            normal_load: 0.0,
            correction: DEFAULT_CORRECTION,
            active: true,
        }
    }

    pub fn with_friction(mut self, friction: f64, normal_load: f64) -> Self {
        self.friction = friction;
        self.normal_load = normal_load;
        self
    }
}

impl Joint for ContactJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian_derivative(&mut self, params: &mut ConstraintParams, body0: &dyn Body, body1: &dyn Body) {
        if !self.active {
            return;
        }
        let r0 = self.point - body0.position();
        let r1 = self.point - body1.position();
        let gain = self.correction * params.inv_timestep * params.inv_timestep;

        let n = self.normal;
        let jacobian = JacobianPair::new(Jacobian::point(&n, &r0), -Jacobian::point(&n, &r1));
        if let Some(row) = params.add_row(jacobian) {
            row.penetration = self.penetration;
            row.penetration_stiffness = gain;
            row.low = 0.0;
            row.high = MAX_BOUND;
        }

        let bound = (self.friction * self.normal_load).abs();
        let (u, v) = perpendicular_basis(&n);
        for dir in [u, v] {
            let jacobian = JacobianPair::new(Jacobian::point(&dir, &r0), -Jacobian::point(&dir, &r1));
            if let Some(row) = params.add_row(jacobian) {
                row.low = -bound;
                row.high = bound;
            }
        }
    }
}
