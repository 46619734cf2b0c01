//! Constraint rows as produced by joints.
//!
//! A joint describes its constraint as up to [`MAX_DOF`] scalar rows. Each
//! row carries a Jacobian pair (one side per attached body), the desired
//! relative acceleration along that row and the force bounds it may apply.

use invdyn_math::{SpatialVec, Vec3};

/// Maximum number of rows a single joint may produce.
pub const MAX_DOF: usize = 6;
/// Largest force magnitude a row may be bounded by.
pub const MAX_BOUND: f64 = 1.0e15;
/// Smallest (most negative) row force bound.
pub const MIN_BOUND: f64 = -MAX_BOUND;
/// A row whose bounds both reach this magnitude is treated as unbounded.
pub const LCP_MAX_VALUE: f64 = 1.0e10;

/// One side of a row Jacobian: `[linear; angular]` coefficients for one body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Jacobian {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Jacobian {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    /// Row acting on the body's translation along `dir` at offset `arm` from
    /// its center of mass.
    pub fn point(dir: &Vec3, arm: &Vec3) -> Self {
        Self {
            linear: *dir,
            angular: arm.cross(dir),
        }
    }

    /// Row acting purely on the body's rotation about `axis`.
    pub fn rotational(axis: &Vec3) -> Self {
        Self {
            linear: Vec3::zeros(),
            angular: *axis,
        }
    }

    pub fn to_spatial(&self) -> SpatialVec {
        SpatialVec::new(self.linear, self.angular)
    }
}

impl std::ops::Neg for Jacobian {
    type Output = Jacobian;
    fn neg(self) -> Jacobian {
        Jacobian {
            linear: -self.linear,
            angular: -self.angular,
        }
    }
}

/// Jacobian sides for the joint's first and second body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JacobianPair {
    pub body0: Jacobian,
    pub body1: Jacobian,
}

impl JacobianPair {
    pub fn new(body0: Jacobian, body1: Jacobian) -> Self {
        Self { body0, body1 }
    }
}

/// Everything a joint states about one constraint row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowDescriptor {
    pub jacobian: JacobianPair,
    /// In `[0, 1]`; 1 is the stiffest row.
    pub joint_stiffness: f64,
    /// Desired relative acceleration along the row.
    pub target_accel: f64,
    /// Position error along the row, signed so that a positive value is
    /// removed by accelerating along the Jacobian.
    pub penetration: f64,
    /// Gain turning `penetration` into a corrective acceleration.
    pub penetration_stiffness: f64,
    /// Lower force bound.
    pub low: f64,
    /// Upper force bound.
    pub high: f64,
}

impl RowDescriptor {
    pub fn new(jacobian: JacobianPair) -> Self {
        Self {
            jacobian,
            ..Self::default()
        }
    }

    /// Acceleration the row asks for to remove its position error.
    pub fn correction_accel(&self) -> f64 {
        self.penetration_stiffness * self.penetration
    }

    /// Whether the row may apply unbounded force in both directions.
    pub fn is_bilateral(&self) -> bool {
        self.low <= -LCP_MAX_VALUE && self.high >= LCP_MAX_VALUE
    }
}

impl Default for RowDescriptor {
    fn default() -> Self {
        Self {
            jacobian: JacobianPair::default(),
            joint_stiffness: 1.0,
            target_accel: 0.0,
            penetration: 0.0,
            penetration_stiffness: 0.0,
            low: MIN_BOUND,
            high: MAX_BOUND,
        }
    }
}

/// Scratch handed to a joint while it derives its rows for one step.
#[derive(Debug, Clone)]
pub struct ConstraintParams {
    pub timestep: f64,
    pub inv_timestep: f64,
    pub thread_index: usize,
    rows: [RowDescriptor; MAX_DOF],
    count: usize,
    requested: usize,
}

impl ConstraintParams {
    pub fn new(timestep: f64, thread_index: usize) -> Self {
        Self {
            timestep,
            inv_timestep: 1.0 / timestep,
            thread_index,
            rows: [RowDescriptor::default(); MAX_DOF],
            count: 0,
            requested: 0,
        }
    }

    /// Append a row. Returns `None` once [`MAX_DOF`] rows exist; the request
    /// is still counted so the overflow can be reported.
    pub fn add_row(&mut self, jacobian: JacobianPair) -> Option<&mut RowDescriptor> {
        self.requested += 1;
        if self.count == MAX_DOF {
            return None;
        }
        let row = &mut self.rows[self.count];
        *row = RowDescriptor::new(jacobian);
        self.count += 1;
        Some(row)
    }

    /// Rows accepted so far.
    pub fn rows(&self) -> &[RowDescriptor] {
        &self.rows[..self.count]
    }

    /// Rows the joint tried to add, including rejected ones.
    pub fn requested_rows(&self) -> usize {
        self.requested
    }

    /// Forget all rows so the scratch can serve the next joint.
    pub fn clear(&mut self) {
        self.count = 0;
        self.requested = 0;
    }
}
