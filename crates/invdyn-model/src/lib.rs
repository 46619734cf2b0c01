//! Bodies, joints and constraint rows for the invdyn solver.
//!
//! `Model` owns the rigid bodies and joints of a mechanism. Joints describe
//! themselves to the solver as constraint rows through [`Joint`]; the solver
//! reads body mass properties through [`Body`].

pub mod body;
pub mod joint;
pub mod model;
pub mod row;

pub use body::{Body, BodyId, RigidBody};
pub use joint::{BallJoint, ContactJoint, HingeJoint, HingeMotor, Joint, JointId, RowJoint};
pub use model::{Model, ModelBuilder, ModelError};
pub use row::{
    ConstraintParams, Jacobian, JacobianPair, LCP_MAX_VALUE, MAX_BOUND, MAX_DOF, MIN_BOUND, RowDescriptor,
};
