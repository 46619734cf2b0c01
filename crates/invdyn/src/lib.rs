//! invdyn: inverse dynamics for articulated rigid-body mechanisms.
//!
//! This is the umbrella crate: it re-exports the model, math and skeleton
//! crates and adds helpers for building the per-slot external accelerations
//! a step consumes.

pub use invdyn_math::{self, GRAVITY, Quat, SpatialMat, SpatialVec, Vec3};
pub use invdyn_model::{
    self, BallJoint, Body, BodyId, ContactJoint, HingeJoint, HingeMotor, Jacobian, JacobianPair, Joint,
    JointId, Model, ModelBuilder, RigidBody, RowDescriptor, RowJoint,
};
pub use invdyn_skeleton::{
    self, ForcePair, LoopingJoint, MotionIntegrator, NoIntegration, NodeId, RowForce, Skeleton, SkeletonConfig,
    SkeletonError, SlotForce, StepReport, StepStats,
};

/// Uniform gravity for every dynamic body in the skeleton's slots.
///
/// Kinematic bodies get zero acceleration. Slots whose body is missing from
/// `model` are treated as kinematic.
pub fn gravity_accelerations(skeleton: &Skeleton, model: &Model, gravity: Vec3) -> Vec<SpatialVec> {
    (0..skeleton.slot_count())
        .map(|slot| {
            let dynamic = skeleton
                .slot_body(slot)
                .and_then(|id| model.body(id))
                .is_some_and(|body| !body.is_kinematic());
            if dynamic {
                SpatialVec::new(gravity, Vec3::zeros())
            } else {
                SpatialVec::zero()
            }
        })
        .collect()
}

/// Standard downward gravity along `-y`.
pub fn standard_gravity() -> Vec3 {
    Vec3::new(0.0, -GRAVITY, 0.0)
}
