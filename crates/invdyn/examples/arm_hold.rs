//! Two-link arm holding torques, under gravity and under commanded motion.
//!
//! Run with `RUST_LOG=debug` to see the solver's per-step summary.

use invdyn::{
    GRAVITY, HingeJoint, HingeMotor, JointId, Model, ModelBuilder, NoIntegration, RigidBody, Skeleton,
    SkeletonError, Vec3, gravity_accelerations, standard_gravity,
};

const M1: f64 = 2.0;
const M2: f64 = 1.0;
const LENGTH: f64 = 0.5;
const ELBOW_LIMIT: f64 = 3.0;

fn motor(target_accel: f64, torque_limit: Option<f64>) -> impl FnOnce(HingeJoint) -> HingeJoint {
    move |h: HingeJoint| {
        h.with_motor(HingeMotor {
            target_accel,
            torque_limit,
        })
    }
}

/// Horizontal arm whose elbow is commanded to `elbow_accel` rad/s².
fn build_arm(elbow_accel: f64) -> Result<(Model, Skeleton), SkeletonError> {
    let mut model = ModelBuilder::new()
        .add_body(RigidBody::fixed("base"))
        .add_body(RigidBody::rod("upper", M1, LENGTH).with_position(Vec3::new(LENGTH / 2.0, 0.0, 0.0)))
        .add_body(RigidBody::rod("fore", M2, LENGTH).with_position(Vec3::new(1.5 * LENGTH, 0.0, 0.0)))
        .add_hinge_joint_with("shoulder", 1, 0, Vec3::zeros(), Vec3::z(), motor(0.0, None))
        .add_hinge_joint_with(
            "elbow",
            2,
            1,
            Vec3::new(LENGTH, 0.0, 0.0),
            Vec3::z(),
            motor(elbow_accel, Some(ELBOW_LIMIT)),
        )
        .build();

    let mut skeleton = Skeleton::new();
    let root = skeleton.add_root(invdyn::BodyId(0))?;
    let upper = skeleton.add_child(&mut model, JointId(0), root)?;
    skeleton.add_child(&mut model, JointId(1), upper)?;
    skeleton.finalize(&mut model, &[])?;
    Ok((model, skeleton))
}

fn main() -> Result<(), SkeletonError> {
    env_logger::init();

    println!("Two-Link Arm Inverse Dynamics");
    println!("=============================");
    println!(
        "static shoulder torque (analytic): {:.4} N·m",
        GRAVITY * (M1 * LENGTH / 2.0 + M2 * 1.5 * LENGTH)
    );
    println!(
        "static elbow torque (analytic):    {:.4} N·m (limit {ELBOW_LIMIT})\n",
        GRAVITY * M2 * LENGTH / 2.0
    );

    println!("elbow accel   shoulder τ   elbow τ    LCP pivots");
    println!("-------------------------------------------------");
    for step in 0..6 {
        let target = step as f64 * 2.0;
        let (mut model, skeleton) = build_arm(target)?;
        let gravity = gravity_accelerations(&skeleton, &model, standard_gravity());
        let report = skeleton.step_with_accelerations(&mut model, &gravity, &mut NoIntegration, 1.0 / 240.0, 0)?;

        let tau = |id| model.joint_feedback(id).map_or(f64::NAN, |f| f[5]);
        println!(
            "{target:>10.2}   {:>10.4}   {:>8.4}   {:>10}",
            tau(JointId(0)),
            tau(JointId(1)),
            report.stats.lcp_pivots
        );
    }
    Ok(())
}
