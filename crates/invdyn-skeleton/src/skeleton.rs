//! The skeleton: construction API and the per-step driver.

use crate::assembly::{ScratchLayout, assemble};
use crate::config::SkeletonConfig;
use crate::error::{Result, SkeletonError};
use crate::factor::factorize;
use crate::jacobian::derive_rows;
use crate::resolve::{RowForce, SlotForce, joint_targets, resolve, scatter};
use crate::solve::{ForcePair, solve_tree};
use crate::tree::{LoopingJoint, NodeId, Tree};
use invdyn_math::SpatialVec;
use invdyn_model::{BodyId, JointId, Model};
use log::debug;

/// Receives the resolved constraint forces at the end of a step.
///
/// The skeleton computes forces only; advancing body state is left to the
/// implementor.
pub trait MotionIntegrator {
    fn apply_resolved_forces(&mut self, model: &mut Model, forces: &[SlotForce], timestep: f64);
}

/// Integrator that leaves the model untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntegration;

impl MotionIntegrator for NoIntegration {
    fn apply_resolved_forces(&mut self, _model: &mut Model, _forces: &[SlotForce], _timestep: f64) {}
}

impl<F> MotionIntegrator for F
where
    F: FnMut(&mut Model, &[SlotForce], f64),
{
    fn apply_resolved_forces(&mut self, model: &mut Model, forces: &[SlotForce], timestep: f64) {
        self(model, forces, timestep)
    }
}

/// Counters describing one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub nodes: usize,
    pub primary_rows: usize,
    /// Bounded tree rows plus loop rows.
    pub auxiliary_rows: usize,
    pub loop_rows: usize,
    pub regularization_iterations: usize,
    pub lcp_pivots: usize,
    pub lcp_fast_path: bool,
}

/// Output of [`Skeleton::step`].
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Net constraint force per slot: tree nodes by index, then looping bodies.
    pub slot_forces: Vec<SlotForce>,
    /// Force of every row, tree joints in node order then loop joints.
    pub row_forces: Vec<RowForce>,
    pub stats: StepStats,
}

/// Articulated inverse-dynamics solver over a tree of bodies.
///
/// Build the tree with [`add_root`](Self::add_root) and
/// [`add_child`](Self::add_child), close loops with
/// [`finalize`](Self::finalize), then call [`step`](Self::step) once per
/// simulation step.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    tree: Tree,
    config: SkeletonConfig,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SkeletonConfig) -> Self {
        Self {
            tree: Tree::default(),
            config,
        }
    }

    pub fn config(&self) -> &SkeletonConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn add_root(&mut self, body: BodyId) -> Result<NodeId> {
        self.tree.add_root(body)
    }

    /// Attach the body on the far side of `joint` below `parent` and mark the
    /// joint as owned by this skeleton.
    pub fn add_child(&mut self, model: &mut Model, joint: JointId, parent: NodeId) -> Result<NodeId> {
        let bodies = model.joint_bodies(joint)?;
        let parent_body = self.tree.body(parent)?;
        let child = if bodies.0 == parent_body { bodies.1 } else { bodies.0 };
        let body = model.body(child).ok_or(SkeletonError::UnknownBody(child))?;
        if body.is_kinematic() {
            return Err(SkeletonError::KinematicChild(child));
        }

        let node = self.tree.add_child(joint, bodies, parent)?;
        model.set_joint_in_skeleton(joint, true)?;
        Ok(node)
    }

    /// Order the tree and register `loop_joints` as the loop-closing set.
    pub fn finalize(&mut self, model: &mut Model, loop_joints: &[JointId]) -> Result<()> {
        let loops = loop_joints
            .iter()
            .map(|&joint| -> Result<_> { Ok((joint, model.joint_bodies(joint)?)) })
            .collect::<Result<Vec<_>>>()?;
        let previous: Vec<JointId> = self.tree.loop_joints().iter().map(|l| l.joint).collect();

        self.tree.finalize(&loops, self.config.find_node_stack_limit)?;
        for joint in previous {
            model.set_joint_in_skeleton(joint, false)?;
        }
        for &joint in loop_joints {
            model.set_joint_in_skeleton(joint, true)?;
        }
        Ok(())
    }

    /// Drop a loop joint; returns whether it was registered.
    pub fn remove_loop_joint(&mut self, model: &mut Model, joint: JointId) -> Result<bool> {
        match self.tree.remove_loop_joint(joint) {
            Some(removed) => {
                model.set_joint_in_skeleton(removed.joint, false)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear the skeleton down, clearing the ownership flag of every joint.
    pub fn release(self, model: &mut Model) -> Result<()> {
        for joint in self.tree.tree_joints().chain(self.tree.loop_joints().iter().map(|l| l.joint)) {
            model.set_joint_in_skeleton(joint, false)?;
        }
        Ok(())
    }

    pub fn find_node(&self, body: BodyId) -> Result<Option<NodeId>> {
        self.tree.find_node(body, self.config.find_node_stack_limit)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.tree.parent(node)
    }

    pub fn body(&self, node: NodeId) -> Result<BodyId> {
        self.tree.body(node)
    }

    pub fn parent_joint(&self, node: NodeId) -> Result<Option<JointId>> {
        self.tree.parent_joint(node)
    }

    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        self.tree.children(node)
    }

    pub fn index(&self, node: NodeId) -> Result<usize> {
        self.tree.index(node)
    }

    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    pub fn loop_joints(&self) -> &[LoopingJoint] {
        self.tree.loop_joints()
    }

    pub fn looping_bodies(&self) -> &[BodyId] {
        self.tree.looping_bodies()
    }

    pub fn is_finalized(&self) -> bool {
        self.tree.is_finalized()
    }

    /// Number of slots a step reads and writes (tree nodes plus looping
    /// bodies).
    pub fn slot_count(&self) -> usize {
        self.tree.slot_count()
    }

    /// Body occupying `slot`.
    pub fn slot_body(&self, slot: usize) -> Option<BodyId> {
        (slot < self.tree.slot_count()).then(|| self.tree.slot_body(slot))
    }

    /// Run the two-pass tree solve on caller-supplied per-node targets.
    ///
    /// `targets` is indexed by node index. Only the primary rows of each
    /// joint take part; bounded and loop rows are ignored.
    pub fn solve_tree_targets(&self, model: &mut Model, targets: &[ForcePair], timestep: f64) -> Result<Vec<ForcePair>> {
        self.check_ready(timestep)?;
        if targets.len() != self.tree.node_count() {
            return Err(SkeletonError::SlotCountMismatch {
                expected: self.tree.node_count(),
                found: targets.len(),
            });
        }
        let table = derive_rows(&self.tree, model, &self.config, timestep, 0)?;
        let factors = factorize(&self.tree, model, &table, &self.config)?;
        let mut force = vec![ForcePair::zero(); targets.len()];
        solve_tree(&self.tree, &factors.nodes, targets, &mut force);
        Ok(force)
    }

    /// Solve one step with no external accelerations.
    pub fn step(
        &self,
        model: &mut Model,
        integrator: &mut impl MotionIntegrator,
        timestep: f64,
        thread_index: usize,
    ) -> Result<StepReport> {
        let accel = vec![SpatialVec::zero(); self.tree.slot_count()];
        self.step_with_accelerations(model, &accel, integrator, timestep, thread_index)
    }

    /// Solve one step.
    ///
    /// `external_accel` holds the acceleration each slot would have without
    /// the skeleton's constraints (gravity, applied forces). The resolved
    /// row forces cancel it where the rows demand.
    pub fn step_with_accelerations(
        &self,
        model: &mut Model,
        external_accel: &[SpatialVec],
        integrator: &mut impl MotionIntegrator,
        timestep: f64,
        thread_index: usize,
    ) -> Result<StepReport> {
        self.check_ready(timestep)?;
        let slots = self.tree.slot_count();
        if external_accel.len() != slots {
            return Err(SkeletonError::SlotCountMismatch {
                expected: slots,
                found: external_accel.len(),
            });
        }

        let mut table = derive_rows(&self.tree, model, &self.config, timestep, thread_index)?;
        let factors = factorize(&self.tree, model, &table, &self.config)?;
        let layout = ScratchLayout::measure(&self.tree, &table, &self.config);
        let loop_rows: usize = table.loop_infos.iter().map(|info| info.count).sum();
        debug_assert_eq!(layout.auxiliary, factors.auxiliary + loop_rows);
        debug_assert_eq!(layout.slots, slots);

        let system = assemble(&self.tree, &table, &factors, layout, &self.config)?;
        let targets = joint_targets(&table, external_accel);
        let resolution = resolve(&self.tree, &mut table, &factors, &system, &targets, &self.config)?;
        let (slot_forces, row_forces) = scatter(&self.tree, &table, model)?;

        integrator.apply_resolved_forces(model, &slot_forces, timestep);

        let stats = StepStats {
            nodes: layout.nodes,
            primary_rows: layout.primary,
            auxiliary_rows: layout.auxiliary,
            loop_rows,
            regularization_iterations: system.regularization_iterations,
            lcp_pivots: resolution.lcp_pivots,
            lcp_fast_path: resolution.lcp_fast_path,
        };
        debug!(
            "skeleton step: {} nodes, {} primary rows, {} auxiliary rows ({} loop)",
            stats.nodes, stats.primary_rows, stats.auxiliary_rows, stats.loop_rows
        );
        Ok(StepReport {
            slot_forces,
            row_forces,
            stats,
        })
    }

    fn check_ready(&self, timestep: f64) -> Result<()> {
        if !(timestep > 0.0 && timestep.is_finite()) {
            return Err(SkeletonError::InvalidTimestep(timestep));
        }
        if !self.tree.is_finalized() {
            return Err(SkeletonError::NotFinalized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use invdyn_math::{SpatialMat, Vec3, Vec6};
    use invdyn_model::{Body, Jacobian, JacobianPair, RigidBody, RowDescriptor, RowJoint};

    const DT: f64 = 0.01;

    fn row(body0: Jacobian, body1: Jacobian, target: f64) -> RowDescriptor {
        let mut row = RowDescriptor::new(JacobianPair::new(body0, body1));
        row.target_accel = target;
        row
    }

    /// Row tying `arm0` on body0 to `arm1` on body1 along `dir`.
    fn link_row(dir: Vec3, arm0: Vec3, arm1: Vec3, target: f64) -> RowDescriptor {
        row(Jacobian::point(&dir, &arm0), -Jacobian::point(&dir, &arm1), target)
    }

    /// Acceleration each slot body gets from its net constraint force.
    fn slot_accel(model: &Model, force: &SlotForce) -> SpatialVec {
        let body = model.body(force.body).unwrap();
        SpatialVec::new(force.linear * body.inv_mass(), body.inv_world_inertia() * force.angular)
    }

    fn slot_of(report: &StepReport, body: BodyId) -> &SlotForce {
        report.slot_forces.iter().find(|s| s.body == body).unwrap()
    }

    fn row_force(report: &StepReport, joint: JointId, local: usize) -> f64 {
        report
            .row_forces
            .iter()
            .find(|r| r.joint == joint && r.row == local)
            .unwrap()
            .force
    }

    struct Branches {
        model: Model,
        skeleton: Skeleton,
        bodies: [BodyId; 5],
        loop_joint: JointId,
        branch_c: JointId,
    }

    /// ground ─ a ─ a1, ground ─ b ─ b1, ground ─ c, with a loop joint
    /// pulling a1 and b1 apart along x.
    fn branches(close_loop: bool) -> Branches {
        let mut model = Model::default();
        let ground = model.add_body(RigidBody::fixed("ground"));
        let a = model.add_body(RigidBody::sphere("a", 1.0, 0.5));
        let a1 = model.add_body(RigidBody::sphere("a1", 1.5, 0.4));
        let b = model.add_body(RigidBody::sphere("b", 1.0, 0.5));
        let b1 = model.add_body(RigidBody::sphere("b1", 0.5, 0.3));
        let c = model.add_body(RigidBody::sphere("c", 2.0, 0.5));

        let half = Vec3::new(0.5, 0.0, 0.0);
        let ja = model.add_joint(RowJoint::new("ja", a, ground).with_row(row(
            Jacobian::point(&Vec3::y(), &Vec3::x()),
            Jacobian::default(),
            0.0,
        )));
        let ja1 = model.add_joint(RowJoint::new("ja1", a1, a).with_row(link_row(Vec3::y(), half, -half, 0.0)));
        let jb = model.add_joint(RowJoint::new("jb", b, ground).with_row(row(
            Jacobian::point(&Vec3::y(), &-Vec3::x()),
            Jacobian::default(),
            0.0,
        )));
        let jb1 = model.add_joint(RowJoint::new("jb1", b1, b).with_row(link_row(Vec3::y(), -half, half, 0.0)));
        let jc = model.add_joint(RowJoint::new("jc", c, ground).with_row(row(
            Jacobian::point(&Vec3::y(), &Vec3::x()),
            Jacobian::default(),
            1.0,
        )));
        let arm = Vec3::new(0.0, 0.3, 0.0);
        let lj = model.add_joint(RowJoint::new("loop", a1, b1).with_row(link_row(Vec3::x(), arm, -arm, 1.0)));

        let mut skeleton = Skeleton::new();
        let root = skeleton.add_root(ground).unwrap();
        let na = skeleton.add_child(&mut model, ja, root).unwrap();
        skeleton.add_child(&mut model, ja1, na).unwrap();
        let nb = skeleton.add_child(&mut model, jb, root).unwrap();
        skeleton.add_child(&mut model, jb1, nb).unwrap();
        skeleton.add_child(&mut model, jc, root).unwrap();
        let loops = if close_loop { vec![lj] } else { vec![] };
        skeleton.finalize(&mut model, &loops).unwrap();

        Branches {
            model,
            skeleton,
            bodies: [a, a1, b, b1, c],
            loop_joint: lj,
            branch_c: jc,
        }
    }

    #[test]
    fn test_loop_closure_residual() {
        let Branches {
            mut model,
            skeleton,
            bodies: [_, a1, _, b1, _],
            loop_joint,
            ..
        } = branches(true);
        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();
        assert_eq!(report.stats.loop_rows, 1);
        assert_eq!(report.stats.auxiliary_rows, 1);
        assert_eq!(report.stats.primary_rows, 5);

        let acc_a1 = slot_accel(&model, slot_of(&report, a1));
        let acc_b1 = slot_accel(&model, slot_of(&report, b1));
        let arm = Vec3::new(0.0, 0.3, 0.0);
        let loop_accel = Jacobian::point(&Vec3::x(), &arm).to_spatial().dot(&acc_a1)
            - Jacobian::point(&Vec3::x(), &-arm).to_spatial().dot(&acc_b1);
        assert_relative_eq!(loop_accel, 1.0, max_relative = 1e-4);
        assert!(row_force(&report, loop_joint, 0) > 0.0);
    }

    #[test]
    fn test_loop_leaves_other_branches_alone() {
        let mut closed = branches(true);
        let mut open = branches(false);
        let with_loop = closed.skeleton.step(&mut closed.model, &mut NoIntegration, DT, 0).unwrap();
        let without = open.skeleton.step(&mut open.model, &mut NoIntegration, DT, 0).unwrap();

        let c = closed.branch_c;
        assert!((row_force(&with_loop, c, 0) - row_force(&without, c, 0)).abs() < 1e-6);
        assert!(with_loop.stats.lcp_fast_path);
        assert_eq!(without.stats.auxiliary_rows, 0);
    }

    /// One body on a static root: a primary row along y and a row along x
    /// bounded to ±0.5, both leaning on the z rotation.
    fn clamped() -> (Model, Skeleton, JointId) {
        let mut model = Model::default();
        let ground = model.add_body(RigidBody::fixed("ground"));
        let bob = model.add_body(RigidBody::new("bob", 2.0, Vec3::new(0.5, 0.5, 0.5)));
        let primary = row(Jacobian::point(&Vec3::y(), &Vec3::x()), Jacobian::default(), 1.0);
        let mut bounded = row(Jacobian::point(&Vec3::x(), &Vec3::y()), Jacobian::default(), 3.0);
        bounded.low = -0.5;
        bounded.high = 0.5;
        let joint = model.add_joint(RowJoint::new("j", bob, ground).with_row(primary).with_row(bounded));

        let mut skeleton = Skeleton::new();
        let root = skeleton.add_root(ground).unwrap();
        skeleton.add_child(&mut model, joint, root).unwrap();
        skeleton.finalize(&mut model, &[]).unwrap();
        (model, skeleton, joint)
    }

    #[test]
    fn test_bounded_row_clamps_and_updates_primary() {
        let (mut model, skeleton, joint) = clamped();
        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();

        assert!(!report.stats.lcp_fast_path);
        let feedback = model.joint_feedback(joint).unwrap();
        assert_eq!(feedback.len(), 2);
        assert_relative_eq!(feedback[1], 0.5, epsilon = 1e-9);
        // (G_pp + d)·λ0 = 1 - G_pa·0.5 with G_pp = 2.5, G_pa = -2.
        assert_relative_eq!(feedback[0], 0.8, max_relative = 1e-4);
    }

    /// Bob with a free y row and two identical bounded x rows, so the
    /// condensed matrix is singular up to the row damping.
    fn twin_rows(config: SkeletonConfig) -> (Model, Skeleton, JointId) {
        let mut model = Model::default();
        let ground = model.add_body(RigidBody::fixed("ground"));
        let bob = model.add_body(RigidBody::sphere("bob", 1.0, 0.5));
        let mut bounded = row(Jacobian::point(&Vec3::x(), &Vec3::zeros()), Jacobian::default(), 2.0);
        bounded.low = -100.0;
        bounded.high = 100.0;
        let joint = model.add_joint(
            RowJoint::new("twin", bob, ground)
                .with_row(row(Jacobian::point(&Vec3::y(), &Vec3::zeros()), Jacobian::default(), 0.0))
                .with_row(bounded)
                .with_row(bounded),
        );
        let mut skeleton = Skeleton::with_config(config);
        let root = skeleton.add_root(ground).unwrap();
        skeleton.add_child(&mut model, joint, root).unwrap();
        skeleton.finalize(&mut model, &[]).unwrap();
        (model, skeleton, joint)
    }

    #[test]
    fn test_duplicated_bounded_rows_share_the_load() {
        let (mut model, skeleton, joint) = twin_rows(SkeletonConfig::default());
        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();

        // Row damping alone keeps the default pivot tolerance satisfied.
        assert_eq!(report.stats.regularization_iterations, 0);
        let feedback = model.joint_feedback(joint).unwrap();
        assert!(feedback.iter().all(|f| f.is_finite()));
        assert_relative_eq!(feedback[1] + feedback[2], 2.0, max_relative = 1e-4);
        assert_relative_eq!(feedback[1], feedback[2], max_relative = 1e-6);
    }

    #[test]
    fn test_duplicated_rows_are_regularized_before_the_lcp() {
        // The second pivot is about 4e-6, below this tolerance, so the
        // diagonal has to be damped before the factor is accepted.
        let config = SkeletonConfig::default().cholesky_pivot_tolerance(1.0e-3);
        let (mut model, skeleton, joint) = twin_rows(config);
        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();

        let iterations = report.stats.regularization_iterations;
        assert!((1..=30).contains(&iterations), "took {iterations} rounds");
        let feedback = model.joint_feedback(joint).unwrap();
        assert!(feedback.iter().all(|f| f.is_finite()));
        assert_relative_eq!(feedback[1], feedback[2], max_relative = 1e-9);
        // Damping softens the pair slightly; the total stays near the target.
        assert_relative_eq!(feedback[1] + feedback[2], 2.0, max_relative = 1e-2);
        assert!(feedback[0].abs() < 1e-9);
    }

    #[test]
    fn test_overflow_body_gets_a_slot() {
        let Branches {
            mut model,
            mut skeleton,
            bodies: [a, ..],
            ..
        } = branches(false);
        let floater = model.add_body(RigidBody::sphere("floater", 1.0, 0.2));
        let tether = model.add_joint(
            RowJoint::new("tether", a, floater).with_row(link_row(Vec3::x(), Vec3::zeros(), Vec3::zeros(), 1.0)),
        );
        skeleton.finalize(&mut model, &[tether]).unwrap();

        let n = skeleton.node_count();
        assert_eq!(skeleton.looping_bodies(), &[floater]);
        assert_eq!(skeleton.slot_count(), n + 1);
        assert!(model.is_joint_in_skeleton(tether));

        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();
        assert_eq!(report.slot_forces.len(), n + 1);
        let slot = &report.slot_forces[n];
        assert_eq!(slot.body, floater);
        assert!(slot.linear.x < 0.0);
        assert_relative_eq!(slot.linear.x, -row_force(&report, tether, 0));
    }

    #[test]
    fn test_remove_loop_joint_clears_flag() {
        let Branches {
            mut model,
            mut skeleton,
            loop_joint,
            ..
        } = branches(true);
        assert!(model.is_joint_in_skeleton(loop_joint));
        assert!(skeleton.remove_loop_joint(&mut model, loop_joint).unwrap());
        assert!(!model.is_joint_in_skeleton(loop_joint));
        assert!(!skeleton.remove_loop_joint(&mut model, loop_joint).unwrap());
        assert!(skeleton.loop_joints().is_empty());

        let report = skeleton.step(&mut model, &mut NoIntegration, DT, 0).unwrap();
        assert_eq!(report.stats.loop_rows, 0);
    }

    #[test]
    fn test_release_clears_every_flag() {
        let Branches {
            mut model,
            skeleton,
            loop_joint,
            branch_c,
            ..
        } = branches(true);
        assert!(model.is_joint_in_skeleton(branch_c));
        skeleton.release(&mut model).unwrap();
        assert!(!model.is_joint_in_skeleton(branch_c));
        assert!(!model.is_joint_in_skeleton(loop_joint));
    }

    #[test]
    fn test_integrator_receives_forces() {
        let (mut model, skeleton, _) = clamped();
        let mut seen = Vec::new();
        let mut record = |_: &mut Model, forces: &[SlotForce], dt: f64| {
            seen.push((forces.len(), dt));
        };
        skeleton.step(&mut model, &mut record, DT, 0).unwrap();
        assert_eq!(seen, vec![(2, DT)]);
    }

    #[test]
    fn test_solve_tree_targets_single_node() {
        let mut model = Model::default();
        let body = RigidBody::new("solo", 4.0, Vec3::new(1.0, 2.0, 2.0));
        let inertia = body.inertia_matrix();
        let id = model.add_body(body);
        let mut skeleton = Skeleton::new();
        skeleton.add_root(id).unwrap();
        skeleton.finalize(&mut model, &[]).unwrap();

        let target = ForcePair {
            joint: Vec6::zeros(),
            body: Vec6::new(4.0, 8.0, 0.0, 1.0, 2.0, 0.0),
        };
        let out = skeleton.solve_tree_targets(&mut model, &[target], DT).unwrap();
        let expected = SpatialMat::rigid_body(4.0, &inertia).generalized_inverse().data * target.body;
        assert_relative_eq!(out[0].body, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_kinematic_child_rejected() {
        let mut model = Model::default();
        let ground = model.add_body(RigidBody::fixed("ground"));
        let wall = model.add_body(RigidBody::fixed("wall"));
        let joint = model.add_joint(RowJoint::new("weld", wall, ground));
        let mut skeleton = Skeleton::new();
        let root = skeleton.add_root(ground).unwrap();
        let err = skeleton.add_child(&mut model, joint, root).unwrap_err();
        assert!(matches!(err, SkeletonError::KinematicChild(b) if b == wall));
        assert!(!model.is_joint_in_skeleton(joint));
    }

    #[test]
    fn test_step_preconditions() {
        let (mut model, mut skeleton, _) = clamped();
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                skeleton.step(&mut model, &mut NoIntegration, dt, 0),
                Err(SkeletonError::InvalidTimestep(_))
            ));
        }

        let err = skeleton
            .step_with_accelerations(&mut model, &[SpatialVec::zero()], &mut NoIntegration, DT, 0)
            .unwrap_err();
        assert!(matches!(err, SkeletonError::SlotCountMismatch { expected: 2, found: 1 }));

        let extra = model.add_body(RigidBody::sphere("extra", 1.0, 0.1));
        let ground = skeleton.body(skeleton.root().unwrap()).unwrap();
        let joint = model.add_joint(RowJoint::new("extra", extra, ground).with_row(row(
            Jacobian::point(&Vec3::z(), &Vec3::zeros()),
            Jacobian::default(),
            0.0,
        )));
        let root = skeleton.root().unwrap();
        skeleton.add_child(&mut model, joint, root).unwrap();
        assert!(matches!(
            skeleton.step(&mut model, &mut NoIntegration, DT, 0),
            Err(SkeletonError::NotFinalized)
        ));
        skeleton.finalize(&mut model, &[]).unwrap();
        assert!(skeleton.step(&mut model, &mut NoIntegration, DT, 0).is_ok());
    }
}
