//! Joint targets, bounded and loop-row resolution, force scatter.

use crate::assembly::{CondensedSystem, scatter_primary};
use crate::config::SkeletonConfig;
use crate::error::Result;
use crate::factor::Factorization;
use crate::jacobian::JacobianTable;
use crate::solve::{ForcePair, solve_tree};
use crate::tree::Tree;
use invdyn_math::{DVec, SpatialVec, Vec3, solve_box_lcp};
use invdyn_model::{BodyId, JointId, Model};
use log::trace;

/// Accumulated constraint force acting on the body in one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotForce {
    pub body: BodyId,
    pub linear: Vec3,
    pub angular: Vec3,
}

impl SlotForce {
    fn new(body: BodyId) -> Self {
        Self {
            body,
            linear: Vec3::zeros(),
            angular: Vec3::zeros(),
        }
    }

    /// `[linear; angular]` as a spatial vector.
    pub fn to_spatial(&self) -> SpatialVec {
        SpatialVec::new(self.linear, self.angular)
    }
}

/// Resolved force of one constraint row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowForce {
    pub joint: JointId,
    /// Position of the row within its joint.
    pub row: usize,
    pub force: f64,
    /// Row effective mass `1 / (J·M⁻¹·Jᵀ·(1 + stiffness))`.
    pub effective_mass: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Resolution {
    pub lcp_pivots: usize,
    pub lcp_fast_path: bool,
}

/// `a = J·y − target_accel − penetration_stiffness·penetration` for every
/// row of the table.
pub(crate) fn joint_targets(table: &JacobianTable, accel: &[SpatialVec]) -> Vec<f64> {
    table
        .rows
        .iter()
        .map(|row| row.project(accel) - row.target_accel - row.penetration_stiffness * row.penetration)
        .collect()
}

/// Solve for every row force and add it onto `Row::force`.
pub(crate) fn resolve(
    tree: &Tree,
    table: &mut JacobianTable,
    factors: &Factorization,
    system: &CondensedSystem,
    targets: &[f64],
    config: &SkeletonConfig,
) -> Result<Resolution> {
    let p = system.layout.primary;
    let a = system.layout.auxiliary;
    let primary_rows = system.primary_rows();

    let n = system.layout.nodes;
    let mut accel = vec![ForcePair::zero(); n];
    let mut force = vec![ForcePair::zero(); n];
    scatter_primary(&factors.nodes, &mut accel, |entry| targets[primary_rows[entry]]);
    solve_tree(tree, &factors.nodes, &accel, &mut force);

    let mut primary = DVec::zeros(p);
    let mut entry = 0;
    for (f, fac) in force.iter().zip(&factors.nodes) {
        for k in 0..fac.dof {
            primary[entry] = f.joint[k];
            entry += 1;
        }
    }

    let mut resolution = Resolution::default();
    if a > 0 {
        let aux_rows = system.auxiliary_rows();
        let mut b = DVec::from_fn(a, |i, _| -targets[aux_rows[i]]);
        b -= &system.m10 * &primary;

        let mut low = DVec::zeros(a);
        let mut high = DVec::zeros(a);
        for (i, &r) in aux_rows.iter().enumerate() {
            let row = &table.rows[r];
            low[i] = (row.low - row.force).clamp(-config.max_bound, 0.0);
            high[i] = (row.high - row.force).clamp(0.0, config.max_bound);
        }

        let max_pivots = config.max_lcp_pivots_per_row.saturating_mul(a);
        let solution = solve_box_lcp(&system.m11, &system.factor, &b, &low, &high, max_pivots)?;
        trace!(
            "auxiliary LCP ({a} rows): {} pivots, fast path {}",
            solution.pivots, solution.fast_path
        );

        primary += system.delta_force.tr_mul(&solution.x);
        for (i, &r) in aux_rows.iter().enumerate() {
            table.rows[r].force += solution.x[i];
        }
        resolution.lcp_pivots = solution.pivots;
        resolution.lcp_fast_path = solution.fast_path;
    }

    for (j, &r) in primary_rows.iter().enumerate() {
        table.rows[r].force += primary[j];
    }
    Ok(resolution)
}

/// Write row forces into joint feedback and sum them per slot.
pub(crate) fn scatter(tree: &Tree, table: &JacobianTable, model: &mut Model) -> Result<(Vec<SlotForce>, Vec<RowForce>)> {
    let mut slots: Vec<SlotForce> = (0..tree.slot_count()).map(|s| SlotForce::new(tree.slot_body(s))).collect();
    let mut rows = Vec::with_capacity(table.rows.len());

    for info in table.infos() {
        model.reset_joint_feedback(info.joint, info.count)?;
        for row in table.rows_of(info) {
            for (side, slot) in [(0, row.slots.0), (1, row.slots.1)] {
                let jt = &row.jt[side];
                slots[slot].linear += jt.linear() * row.force;
                slots[slot].angular += jt.angular() * row.force;
            }
            model.set_joint_feedback(row.joint, row.local, row.force)?;
            rows.push(RowForce {
                joint: row.joint,
                row: row.local,
                force: row.force,
                effective_mass: row.inv_jminvjt,
            });
        }
    }
    Ok((slots, rows))
}
