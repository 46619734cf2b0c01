//! Per-step constraint-row derivation.
//!
//! Every tree joint (in node index order) and then every loop joint is asked
//! for its rows. Each row is turned into the solver's working form: the
//! Jacobian pair, its mass-scaled counterpart `J·M⁻¹` and the damping terms
//! that keep the joint-space mass matrix strictly definite.

use crate::config::SkeletonConfig;
use crate::error::{Result, SkeletonError};
use crate::tree::Tree;
use invdyn_math::SpatialVec;
use invdyn_model::{Body, ConstraintParams, JointId, MAX_DOF, Model, RowDescriptor};

/// Damping added to every row regardless of its stiffness.
const MIN_ROW_STIFFNESS: f64 = 1.0e-6;

/// A constraint row in solver form.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Row {
    pub joint: JointId,
    /// Position of the row within its joint.
    pub local: usize,
    /// Slots of the joint's body0 and body1.
    pub slots: (usize, usize),
    pub jt: [SpatialVec; 2],
    pub jminv: [SpatialVec; 2],
    pub diag_damp: f64,
    /// Effective mass `1 / (J·M⁻¹·Jᵀ·(1 + stiffness))`.
    pub inv_jminvjt: f64,
    pub target_accel: f64,
    pub penetration: f64,
    pub penetration_stiffness: f64,
    pub low: f64,
    pub high: f64,
    pub force: f64,
}

impl Row {
    /// `J · y` for per-slot accelerations `y`.
    pub fn project(&self, accel: &[SpatialVec]) -> f64 {
        self.jt[0].dot(&accel[self.slots.0]) + self.jt[1].dot(&accel[self.slots.1])
    }

    /// Mass-weighted coupling `Jᵢ·M⁻¹·Jⱼᵀ` with another row, counting only
    /// the bodies the two rows share.
    pub fn coupling(&self, other: &Row) -> f64 {
        let mut acc = 0.0;
        if self.slots.0 == other.slots.0 {
            acc += self.jminv[0].dot(&other.jt[0]);
        } else if self.slots.0 == other.slots.1 {
            acc += self.jminv[0].dot(&other.jt[1]);
        }
        if self.slots.1 == other.slots.1 {
            acc += self.jminv[1].dot(&other.jt[1]);
        } else if self.slots.1 == other.slots.0 {
            acc += self.jminv[1].dot(&other.jt[0]);
        }
        acc
    }
}

/// Rows produced by one joint: `rows[start..start + count]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JointInfo {
    pub joint: JointId,
    pub start: usize,
    pub count: usize,
}

/// All rows of a step, grouped by joint.
#[derive(Debug, Clone, Default)]
pub(crate) struct JacobianTable {
    /// One entry per non-root node, indexed by node index.
    pub node_infos: Vec<JointInfo>,
    pub loop_infos: Vec<JointInfo>,
    pub rows: Vec<Row>,
}

impl JacobianTable {
    pub fn infos(&self) -> impl Iterator<Item = &JointInfo> {
        self.node_infos.iter().chain(self.loop_infos.iter())
    }

    pub fn rows_of(&self, info: &JointInfo) -> &[Row] {
        &self.rows[info.start..info.start + info.count]
    }
}

/// Ask every skeleton joint for its rows and convert them to solver form.
pub(crate) fn derive_rows(
    tree: &Tree,
    model: &mut Model,
    config: &SkeletonConfig,
    timestep: f64,
    thread_index: usize,
) -> Result<JacobianTable> {
    let node_count = tree.node_count();
    let mut table = JacobianTable::default();
    let mut params = ConstraintParams::new(timestep, thread_index);

    for index in 0..node_count.saturating_sub(1) {
        let joint = tree
            .node_at(index)
            .joint
            .ok_or(SkeletonError::UnknownNode(tree.id_at(index)))?;
        let info = derive_joint(model, config, &mut params, &mut table.rows, joint, tree.joint_slots(index))?;
        table.node_infos.push(info);
    }

    for l in tree.loop_joints() {
        let info = derive_joint(model, config, &mut params, &mut table.rows, l.joint, l.slots)?;
        table.loop_infos.push(info);
    }

    Ok(table)
}

fn derive_joint(
    model: &mut Model,
    config: &SkeletonConfig,
    params: &mut ConstraintParams,
    rows: &mut Vec<Row>,
    joint: JointId,
    slots: (usize, usize),
) -> Result<JointInfo> {
    params.clear();
    model.derive_joint_rows(joint, params)?;
    if params.requested_rows() > MAX_DOF {
        return Err(SkeletonError::TooManyRows {
            joint,
            rows: params.requested_rows(),
        });
    }

    let (b0, b1) = model.joint_bodies(joint)?;
    let body0 = model.body(b0).ok_or(SkeletonError::UnknownBody(b0))?;
    let body1 = model.body(b1).ok_or(SkeletonError::UnknownBody(b1))?;

    let start = rows.len();
    for (local, desc) in params.rows().iter().enumerate() {
        rows.push(solver_row(config, joint, local, slots, desc, body0, body1)?);
    }
    Ok(JointInfo {
        joint,
        start,
        count: rows.len() - start,
    })
}

fn solver_row(
    config: &SkeletonConfig,
    joint: JointId,
    local: usize,
    slots: (usize, usize),
    desc: &RowDescriptor,
    body0: &dyn Body,
    body1: &dyn Body,
) -> Result<Row> {
    if !(0.0..=1.0).contains(&desc.joint_stiffness) {
        return Err(SkeletonError::InvalidStiffness {
            joint,
            row: local,
            stiffness: desc.joint_stiffness,
        });
    }
    let stiffness = config.psd_damp_tolerance * (1.0 - desc.joint_stiffness) + MIN_ROW_STIFFNESS;

    let jt = [desc.jacobian.body0.to_spatial(), desc.jacobian.body1.to_spatial()];
    let jminv = [
        jt[0].scale_by_inverse_mass(body0.inv_mass(), &body0.inv_world_inertia()),
        jt[1].scale_by_inverse_mass(body1.inv_mass(), &body1.inv_world_inertia()),
    ];
    let diag = jminv[0].dot(&jt[0]) + jminv[1].dot(&jt[1]);
    if !(diag > 0.0 && diag.is_finite()) {
        return Err(SkeletonError::NonPositiveDiagonal { joint, row: local, diag });
    }

    let jminvjt = diag * (1.0 + stiffness);
    Ok(Row {
        joint,
        local,
        slots,
        jt,
        jminv,
        diag_damp: diag * stiffness,
        inv_jminvjt: 1.0 / jminvjt,
        target_accel: desc.target_accel,
        penetration: desc.penetration,
        penetration_stiffness: desc.penetration_stiffness,
        low: desc.low,
        high: desc.high,
        force: 0.0,
    })
}
