//! Per-node reduction of the articulated mass (Featherstone-style).
//!
//! Nodes are processed children first. Each node's 6×6 body mass absorbs
//! the reduced contribution of its children's joints, is inverted, and the
//! node's own primary rows are projected through it to form the joint mass
//! `S = -(D + J·M⁻¹·Jᵀ)`.
//!
//! # Row partition
//!
//! A node's rows are split in place through an `[u8; 8]` permutation:
//! unbounded rows stay at the front and become the node's `dof` primary
//! rows, bounded rows are swapped to the back and handed to the condensed
//! (auxiliary) system.

use crate::config::SkeletonConfig;
use crate::error::{Result, SkeletonError};
use crate::jacobian::JacobianTable;
use crate::tree::Tree;
use invdyn_math::{DMat, Mat6, SpatialMat, Vec6, max_asymmetry};
use invdyn_model::{MAX_DOF, Model};

const ORDINALS_INIT: [u8; 8] = [0, 1, 2, 3, 4, 5, 0, 0];

/// Reduced spatial quantities of one node for the current step.
#[derive(Debug, Clone)]
pub(crate) struct NodeFactor {
    /// Number of primary rows.
    pub dof: usize,
    /// Total rows of the node's joint (primary + auxiliary).
    pub rows: usize,
    /// Row order: `ordinals[..dof]` primary, `ordinals[dof..rows]` auxiliary.
    pub ordinals: [u8; 8],
    pub body_mass: SpatialMat,
    pub body_inv_mass: SpatialMat,
    pub joint_mass: Mat6,
    pub joint_inv_mass: Mat6,
    /// Own-body rows pre-multiplied by `M⁻¹`.
    pub body_jt: [Vec6; MAX_DOF],
    /// Parent-body rows as derived (negated Jacobian side).
    pub parent_jt: [Vec6; MAX_DOF],
    /// Parent-body rows pre-multiplied by `S⁻¹`.
    pub joint_jt: [Vec6; MAX_DOF],
}

impl NodeFactor {
    fn new() -> Self {
        Self {
            dof: 0,
            rows: 0,
            ordinals: ORDINALS_INIT,
            body_mass: SpatialMat::zero(),
            body_inv_mass: SpatialMat::zero(),
            joint_mass: Mat6::zeros(),
            joint_inv_mass: Mat6::zeros(),
            body_jt: [Vec6::zeros(); MAX_DOF],
            parent_jt: [Vec6::zeros(); MAX_DOF],
            joint_jt: [Vec6::zeros(); MAX_DOF],
        }
    }

    /// Row-table position of the node's `k`-th row in partitioned order.
    pub fn row(&self, start: usize, k: usize) -> usize {
        start + self.ordinals[k] as usize
    }

    pub fn auxiliary(&self) -> usize {
        self.rows - self.dof
    }
}

/// Factorization of the whole tree, indexed by node index.
#[derive(Debug, Clone)]
pub(crate) struct Factorization {
    pub nodes: Vec<NodeFactor>,
    pub primary: usize,
    /// Bounded rows of tree joints (loop rows are not included).
    pub auxiliary: usize,
}

pub(crate) fn factorize(tree: &Tree, model: &Model, table: &JacobianTable, config: &SkeletonConfig) -> Result<Factorization> {
    let n = tree.node_count();
    let mut nodes: Vec<NodeFactor> = Vec::with_capacity(n);
    let mut primary = 0;
    let mut auxiliary = 0;

    for index in 0..n {
        let node = tree.node_at(index);
        let body = model.body(node.body).ok_or(SkeletonError::UnknownBody(node.body))?;
        let mut f = NodeFactor::new();
        let dynamic = !body.is_kinematic();

        if dynamic {
            f.body_mass = SpatialMat::rigid_body(body.mass(), &body.inertia_matrix());
        }

        let mut own_rows = [Vec6::zeros(); MAX_DOF];
        if node.joint.is_some() {
            let info = table.node_infos[index];
            let rows = table.rows_of(&info);
            f.rows = rows.len();

            let mut count = rows.len();
            let mut k = 0;
            while k < count {
                let row = &rows[f.ordinals[k] as usize];
                if config.is_primary(row.low, row.high) {
                    k += 1;
                } else {
                    f.ordinals.swap(k, count - 1);
                    count -= 1;
                }
            }
            f.dof = count;
            if !(1..=MAX_DOF).contains(&count) {
                return Err(SkeletonError::DofOutOfRange {
                    node: tree.id_at(index),
                    dof: count,
                });
            }

            for k in 0..f.dof {
                let row = &rows[f.ordinals[k] as usize];
                let (own, parent) = if node.swap { (1, 0) } else { (0, 1) };
                own_rows[k] = -row.jt[own].data;
                f.parent_jt[k] = -row.jt[parent].data;
                f.joint_mass[(k, k)] = -row.diag_damp;
            }
            primary += f.dof;
            auxiliary += f.auxiliary();
        }

        if dynamic {
            for &child in &node.children {
                let c = &nodes[tree.node(child).index];
                for k in 0..c.dof {
                    f.body_mass.sub_outer(&c.parent_jt[k], &c.joint_jt[k]);
                }
            }
            check_symmetric(6, |i, j| f.body_mass.data[(i, j)], "body mass", config)?;
            f.body_inv_mass = f.body_mass.generalized_inverse();
        }

        if node.joint.is_some() {
            for k in 0..f.dof {
                f.body_jt[k] = f.body_inv_mass.data * own_rows[k];
            }
            for i in 0..f.dof {
                for j in 0..f.dof {
                    f.joint_mass[(i, j)] -= own_rows[i].dot(&f.body_jt[j]);
                }
            }
            let dof = f.dof;
            check_symmetric(dof, |i, j| f.joint_mass[(i, j)], "joint mass", config)?;

            let block = DMat::from_fn(dof, dof, |i, j| f.joint_mass[(i, j)]);
            let inv = block
                .try_inverse()
                .ok_or(SkeletonError::SingularJointMass(tree.id_at(index)))?;
            for i in 0..dof {
                for j in 0..dof {
                    f.joint_inv_mass[(i, j)] = inv[(i, j)];
                }
            }
            for i in 0..dof {
                f.joint_jt[i] = (0..dof).fold(Vec6::zeros(), |acc, j| acc + f.parent_jt[j] * inv[(i, j)]);
            }
        }

        nodes.push(f);
    }

    Ok(Factorization {
        nodes,
        primary,
        auxiliary,
    })
}

fn check_symmetric(n: usize, at: impl Fn(usize, usize) -> f64, what: &'static str, config: &SkeletonConfig) -> Result<()> {
    let deviation = max_asymmetry(n, at);
    if deviation > config.symmetry_tolerance {
        return Err(SkeletonError::AsymmetricMatrix { what, deviation });
    }
    Ok(())
}
