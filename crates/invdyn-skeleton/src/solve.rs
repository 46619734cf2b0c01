//! Two-pass O(n) solve of the tree's KKT system.
//!
//! Solves
//!
//! ```text
//! | M   -Jᵀ | | acc |   | body  |
//! | -J  -D  | | λ   | = | joint |
//! ```
//!
//! over the primary rows, using the per-node factors from
//! [`factorize`](crate::factor::factorize). The forward pass eliminates
//! joints from the leaves toward the root; the backward pass substitutes
//! from the root back down.

use crate::factor::NodeFactor;
use crate::tree::Tree;
use invdyn_math::Vec6;

/// Joint-space and body-space halves of one node's right-hand side or
/// solution.
///
/// As input, `joint[..dof]` holds the target of each primary row and `body`
/// a body-space force. As output, `joint[..dof]` holds the primary row
/// forces and `body` the resulting `[linear; angular]` acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForcePair {
    pub joint: Vec6,
    pub body: Vec6,
}

impl ForcePair {
    pub fn zero() -> Self {
        Self::default()
    }
}

pub(crate) fn solve_tree(tree: &Tree, factors: &[NodeFactor], accel: &[ForcePair], force: &mut [ForcePair]) {
    let n = factors.len();
    debug_assert_eq!(accel.len(), n);
    debug_assert_eq!(force.len(), n);
    if n == 0 {
        return;
    }
    let root = n - 1;

    // Forward: children before parents.
    for i in 0..root {
        let mut f = accel[i];
        gather_children(tree, factors, force, i, &mut f);
        let fac = &factors[i];
        for k in 0..fac.dof {
            f.joint[k] -= fac.body_jt[k].dot(&f.body);
        }
        force[i] = f;
    }

    let mut f = accel[root];
    gather_children(tree, factors, force, root, &mut f);
    f.body = factors[root].body_inv_mass.data * f.body;
    force[root] = f;

    // Backward: parents before children.
    for i in (0..root).rev() {
        let fac = &factors[i];
        let parent = tree
            .node_at(i)
            .parent
            .map_or(root, |p| tree.node(p).index);
        let parent_body = force[parent].body;

        let mut f = force[i];
        let mut joint = Vec6::zeros();
        for k in 0..fac.dof {
            for l in 0..fac.dof {
                joint[k] += fac.joint_inv_mass[(k, l)] * f.joint[l];
            }
            joint[k] -= parent_body.dot(&fac.joint_jt[k]);
        }
        f.joint = joint;

        f.body = fac.body_inv_mass.data * f.body;
        for k in 0..fac.dof {
            f.body -= fac.body_jt[k] * f.joint[k];
        }
        force[i] = f;
    }
}

/// Add every child's eliminated joint force into `f.body`.
fn gather_children(tree: &Tree, factors: &[NodeFactor], force: &[ForcePair], index: usize, f: &mut ForcePair) {
    for &child in &tree.node_at(index).children {
        let c = tree.node(child).index;
        let cf = &factors[c];
        for k in 0..cf.dof {
            f.body -= cf.joint_jt[k] * force[c].joint[k];
        }
    }
}
