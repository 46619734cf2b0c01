//! Condensed mass matrix of the auxiliary rows.
//!
//! Bounded tree rows and every loop row cannot be handled by the tree
//! solve. Their effect is condensed into a dense system over the `A`
//! auxiliary rows:
//!
//! ```text
//! M11 = G_AA − G_AP · G_PP⁻¹ · G_PA        (A × A)
//! M10 = G_AP                               (A × P)
//! delta_force = −G_PP⁻¹ · G_PA             (A × P, one row per auxiliary row)
//! ```
//!
//! where `G = J·M⁻¹·Jᵀ + D` over the primary (`P`) and auxiliary rows.
//! `G_PP⁻¹` is never formed: row `i` of `delta_force` is the primary
//! response of a tree solve driven by row `i` of `M10`.

use crate::config::SkeletonConfig;
use crate::error::{Result, SkeletonError};
use crate::factor::Factorization;
use crate::jacobian::{JacobianTable, Row};
use crate::solve::{ForcePair, solve_tree};
use crate::tree::Tree;
use invdyn_math::{DMat, DVec, max_asymmetry, regularized_cholesky};
use log::{trace, warn};

/// Sizes of every per-step buffer.
///
/// Computed once from the row table and reused when the buffers are
/// populated, so sizing and filling cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScratchLayout {
    pub nodes: usize,
    pub slots: usize,
    pub rows: usize,
    pub primary: usize,
    pub auxiliary: usize,
}

impl ScratchLayout {
    pub(crate) fn measure(tree: &Tree, table: &JacobianTable, config: &SkeletonConfig) -> Self {
        let primary = table
            .node_infos
            .iter()
            .flat_map(|info| table.rows_of(info))
            .filter(|row| config.is_primary(row.low, row.high))
            .count();
        Self {
            nodes: tree.node_count(),
            slots: tree.slot_count(),
            rows: table.rows.len(),
            primary,
            auxiliary: table.rows.len() - primary,
        }
    }
}

/// Dense auxiliary system of one step.
#[derive(Debug, Clone)]
pub(crate) struct CondensedSystem {
    pub layout: ScratchLayout,
    /// Row-table positions: primary rows, then auxiliary tree rows, then loop rows.
    pub order: Vec<usize>,
    pub m11: DMat,
    pub factor: DMat,
    pub m10: DMat,
    pub delta_force: DMat,
    pub regularization_iterations: usize,
}

impl CondensedSystem {
    pub fn primary_rows(&self) -> &[usize] {
        &self.order[..self.layout.primary]
    }

    pub fn auxiliary_rows(&self) -> &[usize] {
        &self.order[self.layout.primary..]
    }
}

/// Row ordering used by every dense buffer.
pub(crate) fn row_order(table: &JacobianTable, factors: &Factorization, layout: &ScratchLayout) -> Vec<usize> {
    let mut order = Vec::with_capacity(layout.rows);
    for (info, f) in table.node_infos.iter().zip(&factors.nodes) {
        order.extend((0..f.dof).map(|k| f.row(info.start, k)));
    }
    debug_assert_eq!(order.len(), layout.primary);
    for (info, f) in table.node_infos.iter().zip(&factors.nodes) {
        order.extend((f.dof..f.rows).map(|k| f.row(info.start, k)));
    }
    for info in &table.loop_infos {
        order.extend(info.start..info.start + info.count);
    }
    debug_assert_eq!(order.len(), layout.rows);
    order
}

pub(crate) fn assemble(
    tree: &Tree,
    table: &JacobianTable,
    factors: &Factorization,
    layout: ScratchLayout,
    config: &SkeletonConfig,
) -> Result<CondensedSystem> {
    debug_assert_eq!(factors.primary, layout.primary);
    let order = row_order(table, factors, &layout);
    let p = layout.primary;
    let a = layout.auxiliary;

    let mut system = CondensedSystem {
        layout,
        order,
        m11: DMat::zeros(a, a),
        factor: DMat::zeros(a, a),
        m10: DMat::zeros(a, p),
        delta_force: DMat::zeros(a, p),
        regularization_iterations: 0,
    };
    if a == 0 {
        return Ok(system);
    }

    let rows: Vec<&Row> = system.order.iter().map(|&r| &table.rows[r]).collect();
    let (primary_rows, aux_rows) = rows.split_at(p);

    let mut damp = DVec::zeros(a);
    for (i, row_i) in aux_rows.iter().enumerate() {
        let diag = row_i.coupling(row_i) + 2.0 * row_i.diag_damp;
        system.m11[(i, i)] = diag;
        damp[i] = diag * 2.0 * config.psd_damp_tolerance;
        for (j, row_j) in aux_rows.iter().enumerate().skip(i + 1) {
            let value = row_i.coupling(row_j);
            system.m11[(i, j)] = value;
            system.m11[(j, i)] = value;
        }
        for (j, row_j) in primary_rows.iter().enumerate() {
            system.m10[(i, j)] = row_i.coupling(row_j);
        }
    }

    let n = layout.nodes;
    let mut accel = vec![ForcePair::zero(); n];
    let mut force = vec![ForcePair::zero(); n];
    for i in 0..a {
        scatter_primary(&factors.nodes, &mut accel, |entry| system.m10[(i, entry)]);
        solve_tree(tree, &factors.nodes, &accel, &mut force);
        let mut entry = 0;
        for (f, fac) in force.iter().zip(&factors.nodes) {
            for k in 0..fac.dof {
                system.delta_force[(i, entry)] = f.joint[k];
                entry += 1;
            }
        }

        let diag = system.m11[(i, i)] + system.delta_force.row(i).dot(&system.m10.row(i));
        system.m11[(i, i)] = diag.max(damp[i]);
        for j in (i + 1)..a {
            let value = system.delta_force.row(i).dot(&system.m10.row(j));
            system.m11[(i, j)] += value;
            system.m11[(j, i)] += value;
        }
    }

    let deviation = max_asymmetry(a, |i, j| system.m11[(i, j)]);
    if deviation > config.symmetry_tolerance {
        return Err(SkeletonError::AsymmetricMatrix {
            what: "condensed mass",
            deviation,
        });
    }

    let regularized = regularized_cholesky(&mut system.m11, &mut damp, config.cholesky_pivot_tolerance)
        .map_err(SkeletonError::RegularizationDiverged)?;
    system.factor = regularized.factor;
    system.regularization_iterations = regularized.iterations;
    if regularized.iterations > config.regularization_warn_iterations {
        warn!(
            "condensed mass matrix ({a}×{a}) needed {} regularization rounds",
            regularized.iterations
        );
    } else if regularized.iterations > 0 {
        trace!("condensed mass matrix regularized in {} rounds", regularized.iterations);
    }
    Ok(system)
}

/// Load primary-row joint targets from `value(entry)`, zeroing the rest.
pub(crate) fn scatter_primary(
    factors: &[crate::factor::NodeFactor],
    accel: &mut [ForcePair],
    value: impl Fn(usize) -> f64,
) {
    let mut entry = 0;
    for (a, fac) in accel.iter_mut().zip(factors) {
        *a = ForcePair::zero();
        for k in 0..fac.dof {
            a.joint[k] = value(entry);
            entry += 1;
        }
    }
}
