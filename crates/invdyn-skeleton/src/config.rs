//! Solver configuration.
//!
//! Numerical thresholds used by the skeleton solver. The defaults reproduce
//! the behavior expected by most mechanisms; tighten or relax them only when
//! a model is badly conditioned.

use invdyn_model::{LCP_MAX_VALUE, MAX_BOUND};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Thresholds and budgets for [`Skeleton`](crate::Skeleton).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkeletonConfig {
    /// Row damping scale and regularization floor factor.
    pub psd_damp_tolerance: f64,
    /// Bounds at or beyond this magnitude mark a row as unbounded.
    pub lcp_max_value: f64,
    /// Largest force bound handed to the LCP.
    pub max_bound: f64,
    /// Cholesky pivots at or below this value count as singular.
    pub cholesky_pivot_tolerance: f64,
    /// Largest tolerated `|M(i,j) - M(j,i)|` before inversion.
    pub symmetry_tolerance: f64,
    /// Depth budget of the node search stack.
    pub find_node_stack_limit: usize,
    /// LCP pivot budget per auxiliary row.
    pub max_lcp_pivots_per_row: usize,
    /// Regularization rounds above which a warning is logged.
    pub regularization_warn_iterations: usize,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            psd_damp_tolerance: 1.0e-3,
            lcp_max_value: LCP_MAX_VALUE,
            max_bound: MAX_BOUND,
            cholesky_pivot_tolerance: 1.0e-12,
            symmetry_tolerance: 1.0e-5,
            find_node_stack_limit: 1024,
            max_lcp_pivots_per_row: 64,
            regularization_warn_iterations: 8,
        }
    }
}

impl SkeletonConfig {
    /// Set the row damping scale.
    #[must_use]
    pub fn psd_damp_tolerance(mut self, tolerance: f64) -> Self {
        self.psd_damp_tolerance = tolerance;
        self
    }

    /// Set the Cholesky pivot tolerance.
    #[must_use]
    pub fn cholesky_pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.cholesky_pivot_tolerance = tolerance;
        self
    }

    /// Set the symmetry tolerance.
    #[must_use]
    pub fn symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.symmetry_tolerance = tolerance;
        self
    }

    /// Set the node search depth budget.
    #[must_use]
    pub fn find_node_stack_limit(mut self, limit: usize) -> Self {
        self.find_node_stack_limit = limit;
        self
    }

    /// Set the LCP pivot budget per auxiliary row.
    #[must_use]
    pub fn max_lcp_pivots_per_row(mut self, pivots: usize) -> Self {
        self.max_lcp_pivots_per_row = pivots;
        self
    }

    /// Set the regularization warning threshold.
    #[must_use]
    pub fn regularization_warn_iterations(mut self, iterations: usize) -> Self {
        self.regularization_warn_iterations = iterations;
        self
    }

    /// Whether a row with bounds `[low, high]` is solved by the tree pass.
    #[inline]
    pub fn is_primary(&self, low: f64, high: f64) -> bool {
        low <= -self.lcp_max_value && high >= self.lcp_max_value
    }
}
