//! Dense Cholesky factorization with damping regularization.
//!
//! The condensed mass matrix of an articulated system is symmetric positive
//! semi-definite. Redundant constraint rows make it singular, so the solver
//! factors it through [`regularized_cholesky`], which keeps adding a growing
//! per-row damping to the diagonal until the factorization succeeds.

use crate::{DMat, DVec};
use log::trace;
use thiserror::Error;

/// Failure of a dense factorization.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CholeskyError {
    /// A pivot fell at or below the tolerance (or was not finite).
    #[error("matrix is not positive definite: pivot {index} = {pivot:e}")]
    NotPositiveDefinite { index: usize, pivot: f64 },
    /// The damping sequence stopped being positive and finite.
    #[error("regularization diverged after {iterations} damping iterations")]
    Diverged { iterations: usize },
}

/// In-place Cholesky (LL^T) factorization. Overwrites the lower triangle of `m`
/// with L. The upper triangle is left unchanged.
///
/// A pivot `≤ pivot_tolerance` is treated as a failure, so singular matrices
/// are rejected even when rounding leaves a tiny positive diagonal.
pub fn cholesky_in_place(m: &mut DMat, pivot_tolerance: f64) -> Result<(), CholeskyError> {
    let n = m.nrows();
    for j in 0..n {
        // Diagonal: L[j,j] = sqrt(M[j,j] - Σ(L[j,k]² for k < j))
        let mut diag = m[(j, j)];
        for k in 0..j {
            diag -= m[(j, k)] * m[(j, k)];
        }
        if !diag.is_finite() || diag <= pivot_tolerance {
            return Err(CholeskyError::NotPositiveDefinite {
                index: j,
                pivot: diag,
            });
        }
        let ljj = diag.sqrt();
        m[(j, j)] = ljj;

        // Off-diagonal: L[i,j] = (M[i,j] - Σ(L[i,k]·L[j,k] for k < j)) / L[j,j]
        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= m[(i, k)] * m[(j, k)];
            }
            m[(i, j)] = sum / ljj;
        }
    }
    Ok(())
}

/// Solve L·L^T·x = b in place, where L is stored in the lower triangle of `l`.
/// On entry `x` contains b; on exit `x` contains the solution.
pub fn cholesky_solve_in_place(l: &DMat, x: &mut DVec) {
    let n = l.nrows();

    // Forward substitution: L·y = b
    for j in 0..n {
        for k in 0..j {
            x[j] -= l[(j, k)] * x[k];
        }
        x[j] /= l[(j, j)];
    }

    // Back substitution: L^T·z = y
    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= l[(k, j)] * x[k];
        }
        x[j] /= l[(j, j)];
    }
}

/// Result of [`regularized_cholesky`].
#[derive(Debug, Clone)]
pub struct RegularizedFactor {
    /// Lower-triangular factor; the strict upper triangle is zero.
    pub factor: DMat,
    /// Number of damping rounds applied before the factorization succeeded.
    pub iterations: usize,
}

/// Factor `matrix`, regularizing it until it is positive definite.
///
/// Each failed attempt doubles every entry of `damping` and adds it to the
/// matching diagonal entry of `matrix`, so on return `matrix` holds the
/// regularized system the factor belongs to. Fails with
/// [`CholeskyError::Diverged`] once any damping value is no longer a positive
/// finite number.
pub fn regularized_cholesky(
    matrix: &mut DMat,
    damping: &mut DVec,
    pivot_tolerance: f64,
) -> Result<RegularizedFactor, CholeskyError> {
    let n = matrix.nrows();
    debug_assert_eq!(damping.len(), n);

    let mut iterations = 0;
    loop {
        let mut factor = matrix.clone();
        match cholesky_in_place(&mut factor, pivot_tolerance) {
            Ok(()) => {
                factor.fill_upper_triangle(0.0, 1);
                return Ok(RegularizedFactor { factor, iterations });
            }
            Err(err) => {
                trace!("cholesky attempt {iterations} failed: {err}");
                if damping.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
                    return Err(CholeskyError::Diverged { iterations });
                }
                for i in 0..n {
                    damping[i] *= 2.0;
                    matrix[(i, i)] += damping[i];
                }
                iterations += 1;
            }
        }
    }
}

/// Largest absolute difference between `m(i, j)` and `m(j, i)` over an
/// `n`×`n` block accessed through `at`.
pub fn max_asymmetry(n: usize, at: impl Fn(usize, usize) -> f64) -> f64 {
    let mut worst = 0.0f64;
    for i in 0..n {
        for j in (i + 1)..n {
            worst = worst.max((at(i, j) - at(j, i)).abs());
        }
    }
    worst
}
