//! Dantzig pivoting solver for the bounded (box) linear complementarity problem.
//!
//! Given a symmetric positive definite `A`, a right-hand side `b` and bounds
//! `low ≤ 0 ≤ high`, find `x` with residual `w = A·x − b` such that for every
//! index `i`:
//!
//! - `x_i = low_i` and `w_i ≥ 0`, or
//! - `x_i = high_i` and `w_i ≤ 0`, or
//! - `low_i < x_i < high_i` and `w_i = 0`.
//!
//! # Algorithm
//!
//! 1. Solve `A·x = b` with the supplied Cholesky factor. If the result lies
//!    inside the box it is the answer.
//! 2. Otherwise start from `x = 0` and drive one index at a time toward
//!    `w_d = 0` (Baraff's incremental principal pivoting). While driving `d`,
//!    the free set `F` keeps `w_F = 0` by moving along
//!    `Δx_F = −A_FF⁻¹·A_Fd·Δx_d`; clamped indices stay at their bound.
//! 3. Each step is the largest one that keeps every complementarity
//!    condition valid. The blocking index changes set (free ↔ clamped) and
//!    the drive continues until `d` itself is satisfied.

use crate::linalg::cholesky_solve_in_place;
use crate::{DMat, DVec};
use log::trace;
use nalgebra as na;
use thiserror::Error;

/// Relative tolerance for complementarity and step-direction tests.
const ZERO_TOLERANCE: f64 = 1e-12;

/// Failure of the LCP solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LcpError {
    /// The pivot budget was exhausted before every index was satisfied.
    #[error("box LCP did not converge within {pivots} pivots")]
    IterationLimit { pivots: usize },
    /// The free-set subsystem could not be solved.
    #[error("box LCP free-set subsystem of size {size} is singular")]
    SingularSubsystem { size: usize },
    /// No blocking index was found for a driving direction.
    #[error("box LCP drive of index {index} is unbounded")]
    Unbounded { index: usize },
}

/// Output of [`solve_box_lcp`].
#[derive(Debug, Clone)]
pub struct LcpSolution {
    /// The solution vector.
    pub x: DVec,
    /// Number of pivot steps taken (zero on the fast path).
    pub pivots: usize,
    /// Whether the unconstrained solution already satisfied the bounds.
    pub fast_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexState {
    Pending,
    Free,
    AtLow,
    AtHigh,
}

#[derive(Debug, Clone, Copy)]
enum Blocking {
    DriveSatisfied,
    DriveAtBound,
    FreeToBound(usize),
    ClampedToFree(usize),
}

/// Solve the box LCP `(A, b, low, high)`.
///
/// `factor` must be the lower-triangular Cholesky factor of `a`. At most
/// `max_pivots` pivot steps are taken before giving up with
/// [`LcpError::IterationLimit`].
pub fn solve_box_lcp(
    a: &DMat,
    factor: &DMat,
    b: &DVec,
    low: &DVec,
    high: &DVec,
    max_pivots: usize,
) -> Result<LcpSolution, LcpError> {
    let n = b.len();
    debug_assert_eq!(a.nrows(), n);
    debug_assert_eq!(low.len(), n);
    debug_assert_eq!(high.len(), n);

    let mut x = b.clone();
    cholesky_solve_in_place(factor, &mut x);
    if (0..n).all(|i| low[i] <= x[i] && x[i] <= high[i]) {
        return Ok(LcpSolution {
            x,
            pivots: 0,
            fast_path: true,
        });
    }

    let scale = 1.0 + b.amax();
    let w_tolerance = ZERO_TOLERANCE * scale;

    let mut x = DVec::zeros(n);
    let mut w = -b;
    let mut state = vec![IndexState::Pending; n];
    let mut pivots = 0;

    for d in 0..n {
        loop {
            if w[d].abs() <= w_tolerance {
                w[d] = 0.0;
                state[d] = IndexState::Free;
                break;
            }
            let dir = if w[d] < 0.0 { 1.0 } else { -1.0 };
            if dir > 0.0 && x[d] >= high[d] {
                x[d] = high[d];
                state[d] = IndexState::AtHigh;
                break;
            }
            if dir < 0.0 && x[d] <= low[d] {
                x[d] = low[d];
                state[d] = IndexState::AtLow;
                break;
            }

            let dx = drive_direction(a, &state, d, dir)?;
            let dw = a * &dx;

            let (alpha, blocking) = max_step(&x, &w, &dx, &dw, low, high, &state, d, dir)
                .ok_or(LcpError::Unbounded { index: d })?;

            x.axpy(alpha, &dx, 1.0);
            w.axpy(alpha, &dw, 1.0);

            pivots += 1;
            if pivots > max_pivots {
                return Err(LcpError::IterationLimit { pivots });
            }

            match blocking {
                Blocking::DriveSatisfied => {
                    w[d] = 0.0;
                    state[d] = IndexState::Free;
                    break;
                }
                Blocking::DriveAtBound => {
                    if dir > 0.0 {
                        x[d] = high[d];
                        state[d] = IndexState::AtHigh;
                    } else {
                        x[d] = low[d];
                        state[d] = IndexState::AtLow;
                    }
                    break;
                }
                Blocking::FreeToBound(i) => {
                    if dx[i] > 0.0 {
                        x[i] = high[i];
                        state[i] = IndexState::AtHigh;
                    } else {
                        x[i] = low[i];
                        state[i] = IndexState::AtLow;
                    }
                }
                Blocking::ClampedToFree(i) => {
                    w[i] = 0.0;
                    state[i] = IndexState::Free;
                }
            }
        }
    }

    trace!("box LCP of size {n} solved in {pivots} pivots");
    Ok(LcpSolution {
        x,
        pivots,
        fast_path: false,
    })
}

/// Direction that moves `x_d` by `dir` while holding `w = 0` on the free set.
fn drive_direction(a: &DMat, state: &[IndexState], d: usize, dir: f64) -> Result<DVec, LcpError> {
    let n = state.len();
    let free: Vec<usize> = (0..n).filter(|&i| state[i] == IndexState::Free).collect();

    let mut dx = DVec::zeros(n);
    dx[d] = dir;
    if free.is_empty() {
        return Ok(dx);
    }

    let size = free.len();
    let a_ff = DMat::from_fn(size, size, |r, c| a[(free[r], free[c])]);
    let rhs = DVec::from_fn(size, |r, _| -a[(free[r], d)] * dir);

    let solved = match na::Cholesky::new(a_ff.clone()) {
        Some(chol) => chol.solve(&rhs),
        None => a_ff
            .lu()
            .solve(&rhs)
            .ok_or(LcpError::SingularSubsystem { size })?,
    };
    for (k, &i) in free.iter().enumerate() {
        dx[i] = solved[k];
    }
    Ok(dx)
}

/// Largest admissible step along `(dx, dw)` and the index that blocks it.
#[allow(clippy::too_many_arguments)]
fn max_step(
    x: &DVec,
    w: &DVec,
    dx: &DVec,
    dw: &DVec,
    low: &DVec,
    high: &DVec,
    state: &[IndexState],
    d: usize,
    dir: f64,
) -> Option<(f64, Blocking)> {
    let mut alpha = f64::INFINITY;
    let mut blocking = None;

    // The driving index reaches w_d = 0.
    if dw[d] * dir > ZERO_TOLERANCE {
        alpha = -w[d] / dw[d];
        blocking = Some(Blocking::DriveSatisfied);
    }

    // The driving index reaches its bound.
    let gap = if dir > 0.0 {
        high[d] - x[d]
    } else {
        x[d] - low[d]
    };
    if gap < alpha {
        alpha = gap;
        blocking = Some(Blocking::DriveAtBound);
    }

    for (i, s) in state.iter().enumerate() {
        if i == d {
            continue;
        }
        let step = match s {
            IndexState::Free if dx[i] > ZERO_TOLERANCE => (high[i] - x[i]) / dx[i],
            IndexState::Free if dx[i] < -ZERO_TOLERANCE => (low[i] - x[i]) / dx[i],
            IndexState::AtLow if dw[i] < -ZERO_TOLERANCE => -w[i] / dw[i],
            IndexState::AtHigh if dw[i] > ZERO_TOLERANCE => -w[i] / dw[i],
            _ => continue,
        };
        if step < alpha {
            alpha = step;
            blocking = Some(match s {
                IndexState::Free => Blocking::FreeToBound(i),
                _ => Blocking::ClampedToFree(i),
            });
        }
    }

    blocking.map(|b| (alpha.max(0.0), b))
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::linalg::cholesky_in_place;
    use proptest::prelude::*;

    const TOL: f64 = 1e-6;

    fn arb_problem() -> impl Strategy<Value = (DMat, DVec, DVec, DVec)> {
        (1usize..7).prop_flat_map(|n| {
            (
                proptest::collection::vec(-1.0..1.0f64, n * n),
                proptest::collection::vec(-5.0..5.0f64, n),
                proptest::collection::vec(-2.0..0.0f64, n),
                proptest::collection::vec(0.0..2.0f64, n),
            )
                .prop_map(move |(m, b, low, high)| {
                    let g = DMat::from_vec(n, n, m);
                    let a = &g * g.transpose() + DMat::identity(n, n) * (n as f64) * 0.1;
                    (a, DVec::from_vec(b), DVec::from_vec(low), DVec::from_vec(high))
                })
        })
    }

    proptest! {
        #[test]
        fn solution_satisfies_box_complementarity((a, b, low, high) in arb_problem()) {
            let mut l = a.clone();
            cholesky_in_place(&mut l, 1e-12).unwrap();
            l.fill_upper_triangle(0.0, 1);

            let n = b.len();
            let sol = solve_box_lcp(&a, &l, &b, &low, &high, 64 * n).unwrap();
            let w = &a * &sol.x - &b;
            for i in 0..n {
                let x = sol.x[i];
                prop_assert!(x >= low[i] - TOL && x <= high[i] + TOL, "x[{}] = {} outside box", i, x);
                let at_low = x <= low[i] + TOL && w[i] >= -TOL;
                let at_high = x >= high[i] - TOL && w[i] <= TOL;
                let interior = w[i].abs() <= TOL;
                prop_assert!(at_low || at_high || interior, "x[{}] = {} with residual {}", i, x, w[i]);
            }
        }
    }
}
