//! Math primitives for the invdyn articulated-body solver.
//!
//! Provides 6D spatial vectors and matrices in `[linear; angular]` order,
//! unit quaternions, a dense Cholesky factorization with damping
//! regularization, and a Dantzig box-LCP solver.

pub mod lcp;
pub mod linalg;
pub mod quaternion;
pub mod spatial;

pub use lcp::{LcpError, LcpSolution, solve_box_lcp};
pub use linalg::{
    CholeskyError, RegularizedFactor, cholesky_in_place, cholesky_solve_in_place, max_asymmetry,
    regularized_cholesky,
};
pub use quaternion::Quat;
pub use spatial::{SpatialMat, SpatialVec};

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;
/// 6D vector alias.
pub type Vec6 = na::Vector6<f64>;
/// 6x6 matrix alias.
pub type Mat6 = na::Matrix6<f64>;
/// Dynamic vector.
pub type DVec = na::DVector<f64>;
/// Dynamic matrix.
pub type DMat = na::DMatrix<f64>;

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.81;
