//! Articulated-body inverse dynamics.
//!
//! A [`Skeleton`] holds a rooted tree of bodies connected by joints,
//! optionally closed into loops by extra joints. Each step it derives every
//! joint's constraint rows and computes the row forces that realize the
//! rows' target accelerations:
//!
//! 1. unbounded rows of tree joints ("primary" rows) are solved in O(n) by a
//!    two-pass sweep over per-node reduced spatial masses;
//! 2. bounded tree rows and all loop rows ("auxiliary" rows) are condensed
//!    into a dense Delassus matrix, Cholesky-factored with damping
//!    regularization;
//! 3. the auxiliary forces come from a box-constrained LCP, and their effect
//!    is folded back into the primary forces.
//!
//! Forces are written back to each joint's feedback in the [`Model`] and
//! summed per body into [`SlotForce`]s.
//!
//! [`Model`]: invdyn_model::Model

mod assembly;
pub mod config;
pub mod error;
mod factor;
mod jacobian;
mod resolve;
pub mod skeleton;
mod solve;
pub mod tree;

pub use config::SkeletonConfig;
pub use error::{Result, SkeletonError};
pub use resolve::{RowForce, SlotForce};
pub use skeleton::{MotionIntegrator, NoIntegration, Skeleton, StepReport, StepStats};
pub use solve::ForcePair;
pub use tree::{LoopingJoint, NodeId, Tree};
