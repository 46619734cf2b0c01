//! Error types for skeleton construction and stepping.

use crate::tree::NodeId;
use invdyn_math::{CholeskyError, LcpError};
use invdyn_model::{BodyId, JointId, ModelError};
use thiserror::Error;

/// Errors raised while building or stepping a [`Skeleton`](crate::Skeleton).
#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("skeleton already has a root")]
    RootAlreadySet,

    #[error("skeleton has no root")]
    MissingRoot,

    #[error("skeleton topology changed since the last finalize")]
    NotFinalized,

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),

    #[error("unknown joint {0:?}")]
    UnknownJoint(JointId),

    #[error("joint {joint:?} does not attach to the body of node {parent:?}")]
    JointNotAttached { joint: JointId, parent: NodeId },

    #[error("body {0:?} has zero inverse mass and cannot be a child node")]
    KinematicChild(BodyId),

    #[error("node search exceeded its stack limit of {limit}")]
    TraversalOverflow { limit: usize },

    #[error("loop joint {0:?} has no endpoint in the tree")]
    UnresolvedLoopEndpoint(JointId),

    #[error("joint {joint:?} produced {rows} rows, more than the maximum of 6")]
    TooManyRows { joint: JointId, rows: usize },

    #[error("joint {joint:?} row {row} has stiffness {stiffness} outside [0, 1]")]
    InvalidStiffness { joint: JointId, row: usize, stiffness: f64 },

    #[error("joint {joint:?} row {row} has non-positive effective mass {diag:e}")]
    NonPositiveDiagonal { joint: JointId, row: usize, diag: f64 },

    #[error("node {node:?} has {dof} primary rows, expected 1 to 6")]
    DofOutOfRange { node: NodeId, dof: usize },

    #[error("{what} matrix is not symmetric (max deviation {deviation:e})")]
    AsymmetricMatrix { what: &'static str, deviation: f64 },

    #[error("joint mass of node {0:?} is singular")]
    SingularJointMass(NodeId),

    #[error("expected {expected} slot accelerations, got {found}")]
    SlotCountMismatch { expected: usize, found: usize },

    #[error("condensed mass matrix regularization failed: {0}")]
    RegularizationDiverged(#[source] CholeskyError),

    #[error("timestep must be positive and finite, got {0}")]
    InvalidTimestep(f64),

    #[error(transparent)]
    Lcp(#[from] LcpError),
}

impl SkeletonError {
    /// Whether the error signals a defect in the model or the solver rather
    /// than misuse of the construction API.
    ///
    /// Construction misuse (adding a second root, stepping an unfinalized
    /// skeleton, addressing unknown ids) is recoverable by the caller. Every
    /// other variant means the mechanism is numerically or structurally
    /// invalid for this step.
    pub fn is_defect(&self) -> bool {
        !matches!(
            self,
            SkeletonError::RootAlreadySet
                | SkeletonError::MissingRoot
                | SkeletonError::NotFinalized
                | SkeletonError::UnknownNode(_)
                | SkeletonError::UnknownBody(_)
                | SkeletonError::UnknownJoint(_)
                | SkeletonError::JointNotAttached { .. }
                | SkeletonError::KinematicChild(_)
                | SkeletonError::SlotCountMismatch { .. }
                | SkeletonError::InvalidTimestep(_)
        )
    }
}

impl From<ModelError> for SkeletonError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnknownBody(id) => SkeletonError::UnknownBody(id),
            ModelError::UnknownJoint(id) | ModelError::RowOutOfRange { joint: id, .. } => {
                SkeletonError::UnknownJoint(id)
            }
        }
    }
}

/// Result type for skeleton operations.
pub type Result<T> = std::result::Result<T, SkeletonError>;
