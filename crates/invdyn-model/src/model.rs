//! Model definition: bodies, joints and per-joint solver bookkeeping.

use crate::body::{Body, BodyId};
use crate::joint::{BallJoint, HingeJoint, Joint, JointId};
use crate::row::{ConstraintParams, MAX_DOF};
use invdyn_math::Vec3;
use thiserror::Error;

/// Errors raised when a model is addressed with a stale or foreign id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),
    #[error("unknown joint {0:?}")]
    UnknownJoint(JointId),
    #[error("joint {joint:?} row {row} out of range")]
    RowOutOfRange { joint: JointId, row: usize },
}

/// A joint plus the state the solver keeps for it.
#[derive(Debug)]
struct JointEntry {
    joint: Box<dyn Joint>,
    in_skeleton: bool,
    feedback: [f64; MAX_DOF],
    feedback_rows: usize,
}

/// Collection of bodies and joints a skeleton is built over.
#[derive(Debug, Default)]
pub struct Model {
    bodies: Vec<Box<dyn Body>>,
    joints: Vec<JointEntry>,
}

impl Model {
    /// Number of bodies.
    pub fn nbodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints.
    pub fn njoints(&self) -> usize {
        self.joints.len()
    }

    pub fn add_body(&mut self, body: impl Body + 'static) -> BodyId {
        self.bodies.push(Box::new(body));
        BodyId(self.bodies.len() - 1)
    }

    pub fn add_joint(&mut self, joint: impl Joint + 'static) -> JointId {
        self.joints.push(JointEntry {
            joint: Box::new(joint),
            in_skeleton: false,
            feedback: [0.0; MAX_DOF],
            feedback_rows: 0,
        });
        JointId(self.joints.len() - 1)
    }

    pub fn body(&self, id: BodyId) -> Option<&dyn Body> {
        self.bodies.get(id.0).map(|b| b.as_ref())
    }

    pub fn joint(&self, id: JointId) -> Option<&dyn Joint> {
        self.joints.get(id.0).map(|e| e.joint.as_ref())
    }

    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut (dyn Joint + 'static)> {
        self.joints.get_mut(id.0).map(|e| e.joint.as_mut())
    }

    /// The `(body0, body1)` pair a joint connects.
    pub fn joint_bodies(&self, id: JointId) -> Result<(BodyId, BodyId), ModelError> {
        self.joint(id).map(|j| j.bodies()).ok_or(ModelError::UnknownJoint(id))
    }

    /// Whether a skeleton currently owns the joint.
    pub fn is_joint_in_skeleton(&self, id: JointId) -> bool {
        self.joints.get(id.0).is_some_and(|e| e.in_skeleton)
    }

    pub fn set_joint_in_skeleton(&mut self, id: JointId, flag: bool) -> Result<(), ModelError> {
        let entry = self.joints.get_mut(id.0).ok_or(ModelError::UnknownJoint(id))?;
        entry.in_skeleton = flag;
        Ok(())
    }

    /// Let the joint add its rows for this step to `params`.
    pub fn derive_joint_rows(&mut self, id: JointId, params: &mut ConstraintParams) -> Result<(), ModelError> {
        let entry = self.joints.get_mut(id.0).ok_or(ModelError::UnknownJoint(id))?;
        let (b0, b1) = entry.joint.bodies();
        let body0 = self.bodies.get(b0.0).ok_or(ModelError::UnknownBody(b0))?;
        let body1 = self.bodies.get(b1.0).ok_or(ModelError::UnknownBody(b1))?;
        entry.joint.jacobian_derivative(params, body0.as_ref(), body1.as_ref());
        Ok(())
    }

    /// Resolved force of every row the joint produced in the last solve.
    pub fn joint_feedback(&self, id: JointId) -> Option<&[f64]> {
        self.joints.get(id.0).map(|e| &e.feedback[..e.feedback_rows])
    }

    /// Zero the joint's feedback and size it for `rows` rows.
    pub fn reset_joint_feedback(&mut self, id: JointId, rows: usize) -> Result<(), ModelError> {
        let entry = self.joints.get_mut(id.0).ok_or(ModelError::UnknownJoint(id))?;
        entry.feedback = [0.0; MAX_DOF];
        entry.feedback_rows = rows.min(MAX_DOF);
        Ok(())
    }

    pub fn set_joint_feedback(&mut self, id: JointId, row: usize, force: f64) -> Result<(), ModelError> {
        let entry = self.joints.get_mut(id.0).ok_or(ModelError::UnknownJoint(id))?;
        if row >= entry.feedback_rows {
            return Err(ModelError::RowOutOfRange { joint: id, row });
        }
        entry.feedback[row] = force;
        Ok(())
    }
}

/// Builder for constructing models.
///
/// Bodies and joints are numbered in insertion order, so the `n`-th call to
/// [`ModelBuilder::add_body`] creates `BodyId(n)`.
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Start building a new model.
    pub fn new() -> Self {
        Self {
            model: Model::default(),
        }
    }

    /// Add a body.
    pub fn add_body(mut self, body: impl Body + 'static) -> Self {
        self.model.add_body(body);
        self
    }

    /// Add an arbitrary joint.
    pub fn add_joint(mut self, joint: impl Joint + 'static) -> Self {
        self.model.add_joint(joint);
        self
    }

    /// Add a ball joint at world point `pivot`.
    ///
    /// # Panics
    /// If either body id has not been added yet.
    pub fn add_ball_joint(self, name: &str, body0: usize, body1: usize, pivot: Vec3) -> Self {
        let joint = {
            let (a, b) = self.pair(body0, body1);
            BallJoint::at_pivot(name, (BodyId(body0), a), (BodyId(body1), b), pivot)
        };
        self.add_joint(joint)
    }

    /// Add a hinge joint at world point `pivot` about world direction `axis`.
    ///
    /// # Panics
    /// If either body id has not been added yet.
    pub fn add_hinge_joint(self, name: &str, body0: usize, body1: usize, pivot: Vec3, axis: Vec3) -> Self {
        self.add_hinge_joint_with(name, body0, body1, pivot, axis, |h| h)
    }

    /// Add a hinge joint, configuring it through `configure` (e.g. to add a motor).
    ///
    /// # Panics
    /// If either body id has not been added yet.
    pub fn add_hinge_joint_with(
        self,
        name: &str,
        body0: usize,
        body1: usize,
        pivot: Vec3,
        axis: Vec3,
        configure: impl FnOnce(HingeJoint) -> HingeJoint,
    ) -> Self {
        let joint = {
            let (a, b) = self.pair(body0, body1);
            configure(HingeJoint::at_pivot(name, (BodyId(body0), a), (BodyId(body1), b), pivot, axis))
        };
        self.add_joint(joint)
    }

    fn pair(&self, body0: usize, body1: usize) -> (&dyn Body, &dyn Body) {
        (self.model.bodies[body0].as_ref(), self.model.bodies[body1].as_ref())
    }

    /// Build the model.
    pub fn build(self) -> Model {
        self.model
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::joint::RowJoint;
    use approx::assert_relative_eq;
    use invdyn_math::Mat3;
    use crate::row::{Jacobian, JacobianPair, RowDescriptor};

    fn two_body_model() -> Model {
        ModelBuilder::new()
            .add_body(RigidBody::fixed("ground"))
            .add_body(RigidBody::sphere("bob", 1.0, 0.1).with_position(Vec3::new(0.0, -1.0, 0.0)))
            .add_ball_joint("pivot", 1, 0, Vec3::zeros())
            .build()
    }

    #[test]
    fn test_builder_numbers_in_insertion_order() {
        let model = two_body_model();
        assert_eq!(model.nbodies(), 2);
        assert_eq!(model.njoints(), 1);
        assert_eq!(model.joint_bodies(JointId(0)).unwrap(), (BodyId(1), BodyId(0)));
        assert_relative_eq!(model.body(BodyId(1)).unwrap().position(), Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_skeleton_flag() {
        let mut model = two_body_model();
        assert!(!model.is_joint_in_skeleton(JointId(0)));
        model.set_joint_in_skeleton(JointId(0), true).unwrap();
        assert!(model.is_joint_in_skeleton(JointId(0)));
        assert_eq!(
            model.set_joint_in_skeleton(JointId(7), true),
            Err(ModelError::UnknownJoint(JointId(7)))
        );
    }

    #[test]
    fn test_feedback_slots() {
        let mut model = two_body_model();
        model.reset_joint_feedback(JointId(0), 3).unwrap();
        model.set_joint_feedback(JointId(0), 2, 4.5).unwrap();
        assert_eq!(model.joint_feedback(JointId(0)).unwrap(), &[0.0, 0.0, 4.5]);
        assert!(model.set_joint_feedback(JointId(0), 3, 1.0).is_err());
    }

    #[test]
    fn test_derive_rows_rejects_dangling_body() {
        let mut model = Model::default();
        let a = model.add_body(RigidBody::sphere("a", 1.0, 0.1));
        let row = RowDescriptor::new(JacobianPair::new(Jacobian::rotational(&Vec3::x()), Jacobian::default()));
        let j = model.add_joint(RowJoint::new("r", a, BodyId(9)).with_row(row));

        let mut params = ConstraintParams::new(0.01, 0);
        assert_eq!(
            model.derive_joint_rows(j, &mut params),
            Err(ModelError::UnknownBody(BodyId(9)))
        );
    }

    /// Point mass with no rotational inertia, addressed only through `Body`.
    #[derive(Debug)]
    struct PointMass {
        mass: f64,
        at: Vec3,
    }

    impl Body for PointMass {
        fn mass(&self) -> f64 {
            self.mass
        }
        fn inv_mass(&self) -> f64 {
            1.0 / self.mass
        }
        fn inertia_matrix(&self) -> Mat3 {
            Mat3::zeros()
        }
        fn inv_world_inertia(&self) -> Mat3 {
            Mat3::zeros()
        }
        fn rotate_vector(&self, v: &Vec3) -> Vec3 {
            *v
        }
        fn unrotate_vector(&self, v: &Vec3) -> Vec3 {
            *v
        }
        fn position(&self) -> Vec3 {
            self.at
        }
    }

    #[test]
    fn test_custom_body_feeds_joint_rows() {
        let mut model = ModelBuilder::new()
            .add_body(RigidBody::fixed("ground"))
            .add_body(PointMass { mass: 2.0, at: Vec3::new(0.0, -1.0, 0.0) })
            .add_ball_joint("pivot", 1, 0, Vec3::zeros())
            .build();
        let bob = model.body(BodyId(1)).unwrap();
        assert!(!bob.is_kinematic());
        assert_relative_eq!(bob.inv_mass(), 0.5);

        let mut params = ConstraintParams::new(0.01, 0);
        model.derive_joint_rows(JointId(0), &mut params).unwrap();
        assert_eq!(params.rows().len(), 3);
    }
}
