//! Node arena, topological ordering and loop-joint slot resolution.
//!
//! Nodes live in an arena addressed by [`NodeId`]. Finalization assigns each
//! node a topological index by iterative post-order traversal, so every
//! child precedes its parent and the root is last. Per-step arrays are
//! indexed by *slot*: slots `0..node_count` are the tree nodes by index,
//! and bodies reached only through loop joints get overflow slots after
//! them in first-seen order.

use crate::error::{Result, SkeletonError};
use invdyn_model::{BodyId, JointId};
use log::debug;

/// Handle of a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena (creation order).
    pub fn raw(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub body: BodyId,
    /// Joint to the parent; `None` for the root.
    pub joint: Option<JointId>,
    pub parent: Option<NodeId>,
    /// Most recently added child first.
    pub children: Vec<NodeId>,
    /// Topological index, valid after finalization.
    pub index: usize,
    /// The joint stores its bodies as (parent, child).
    pub swap: bool,
}

/// A constraint closing a kinematic cycle, with the slots of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopingJoint {
    pub joint: JointId,
    /// The joint's `(body0, body1)`.
    pub bodies: (BodyId, BodyId),
    /// Slots of `bodies.0` and `bodies.1`.
    pub slots: (usize, usize),
}

/// Rooted tree of bodies plus the loop joints closing cycles over it.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    order: Vec<NodeId>,
    loops: Vec<LoopingJoint>,
    looping_bodies: Vec<BodyId>,
    finalized: bool,
}

impl Tree {
    pub fn add_root(&mut self, body: BodyId) -> Result<NodeId> {
        if self.root.is_some() {
            return Err(SkeletonError::RootAlreadySet);
        }
        let id = self.push_node(body, None, None, false);
        self.root = Some(id);
        Ok(id)
    }

    /// Attach the body on the far end of `joint` below `parent`.
    ///
    /// `joint_bodies` is the joint's `(body0, body1)`; one of them must be
    /// the parent's body.
    pub fn add_child(
        &mut self,
        joint: JointId,
        joint_bodies: (BodyId, BodyId),
        parent: NodeId,
    ) -> Result<NodeId> {
        let parent_body = self.node_checked(parent)?.body;
        let (body, swap) = if joint_bodies.0 == parent_body {
            (joint_bodies.1, true)
        } else if joint_bodies.1 == parent_body {
            (joint_bodies.0, false)
        } else {
            return Err(SkeletonError::JointNotAttached { joint, parent });
        };

        let id = self.push_node(body, Some(joint), Some(parent), swap);
        self.nodes[parent.0].children.insert(0, id);
        Ok(id)
    }

    fn push_node(&mut self, body: BodyId, joint: Option<JointId>, parent: Option<NodeId>, swap: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            body,
            joint,
            parent,
            children: Vec::new(),
            index: 0,
            swap,
        });
        self.finalized = false;
        id
    }

    /// Assign topological indices and resolve loop-joint slots.
    ///
    /// `loop_joints` replaces any previously registered loop set. On error
    /// the tree is left as it was.
    pub fn finalize(&mut self, loop_joints: &[(JointId, (BodyId, BodyId))], stack_limit: usize) -> Result<()> {
        let root = self.root.ok_or(SkeletonError::MissingRoot)?;

        // Iterative post-order: children (in list order) before parents.
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push((child, false));
            }
        }

        let mut index_of = vec![0; self.nodes.len()];
        for (index, id) in order.iter().enumerate() {
            index_of[id.0] = index;
        }

        let mut loops = Vec::with_capacity(loop_joints.len());
        let mut looping_bodies = Vec::new();
        for &(joint, bodies) in loop_joints {
            let node0 = self.find_node(bodies.0, stack_limit)?;
            let node1 = self.find_node(bodies.1, stack_limit)?;
            if node0.is_none() && node1.is_none() {
                return Err(SkeletonError::UnresolvedLoopEndpoint(joint));
            }
            let mut slot = |body: BodyId, node: Option<NodeId>| match node {
                Some(n) => index_of[n.0],
                None => overflow_slot(&mut looping_bodies, order.len(), body),
            };
            let slots = (slot(bodies.0, node0), slot(bodies.1, node1));
            loops.push(LoopingJoint { joint, bodies, slots });
        }

        for (id, index) in index_of.iter().enumerate() {
            self.nodes[id].index = *index;
        }
        self.order = order;
        self.loops = loops;
        self.looping_bodies = looping_bodies;
        self.finalized = true;

        debug!(
            "skeleton finalized: {} nodes, {} loop joints, {} overflow bodies",
            self.order.len(),
            self.loops.len(),
            self.looping_bodies.len()
        );
        Ok(())
    }

    /// Depth-first search for the node holding `body`.
    pub fn find_node(&self, body: BodyId, stack_limit: usize) -> Result<Option<NodeId>> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut stack = Vec::with_capacity(stack_limit.min(64));
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.body == body {
                return Ok(Some(id));
            }
            for &child in &node.children {
                if stack.len() >= stack_limit {
                    return Err(SkeletonError::TraversalOverflow { limit: stack_limit });
                }
                stack.push(child);
            }
        }
        Ok(None)
    }

    /// Drop a loop joint and compact the overflow slots of the rest.
    pub fn remove_loop_joint(&mut self, joint: JointId) -> Option<LoopingJoint> {
        let position = self.loops.iter().position(|l| l.joint == joint)?;
        let removed = self.loops.remove(position);

        let node_count = self.order.len();
        let old_bodies = std::mem::take(&mut self.looping_bodies);
        for l in &mut self.loops {
            let mut remap = |slot: usize| {
                if slot < node_count {
                    slot
                } else {
                    overflow_slot(&mut self.looping_bodies, node_count, old_bodies[slot - node_count])
                }
            };
            l.slots = (remap(l.slots.0), remap(l.slots.1));
        }
        Some(removed)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node_checked(node)?.parent)
    }

    pub fn body(&self, node: NodeId) -> Result<BodyId> {
        Ok(self.node_checked(node)?.body)
    }

    pub fn parent_joint(&self, node: NodeId) -> Result<Option<JointId>> {
        Ok(self.node_checked(node)?.joint)
    }

    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node_checked(node)?.children)
    }

    /// Topological index. Only meaningful once finalized.
    pub fn index(&self, node: NodeId) -> Result<usize> {
        if !self.finalized {
            return Err(SkeletonError::NotFinalized);
        }
        Ok(self.node_checked(node)?.index)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn loop_joints(&self) -> &[LoopingJoint] {
        &self.loops
    }

    /// Bodies holding overflow slots, in slot order.
    pub fn looping_bodies(&self) -> &[BodyId] {
        &self.looping_bodies
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Joints of every non-root node.
    pub fn tree_joints(&self) -> impl Iterator<Item = JointId> + '_ {
        self.nodes.iter().filter_map(|n| n.joint)
    }

    /// Tree nodes plus overflow bodies.
    pub(crate) fn slot_count(&self) -> usize {
        self.order.len() + self.looping_bodies.len()
    }

    /// Body occupying `slot`.
    pub(crate) fn slot_body(&self, slot: usize) -> BodyId {
        match self.order.get(slot) {
            Some(id) => self.nodes[id.0].body,
            None => self.looping_bodies[slot - self.order.len()],
        }
    }

    /// Node at topological `index`.
    pub(crate) fn node_at(&self, index: usize) -> &Node {
        &self.nodes[self.order[index].0]
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn id_at(&self, index: usize) -> NodeId {
        self.order[index]
    }

    /// `(slot of body0, slot of body1)` for the joint of the node at `index`.
    pub(crate) fn joint_slots(&self, index: usize) -> (usize, usize) {
        let node = self.node_at(index);
        let parent = node.parent.map_or(index, |p| self.nodes[p.0].index);
        if node.swap { (parent, index) } else { (index, parent) }
    }

    fn node_checked(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(SkeletonError::UnknownNode(id))
    }
}

fn overflow_slot(looping_bodies: &mut Vec<BodyId>, node_count: usize, body: BodyId) -> usize {
    match looping_bodies.iter().position(|&b| b == body) {
        Some(k) => node_count + k,
        None => {
            looping_bodies.push(body);
            node_count + looping_bodies.len() - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root(0) ─ a(1) ─ a1(2)
    ///         └ b(3)
    fn sample() -> (Tree, [NodeId; 4]) {
        let mut tree = Tree::default();
        let root = tree.add_root(BodyId(0)).unwrap();
        let a = tree.add_child(JointId(0), (BodyId(1), BodyId(0)), root).unwrap();
        let a1 = tree.add_child(JointId(1), (BodyId(1), BodyId(2)), a).unwrap();
        let b = tree.add_child(JointId(2), (BodyId(3), BodyId(0)), root).unwrap();
        (tree, [root, a, a1, b])
    }

    #[test]
    fn test_children_before_parents() {
        let (mut tree, [root, a, a1, b]) = sample();
        tree.finalize(&[], 1024).unwrap();

        assert_eq!(tree.index(root).unwrap(), tree.node_count() - 1);
        assert!(tree.index(a1).unwrap() < tree.index(a).unwrap());
        assert!(tree.index(a).unwrap() < tree.index(root).unwrap());
        assert!(tree.index(b).unwrap() < tree.index(root).unwrap());
        // Most recent child first: b is visited before a.
        assert_eq!(tree.children(root).unwrap(), &[b, a]);
        assert_eq!(tree.index(b).unwrap(), 0);
    }

    #[test]
    fn test_swap_detection() {
        let (tree, [_, a, a1, _]) = sample();
        // Joint 0 stores (child, parent); joint 1 stores (parent, child).
        assert!(!tree.node(a).swap);
        assert!(tree.node(a1).swap);
        assert_eq!(tree.body(a1).unwrap(), BodyId(2));
    }

    #[test]
    fn test_second_root_rejected() {
        let (mut tree, _) = sample();
        assert!(matches!(tree.add_root(BodyId(9)), Err(SkeletonError::RootAlreadySet)));
    }

    #[test]
    fn test_unattached_joint_rejected() {
        let (mut tree, [root, ..]) = sample();
        let err = tree.add_child(JointId(5), (BodyId(7), BodyId(8)), root).unwrap_err();
        assert!(matches!(err, SkeletonError::JointNotAttached { .. }));
    }

    #[test]
    fn test_index_requires_finalize() {
        let (mut tree, [root, ..]) = sample();
        assert!(matches!(tree.index(root), Err(SkeletonError::NotFinalized)));
        tree.finalize(&[], 1024).unwrap();
        tree.add_child(JointId(4), (BodyId(4), BodyId(0)), root).unwrap();
        assert!(!tree.is_finalized());
    }

    #[test]
    fn test_find_node_stack_limit() {
        let (tree, [_, _, a1, _]) = sample();
        assert_eq!(tree.find_node(BodyId(2), 1024).unwrap(), Some(a1));
        assert_eq!(tree.find_node(BodyId(42), 1024).unwrap(), None);
        assert!(matches!(
            tree.find_node(BodyId(2), 1),
            Err(SkeletonError::TraversalOverflow { limit: 1 })
        ));
    }

    #[test]
    fn test_loop_slots_and_overflow_bodies() {
        let (mut tree, [_, _, a1, _]) = sample();
        let loops = [
            (JointId(10), (BodyId(2), BodyId(3))),
            (JointId(11), (BodyId(20), BodyId(2))),
            (JointId(12), (BodyId(3), BodyId(21))),
            (JointId(13), (BodyId(20), BodyId(1))),
        ];
        tree.finalize(&loops, 1024).unwrap();

        let n = tree.node_count();
        let ls = tree.loop_joints();
        assert_eq!(ls[0].slots, (tree.index(a1).unwrap(), 0));
        assert_eq!(ls[1].slots.0, n);
        assert_eq!(ls[2].slots.1, n + 1);
        assert_eq!(ls[3].slots.0, n);
        assert_eq!(tree.looping_bodies(), &[BodyId(20), BodyId(21)]);
        assert_eq!(tree.slot_count(), n + 2);
        assert_eq!(tree.slot_body(n + 1), BodyId(21));

        // Dropping the only reference to body 20 compacts body 21 down.
        tree.remove_loop_joint(JointId(11)).unwrap();
        tree.remove_loop_joint(JointId(13)).unwrap();
        assert_eq!(tree.looping_bodies(), &[BodyId(21)]);
        assert_eq!(tree.loop_joints()[1].slots.1, n);
        assert!(tree.remove_loop_joint(JointId(13)).is_none());
    }

    #[test]
    fn test_unresolved_loop_leaves_tree_untouched() {
        let (mut tree, _) = sample();
        let err = tree
            .finalize(&[(JointId(10), (BodyId(30), BodyId(31)))], 1024)
            .unwrap_err();
        assert!(matches!(err, SkeletonError::UnresolvedLoopEndpoint(JointId(10))));
        assert!(!tree.is_finalized());
    }

    #[test]
    fn test_joint_slots_follow_swap() {
        let (mut tree, [_, a, a1, _]) = sample();
        tree.finalize(&[], 1024).unwrap();
        let ia = tree.index(a).unwrap();
        let ia1 = tree.index(a1).unwrap();
        assert_eq!(tree.joint_slots(ia1), (ia, ia1));
        assert_eq!(tree.joint_slots(ia), (ia, tree.node_count() - 1));
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Random trees: every new node hangs below an earlier one.
            #[test]
            fn children_precede_parents(parents in proptest::collection::vec(0usize..64, 1..40)) {
                let mut tree = Tree::default();
                let mut ids = vec![tree.add_root(BodyId(0)).unwrap()];
                for (k, p) in parents.iter().enumerate() {
                    let parent = ids[p % ids.len()];
                    let parent_body = tree.body(parent).unwrap();
                    let body = BodyId(k + 1);
                    ids.push(tree.add_child(JointId(k), (body, parent_body), parent).unwrap());
                }
                tree.finalize(&[], 1024).unwrap();

                let root = tree.root().unwrap();
                prop_assert_eq!(tree.index(root).unwrap(), tree.node_count() - 1);
                for &id in &ids[1..] {
                    let parent = tree.parent(id).unwrap().unwrap();
                    prop_assert!(tree.index(id).unwrap() < tree.index(parent).unwrap());
                }
            }
        }
    }
}
