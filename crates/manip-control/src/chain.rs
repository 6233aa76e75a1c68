//! [`KinematicChain`] – joint name resolution and active-joint ordering.
//!
//! Discovery walks every joint the simulator reports for a body and keeps the
//! actuated ones (fixed mounts and joints without an index are skipped).  The
//! order in which they are found is the simulator's degree-of-freedom (DOF)
//! order, which is what the dynamics queries expect.
//!
//! The *active chain* starts out in DOF order and can later be changed by name
//! with [`KinematicChain::set_active`], which either replaces the whole
//! ordering or leaves it untouched.  Every per-joint buffer in the control core
//! is indexed by position in the active chain; [`KinematicChain::dof_slots`]
//! maps each of those positions back to its DOF.

use std::collections::HashMap;

use manip_hal::{BodyId, Simulator};
use manip_types::ManipError;
use tracing::debug;

/// Ordered set of actuated joints of one body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KinematicChain {
    /// Joint name to DOF slot.
    name_to_slot: HashMap<String, usize>,
    /// Simulator index of every actuated joint, in DOF order.
    dofs: Vec<usize>,
    /// DOF slot of every active joint, in control order.
    active: Vec<usize>,
    indices: Vec<usize>,
}

impl KinematicChain {
    /// Build the chain from the simulator's joint table.
    ///
    /// `reported` is the joint count returned by the simulator; joints are
    /// queried as `0..reported`.
    pub fn discover<S: Simulator + ?Sized>(
        sim: &S,
        body: BodyId,
        reported: usize,
    ) -> Result<Self, ManipError> {
        let mut chain = Self::default();
        for joint in 0..reported {
            let info = sim.joint_info(body, joint)?;
            let Some(index) = info.index.filter(|_| info.is_actuated()) else {
                continue;
            };
            debug!(joint = %info.name, index, "actuated joint");
            chain.push(info.name, index);
        }
        Ok(chain)
    }

    /// Build a chain from explicit `(name, index)` pairs given in DOF order.
    pub fn from_joints<I, N>(joints: I) -> Self
    where
        I: IntoIterator<Item = (N, usize)>,
        N: Into<String>,
    {
        let mut chain = Self::default();
        for (name, index) in joints {
            chain.push(name.into(), index);
        }
        chain
    }

    fn push(&mut self, name: String, index: usize) {
        let slot = self.dofs.len();
        self.name_to_slot.insert(name, slot);
        self.dofs.push(index);
        self.active.push(slot);
        self.indices.push(index);
    }

    /// Number of active joints.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Simulator indices of the active joints, in control order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Simulator indices of the actuated joints, in DOF order.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// DOF slot of each active joint, in control order.
    pub fn dof_slots(&self) -> &[usize] {
        &self.active
    }

    /// Simulator index of the joint called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_slot.get(name).map(|&slot| self.dofs[slot])
    }

    /// Reorder the active joints to follow `names`.
    ///
    /// `names` must have exactly [`len`](Self::len) entries and every entry
    /// must be a known joint.  On error nothing changes.
    pub fn set_active<N: AsRef<str>>(&mut self, names: &[N]) -> Result<(), ManipError> {
        if names.len() != self.active.len() {
            return Err(ManipError::ChainLength {
                expected: self.active.len(),
                got: names.len(),
            });
        }
        let reordered = names
            .iter()
            .map(|n| {
                self.name_to_slot
                    .get(n.as_ref())
                    .copied()
                    .ok_or_else(|| ManipError::UnknownJoint(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.indices = reordered.iter().map(|&slot| self.dofs[slot]).collect();
        self.active = reordered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manip_hal::{SimBackend, SimJoint};

    fn three_joint() -> KinematicChain {
        KinematicChain::from_joints([("a", 1), ("b", 2), ("c", 3)])
    }

    #[test]
    fn discover_skips_fixed_joints() {
        let sim = SimBackend::builder()
            .with_joint(SimJoint::fixed("mount"))
            .with_joint(SimJoint::revolute("shoulder", 1.0, 0.5))
            .with_joint(SimJoint::fixed("flange"))
            .with_joint(SimJoint::prismatic("slide", 1.0, 0.0))
            .build();

        let chain = KinematicChain::discover(&sim, 0, 4).unwrap();
        assert_eq!(chain.indices(), &[1, 3]);
        assert_eq!(chain.index_of("slide"), Some(3));
        assert_eq!(chain.index_of("mount"), None);
    }

    #[test]
    fn every_permutation_is_accepted() {
        let perms = [
            ["a", "b", "c"],
            ["a", "c", "b"],
            ["b", "a", "c"],
            ["b", "c", "a"],
            ["c", "a", "b"],
            ["c", "b", "a"],
        ];
        for perm in perms {
            let mut chain = three_joint();
            chain.set_active(&perm).unwrap();
            let expected: Vec<usize> = perm.iter().map(|n| chain.index_of(n).unwrap()).collect();
            assert_eq!(chain.indices(), expected.as_slice());
        }
    }

    #[test]
    fn wrong_length_leaves_chain_unchanged() {
        let mut chain = three_joint();
        chain.set_active(&["c", "b", "a"]).unwrap();

        let err = chain.set_active(&["a", "b"]).unwrap_err();
        assert_eq!(err, ManipError::ChainLength { expected: 3, got: 2 });
        assert_eq!(chain.indices(), &[3, 2, 1]);
    }

    #[test]
    fn unknown_name_leaves_chain_unchanged() {
        let mut chain = three_joint();
        let err = chain.set_active(&["b", "a", "wrist"]).unwrap_err();
        assert_eq!(err, ManipError::UnknownJoint("wrist".to_string()));
        assert_eq!(chain.indices(), &[1, 2, 3]);
    }

    #[test]
    fn reorder_keeps_dof_order_and_tracks_slots() {
        let mut chain = three_joint();
        assert_eq!(chain.dof_slots(), &[0, 1, 2]);

        chain.set_active(&["c", "a", "b"]).unwrap();
        assert_eq!(chain.dofs(), &[1, 2, 3]);
        assert_eq!(chain.dof_slots(), &[2, 0, 1]);
        assert_eq!(chain.indices(), &[3, 1, 2]);
    }
}
