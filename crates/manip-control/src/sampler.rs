//! State sampling: joint sensors plus feed-forward dynamics.
//!
//! One [`sample`] call per cycle:
//!
//! 1. reads position and velocity of every actuated joint,
//! 2. asks the simulator for inverse dynamics at zero acceleration, which
//!    leaves only the gravity and Coriolis/centrifugal torque,
//! 3. asks for the joint-space inertia matrix at the sampled configuration.
//!
//! The simulator works in its own DOF order; the results are permuted into
//! active-chain order so every entry lines up with `joint_indices`.
//!
//! Results are written into the caller's [`SensorSnapshot`] and
//! [`DynamicsTerms`] only after all three steps succeed, so a failed cycle
//! never leaves half-updated values behind.

use manip_hal::{BodyId, Simulator};
use manip_types::ManipError;
use nalgebra::{DMatrix, DVector};

use crate::chain::KinematicChain;

/// Latest joint positions and velocities, in active-chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub positions: DVector<f64>,
    pub velocities: DVector<f64>,
}

impl SensorSnapshot {
    pub fn zeros(num_joints: usize) -> Self {
        Self {
            positions: DVector::zeros(num_joints),
            velocities: DVector::zeros(num_joints),
        }
    }
}

/// Feed-forward terms derived from the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsTerms {
    /// Gravity + Coriolis torque per joint.
    pub gravity: DVector<f64>,
    /// Symmetric `n × n` joint-space inertia.
    pub inertia: DMatrix<f64>,
}

impl DynamicsTerms {
    pub fn zeros(num_joints: usize) -> Self {
        Self {
            gravity: DVector::zeros(num_joints),
            inertia: DMatrix::zeros(num_joints, num_joints),
        }
    }
}

/// Sample the joints of `chain` and recompute the dynamics terms.
pub fn sample<S: Simulator + ?Sized>(
    sim: &S,
    body: BodyId,
    chain: &KinematicChain,
    snapshot: &mut SensorSnapshot,
    dynamics: &mut DynamicsTerms,
) -> Result<(), ManipError> {
    let dofs = chain.dofs();
    let n = dofs.len();
    let mut q = Vec::with_capacity(n);
    let mut qd = Vec::with_capacity(n);
    for &joint in dofs {
        let state = sim.joint_state(body, joint)?;
        q.push(state.position);
        qd.push(state.velocity);
    }

    let zero_accelerations = vec![0.0; n];
    let gravity = sim.inverse_dynamics(body, &q, &qd, &zero_accelerations)?;
    expect_len("gravity/coriolis torque", n, gravity.len())?;

    let mass = sim.mass_matrix(body, &q)?;
    expect_len("inertia matrix", n * n, mass.len())?;

    let slots = chain.dof_slots();
    let m = slots.len();
    snapshot.positions = DVector::from_fn(m, |k, _| q[slots[k]]);
    snapshot.velocities = DVector::from_fn(m, |k, _| qd[slots[k]]);
    dynamics.gravity = DVector::from_fn(m, |k, _| gravity[slots[k]]);
    dynamics.inertia = DMatrix::from_fn(m, m, |r, c| mass[slots[r] * n + slots[c]]);
    Ok(())
}

fn expect_len(what: &str, expected: usize, got: usize) -> Result<(), ManipError> {
    if expected != got {
        return Err(ManipError::DimensionMismatch {
            what: what.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedSim;
    use manip_hal::sim::GRAVITY;
    use manip_hal::{SimBackend, SimJoint};
    use manip_types::JointSensorState;

    fn two_chain() -> KinematicChain {
        KinematicChain::from_joints([("j1", 1), ("j2", 2)])
    }

    #[test]
    fn sample_fills_snapshot_and_dynamics() {
        let sim = FixedSim::two_joint()
            .with_states(vec![
                JointSensorState { position: 0.1, velocity: 0.2 },
                JointSensorState { position: 0.3, velocity: 0.4 },
            ])
            .with_gravity(vec![1.0, 2.0])
            .with_mass_matrix(vec![1.0, 0.5, 0.5, 2.0]);

        let mut snapshot = SensorSnapshot::zeros(2);
        let mut dynamics = DynamicsTerms::zeros(2);
        sample(&sim, 0, &two_chain(), &mut snapshot, &mut dynamics).unwrap();

        assert_eq!(snapshot.positions.as_slice(), &[0.1, 0.3]);
        assert_eq!(snapshot.velocities.as_slice(), &[0.2, 0.4]);
        assert_eq!(dynamics.gravity.as_slice(), &[1.0, 2.0]);
        assert_eq!(dynamics.inertia[(0, 1)], 0.5);
        assert_eq!(dynamics.inertia[(1, 1)], 2.0);
    }

    #[test]
    fn inverse_dynamics_gets_zero_accelerations() {
        let sim = FixedSim::two_joint();
        let mut snapshot = SensorSnapshot::zeros(2);
        let mut dynamics = DynamicsTerms::zeros(2);
        sample(&sim, 0, &two_chain(), &mut snapshot, &mut dynamics).unwrap();

        let seen = sim.last_accelerations();
        assert_eq!(seen, Some(vec![0.0, 0.0]));
    }

    #[test]
    fn failed_mass_matrix_leaves_previous_values() {
        let sim = FixedSim::two_joint()
            .with_states(vec![
                JointSensorState { position: 0.7, velocity: 0.0 },
                JointSensorState { position: 0.8, velocity: 0.0 },
            ])
            .failing_mass_matrix();

        let mut snapshot = SensorSnapshot::zeros(2);
        let mut dynamics = DynamicsTerms::zeros(2);
        let result = sample(&sim, 0, &two_chain(), &mut snapshot, &mut dynamics);

        assert!(matches!(result, Err(ManipError::Simulator { .. })));
        assert_eq!(snapshot, SensorSnapshot::zeros(2));
        assert_eq!(dynamics, DynamicsTerms::zeros(2));
    }

    #[test]
    fn wrong_sized_gravity_is_rejected() {
        let sim = FixedSim::two_joint().with_gravity(vec![1.0]);
        let mut snapshot = SensorSnapshot::zeros(2);
        let mut dynamics = DynamicsTerms::zeros(2);
        let result = sample(&sim, 0, &two_chain(), &mut snapshot, &mut dynamics);
        assert!(matches!(result, Err(ManipError::DimensionMismatch { .. })));
    }

    #[test]
    fn reordered_chain_gets_matching_dynamics() {
        let sim = SimBackend::builder()
            .with_joint(SimJoint::revolute("shoulder", 4.0, 1.0))
            .with_joint(SimJoint::revolute("elbow", 1.0, 0.1).at(1.0))
            .build();
        let mut chain = KinematicChain::discover(&sim, 0, 2).unwrap();
        chain.set_active(&["elbow", "shoulder"]).unwrap();

        let mut snapshot = SensorSnapshot::zeros(2);
        let mut dynamics = DynamicsTerms::zeros(2);
        sample(&sim, 0, &chain, &mut snapshot, &mut dynamics).unwrap();

        assert_eq!(snapshot.positions.as_slice(), &[1.0, 0.0]);
        assert!((dynamics.gravity[0] - GRAVITY * 0.1 * 1.0_f64.cos()).abs() < 1e-9);
        assert!((dynamics.gravity[1] - 4.0 * GRAVITY).abs() < 1e-9);
        assert!((dynamics.inertia[(0, 0)] - 0.01).abs() < 1e-9);
        assert!((dynamics.inertia[(1, 1)] - 4.0).abs() < 1e-9);
    }
}
