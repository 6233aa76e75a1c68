//! Generic `Simulator` trait for physics backends that host a manipulator.
//!
//! The control core only ever talks to this trait, so the backend (an
//! in-process stub, a physics-server client, …) can be swapped without
//! touching the sense/act logic.

use std::sync::{Arc, Mutex};

use manip_types::{JointInfo, JointSensorState, ManipError, MotorArrayCommand};

/// Identifier of a body loaded in the simulator.  Negative values mean "no
/// body associated".
pub type BodyId = i32;

/// A physics simulator exposing joint state, dynamics queries, and joint
/// motor control for one or more loaded bodies.
///
/// Every call is synchronous and returns once the simulator has answered.
pub trait Simulator: Send {
    /// Whether a simulator session is currently attached.
    fn is_connected(&self) -> bool;

    /// Refresh the client-side body cache from the simulator.
    ///
    /// # Errors
    ///
    /// Returns [`ManipError::Simulator`] if the synchronisation fails.
    fn sync_bodies(&mut self) -> Result<(), ManipError>;

    /// Number of joints (including fixed ones) of `body`.
    fn num_joints(&self, body: BodyId) -> Result<usize, ManipError>;

    /// Static description of joint `joint` of `body`.
    fn joint_info(&self, body: BodyId, joint: usize) -> Result<JointInfo, ManipError>;

    /// Current position and velocity of joint `joint` of `body`.
    fn joint_state(&self, body: BodyId, joint: usize) -> Result<JointSensorState, ManipError>;

    /// Joint torques needed to realise `accelerations` at the given state.
    ///
    /// The three slices are indexed by actuated degree of freedom and must
    /// have equal length.
    fn inverse_dynamics(
        &self,
        body: BodyId,
        positions: &[f64],
        velocities: &[f64],
        accelerations: &[f64],
    ) -> Result<Vec<f64>, ManipError>;

    /// Joint-space inertia matrix at `positions`, row-major, `n × n`.
    fn mass_matrix(&self, body: BodyId, positions: &[f64]) -> Result<Vec<f64>, ManipError>;

    /// Apply one motor command to the listed joints of `body`.
    fn set_joint_motor_control_array(
        &mut self,
        body: BodyId,
        command: &MotorArrayCommand,
    ) -> Result<(), ManipError>;
}

fn poisoned() -> ManipError {
    ManipError::Simulator {
        call: "lock".to_string(),
        details: "simulator handle poisoned".to_string(),
    }
}

/// A simulator shared between several owners (e.g. the control loop and the
/// stepping task) behind a mutex.
impl<S: Simulator> Simulator for Arc<Mutex<S>> {
    fn is_connected(&self) -> bool {
        self.lock().map(|s| s.is_connected()).unwrap_or(false)
    }

    fn sync_bodies(&mut self) -> Result<(), ManipError> {
        self.lock().map_err(|_| poisoned())?.sync_bodies()
    }

    fn num_joints(&self, body: BodyId) -> Result<usize, ManipError> {
        self.lock().map_err(|_| poisoned())?.num_joints(body)
    }

    fn joint_info(&self, body: BodyId, joint: usize) -> Result<JointInfo, ManipError> {
        self.lock().map_err(|_| poisoned())?.joint_info(body, joint)
    }

    fn joint_state(&self, body: BodyId, joint: usize) -> Result<JointSensorState, ManipError> {
        self.lock().map_err(|_| poisoned())?.joint_state(body, joint)
    }

    fn inverse_dynamics(
        &self,
        body: BodyId,
        positions: &[f64],
        velocities: &[f64],
        accelerations: &[f64],
    ) -> Result<Vec<f64>, ManipError> {
        self.lock()
            .map_err(|_| poisoned())?
            .inverse_dynamics(body, positions, velocities, accelerations)
    }

    fn mass_matrix(&self, body: BodyId, positions: &[f64]) -> Result<Vec<f64>, ManipError> {
        self.lock().map_err(|_| poisoned())?.mass_matrix(body, positions)
    }

    fn set_joint_motor_control_array(
        &mut self,
        body: BodyId,
        command: &MotorArrayCommand,
    ) -> Result<(), ManipError> {
        self.lock()
            .map_err(|_| poisoned())?
            .set_joint_motor_control_array(body, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manip_types::{JointType, MotorControlMode};

    /// Minimal single-joint simulator used only for tests.
    #[derive(Default)]
    struct MockSim {
        commands: Vec<MotorArrayCommand>,
    }

    impl Simulator for MockSim {
        fn is_connected(&self) -> bool {
            true
        }
        fn sync_bodies(&mut self) -> Result<(), ManipError> {
            Ok(())
        }
        fn num_joints(&self, _body: BodyId) -> Result<usize, ManipError> {
            Ok(1)
        }
        fn joint_info(&self, _body: BodyId, joint: usize) -> Result<JointInfo, ManipError> {
            Ok(JointInfo {
                index: Some(joint),
                joint_type: JointType::Revolute,
                name: "j0".to_string(),
            })
        }
        fn joint_state(
            &self,
            _body: BodyId,
            _joint: usize,
        ) -> Result<JointSensorState, ManipError> {
            Ok(JointSensorState {
                position: 0.25,
                velocity: -0.5,
            })
        }
        fn inverse_dynamics(
            &self,
            _body: BodyId,
            positions: &[f64],
            _velocities: &[f64],
            _accelerations: &[f64],
        ) -> Result<Vec<f64>, ManipError> {
            Ok(vec![1.0; positions.len()])
        }
        fn mass_matrix(&self, _body: BodyId, positions: &[f64]) -> Result<Vec<f64>, ManipError> {
            Ok(vec![2.0; positions.len() * positions.len()])
        }
        fn set_joint_motor_control_array(
            &mut self,
            _body: BodyId,
            command: &MotorArrayCommand,
        ) -> Result<(), ManipError> {
            self.commands.push(command.clone());
            Ok(())
        }
    }

    #[test]
    fn shared_handle_delegates_to_inner_simulator() {
        let inner = Arc::new(Mutex::new(MockSim::default()));
        let mut shared = inner.clone();

        assert!(shared.is_connected());
        let state = shared.joint_state(0, 0).unwrap();
        assert!((state.position - 0.25).abs() < f64::EPSILON);

        shared
            .set_joint_motor_control_array(
                0,
                &MotorArrayCommand {
                    mode: MotorControlMode::Torque,
                    joint_indices: vec![0],
                    forces: vec![3.0],
                    target_positions: None,
                },
            )
            .unwrap();

        assert_eq!(inner.lock().unwrap().commands.len(), 1);
    }
}
