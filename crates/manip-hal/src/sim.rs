//! In-process simulator for CI/CD testing without a physics server.
//!
//! [`SimBackend`] hosts a single body made of independent point-mass links.
//! Each actuated joint `j` carries a mass `m` at lever arm `l`, so
//!
//! * inverse dynamics is `m·l²·q̈ + m·g·l·cos(q) + b·q̇`,
//! * the inertia matrix is diagonal with entries `m·l²`,
//! * [`SimBackend::step`] integrates the last motor command per joint.
//!
//! Every [`MotorArrayCommand`] is recorded so tests can assert on exactly what
//! the control core sent, and [`SimBackend::set_fault`] makes a chosen call
//! fail to exercise fault paths.
//!
//! # Example
//!
//! ```rust
//! use manip_hal::sim::{SimBackend, SimJoint};
//! use manip_hal::Simulator;
//!
//! let sim = SimBackend::builder()
//!     .with_joint(SimJoint::fixed("mount"))
//!     .with_joint(SimJoint::revolute("shoulder", 2.0, 0.5))
//!     .build();
//!
//! assert_eq!(sim.num_joints(0).unwrap(), 2);
//! ```

use manip_types::{
    JointInfo, JointSensorState, JointType, ManipError, MotorArrayCommand, MotorControlMode,
};
use tracing::debug;

use crate::simulator::{BodyId, Simulator};

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Holding force of a joint motor before any command arrives.
pub const DEFAULT_BRAKE_FORCE: f64 = 500.0;

const PD_KP: f64 = 100.0;
const PD_KD: f64 = 20.0;
const VELOCITY_KD: f64 = 50.0;

// ────────────────────────────────────────────────────────────────────────────
// Simulated joint
// ────────────────────────────────────────────────────────────────────────────

/// One joint of the simulated body.
#[derive(Debug, Clone)]
pub struct SimJoint {
    pub name: String,
    pub joint_type: JointType,
    pub mass: f64,
    pub lever: f64,
    pub damping: f64,
    pub state: JointSensorState,
}

impl SimJoint {
    /// An actuated revolute joint carrying `mass` at distance `lever`.
    pub fn revolute(name: impl Into<String>, mass: f64, lever: f64) -> Self {
        Self::actuated(name, JointType::Revolute, mass, lever)
    }

    /// An actuated prismatic joint.
    pub fn prismatic(name: impl Into<String>, mass: f64, lever: f64) -> Self {
        Self::actuated(name, JointType::Prismatic, mass, lever)
    }

    /// A rigid mount that is reported but never actuated.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joint_type: JointType::Fixed,
            mass: 0.0,
            lever: 0.0,
            damping: 0.0,
            state: JointSensorState::default(),
        }
    }

    fn actuated(name: impl Into<String>, joint_type: JointType, mass: f64, lever: f64) -> Self {
        Self {
            name: name.into(),
            joint_type,
            mass,
            lever,
            damping: 0.1,
            state: JointSensorState::default(),
        }
    }

    /// Override the viscous damping coefficient.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Start the joint at `position` (rad or m).
    pub fn at(mut self, position: f64) -> Self {
        self.state.position = position;
        self
    }

    fn inertia(&self) -> f64 {
        self.mass * self.lever * self.lever
    }

    fn gravity_torque(&self, position: f64) -> f64 {
        match self.joint_type {
            JointType::Prismatic => self.mass * GRAVITY,
            _ => self.mass * GRAVITY * self.lever * position.cos(),
        }
    }
}

/// Per-joint motor state latched from the last array command.
#[derive(Debug, Clone, Copy)]
struct MotorSlot {
    mode: MotorControlMode,
    force: f64,
    target: f64,
}

impl Default for MotorSlot {
    fn default() -> Self {
        Self {
            mode: MotorControlMode::Velocity,
            force: DEFAULT_BRAKE_FORCE,
            target: 0.0,
        }
    }
}

/// Simulator entry points that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    SyncBodies,
    JointState,
    InverseDynamics,
    MassMatrix,
    MotorControl,
}

// ────────────────────────────────────────────────────────────────────────────
// SimBackend
// ────────────────────────────────────────────────────────────────────────────

/// In-process single-body simulator.  Build it with [`SimBackend::builder`].
#[derive(Debug)]
pub struct SimBackend {
    connected: bool,
    body_id: BodyId,
    joints: Vec<SimJoint>,
    motors: Vec<MotorSlot>,
    commands: Vec<MotorArrayCommand>,
    fault: Option<SimCall>,
}

impl SimBackend {
    /// Start building a simulator.
    pub fn builder() -> SimBackendBuilder {
        SimBackendBuilder::default()
    }

    /// Every motor command received so far, oldest first.
    pub fn commands(&self) -> &[MotorArrayCommand] {
        &self.commands
    }

    /// Forget the recorded motor commands.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Make `call` fail until cleared with `set_fault(None)`.
    pub fn set_fault(&mut self, call: Option<SimCall>) {
        self.fault = call;
    }

    /// Attach or detach the simulated session.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Overwrite the state of joint `joint`.
    pub fn set_joint_state(
        &mut self,
        joint: usize,
        state: JointSensorState,
    ) -> Result<(), ManipError> {
        let j = self
            .joints
            .get_mut(joint)
            .ok_or_else(|| out_of_range("set_joint_state", joint))?;
        j.state = state;
        Ok(())
    }

    /// Body identifier under which the joints are exposed.
    pub fn body_id(&self) -> BodyId {
        self.body_id
    }

    /// Advance the simulation by `dt` seconds using the latched motor commands.
    pub fn step(&mut self, dt: f64) {
        for (joint, motor) in self.joints.iter_mut().zip(self.motors.iter()) {
            if joint.joint_type == JointType::Fixed {
                continue;
            }
            let JointSensorState { position, velocity } = joint.state;
            let limit = motor.force.abs();
            let tau = match motor.mode {
                MotorControlMode::Torque => motor.force,
                MotorControlMode::Velocity => (-VELOCITY_KD * velocity).clamp(-limit, limit),
                MotorControlMode::PositionVelocityPd => {
                    (PD_KP * (motor.target - position) - PD_KD * velocity).clamp(-limit, limit)
                }
            };
            let inertia = joint.inertia().max(1e-6);
            let acc = (tau - joint.gravity_torque(position) - joint.damping * velocity) / inertia;
            joint.state.velocity = velocity + acc * dt;
            joint.state.position = position + joint.state.velocity * dt;
        }
    }

    fn check(&self, call: SimCall) -> Result<(), ManipError> {
        if self.fault == Some(call) {
            return Err(ManipError::Simulator {
                call: format!("{call:?}"),
                details: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn check_body(&self, body: BodyId) -> Result<(), ManipError> {
        if body != self.body_id {
            return Err(ManipError::Simulator {
                call: "body lookup".to_string(),
                details: format!("body {body} is not loaded"),
            });
        }
        Ok(())
    }

    fn actuated(&self) -> impl Iterator<Item = &SimJoint> {
        self.joints.iter().filter(|j| j.joint_type != JointType::Fixed)
    }

    fn dof_count(&self) -> usize {
        self.actuated().count()
    }

    fn check_dofs(&self, what: &str, got: usize) -> Result<(), ManipError> {
        let expected = self.dof_count();
        if got != expected {
            return Err(ManipError::DimensionMismatch {
                what: what.to_string(),
                expected,
                got,
            });
        }
        Ok(())
    }
}

fn out_of_range(call: &str, joint: usize) -> ManipError {
    ManipError::Simulator {
        call: call.to_string(),
        details: format!("joint index {joint} out of range"),
    }
}

impl Simulator for SimBackend {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn sync_bodies(&mut self) -> Result<(), ManipError> {
        self.check(SimCall::SyncBodies)
    }

    fn num_joints(&self, body: BodyId) -> Result<usize, ManipError> {
        self.check_body(body)?;
        Ok(self.joints.len())
    }

    fn joint_info(&self, body: BodyId, joint: usize) -> Result<JointInfo, ManipError> {
        self.check_body(body)?;
        let j = self.joints.get(joint).ok_or_else(|| out_of_range("joint_info", joint))?;
        Ok(JointInfo {
            index: Some(joint),
            joint_type: j.joint_type,
            name: j.name.clone(),
        })
    }

    fn joint_state(&self, body: BodyId, joint: usize) -> Result<JointSensorState, ManipError> {
        self.check(SimCall::JointState)?;
        self.check_body(body)?;
        self.joints
            .get(joint)
            .map(|j| j.state)
            .ok_or_else(|| out_of_range("joint_state", joint))
    }

    fn inverse_dynamics(
        &self,
        body: BodyId,
        positions: &[f64],
        velocities: &[f64],
        accelerations: &[f64],
    ) -> Result<Vec<f64>, ManipError> {
        self.check(SimCall::InverseDynamics)?;
        self.check_body(body)?;
        self.check_dofs("positions", positions.len())?;
        self.check_dofs("velocities", velocities.len())?;
        self.check_dofs("accelerations", accelerations.len())?;
        Ok(self
            .actuated()
            .enumerate()
            .map(|(i, j)| {
                j.inertia() * accelerations[i]
                    + j.gravity_torque(positions[i])
                    + j.damping * velocities[i]
            })
            .collect())
    }

    fn mass_matrix(&self, body: BodyId, positions: &[f64]) -> Result<Vec<f64>, ManipError> {
        self.check(SimCall::MassMatrix)?;
        self.check_body(body)?;
        self.check_dofs("positions", positions.len())?;
        let n = positions.len();
        let mut m = vec![0.0; n * n];
        for (i, j) in self.actuated().enumerate() {
            m[i * n + i] = j.inertia();
        }
        Ok(m)
    }

    fn set_joint_motor_control_array(
        &mut self,
        body: BodyId,
        command: &MotorArrayCommand,
    ) -> Result<(), ManipError> {
        self.check(SimCall::MotorControl)?;
        self.check_body(body)?;
        if command.forces.len() != command.joint_indices.len() {
            return Err(ManipError::DimensionMismatch {
                what: "forces".to_string(),
                expected: command.joint_indices.len(),
                got: command.forces.len(),
            });
        }
        if let Some(&joint) = command.joint_indices.iter().find(|&&j| j >= self.motors.len()) {
            return Err(out_of_range("set_joint_motor_control_array", joint));
        }
        for (slot, &joint) in command.joint_indices.iter().enumerate() {
            let motor = &mut self.motors[joint];
            motor.mode = command.mode;
            motor.force = command.forces[slot];
            if let Some(targets) = &command.target_positions {
                motor.target = targets.get(slot).copied().unwrap_or(0.0);
            }
        }
        debug!(mode = ?command.mode, joints = command.joint_indices.len(), "motor array command");
        self.commands.push(command.clone());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`SimBackend`] with a connected session and one
/// body (id 0 unless overridden).
#[derive(Default)]
pub struct SimBackendBuilder {
    body_id: BodyId,
    joints: Vec<SimJoint>,
    disconnected: bool,
}

impl SimBackendBuilder {
    /// Expose the body under `body_id` instead of 0.
    pub fn with_body_id(mut self, body_id: BodyId) -> Self {
        self.body_id = body_id;
        self
    }

    /// Append a joint to the body.
    pub fn with_joint(mut self, joint: SimJoint) -> Self {
        self.joints.push(joint);
        self
    }

    /// Start with no session attached.
    pub fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    /// Consume the builder and return the simulator.
    pub fn build(self) -> SimBackend {
        let motors = vec![MotorSlot::default(); self.joints.len()];
        SimBackend {
            connected: !self.disconnected,
            body_id: self.body_id,
            joints: self.joints,
            motors,
            commands: Vec::new(),
            fault: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn two_link() -> SimBackend {
        SimBackend::builder()
            .with_joint(SimJoint::fixed("mount"))
            .with_joint(SimJoint::revolute("shoulder", 2.0, 0.5))
            .with_joint(SimJoint::revolute("elbow", 1.0, 0.25))
            .build()
    }

    fn torque(joints: Vec<usize>, forces: Vec<f64>) -> MotorArrayCommand {
        MotorArrayCommand {
            mode: MotorControlMode::Torque,
            joint_indices: joints,
            forces,
            target_positions: None,
        }
    }

    #[test]
    fn reports_all_joints_including_fixed() {
        let sim = two_link();
        assert_eq!(sim.num_joints(0).unwrap(), 3);
        let mount = sim.joint_info(0, 0).unwrap();
        assert_eq!(mount.joint_type, JointType::Fixed);
        assert_eq!(sim.joint_info(0, 2).unwrap().name, "elbow");
    }

    #[test]
    fn unknown_body_is_rejected() {
        let sim = two_link();
        assert!(matches!(
            sim.num_joints(4),
            Err(ManipError::Simulator { .. })
        ));
    }

    #[test]
    fn inverse_dynamics_at_rest_is_gravity() {
        let sim = two_link();
        let tau = sim
            .inverse_dynamics(0, &[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap();
        assert!((tau[0] - 2.0 * GRAVITY * 0.5).abs() < 1e-9);
        assert!((tau[1] - 1.0 * GRAVITY * 0.25).abs() < 1e-9);
    }

    #[test]
    fn inverse_dynamics_rejects_wrong_length() {
        let sim = two_link();
        let result = sim.inverse_dynamics(0, &[0.0], &[0.0], &[0.0]);
        assert!(matches!(result, Err(ManipError::DimensionMismatch { .. })));
    }

    #[test]
    fn mass_matrix_is_diagonal() {
        let sim = two_link();
        let m = sim.mass_matrix(0, &[0.3, -0.2]).unwrap();
        assert_eq!(m.len(), 4);
        assert!((m[0] - 0.5).abs() < 1e-9);
        assert_eq!(m[1], 0.0);
        assert_eq!(m[2], 0.0);
        assert!((m[3] - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn motor_commands_are_recorded() {
        let mut sim = two_link();
        sim.set_joint_motor_control_array(0, &torque(vec![1, 2], vec![1.0, 2.0]))
            .unwrap();
        assert_eq!(sim.commands().len(), 1);
        assert_eq!(sim.commands()[0].forces, vec![1.0, 2.0]);
        sim.clear_commands();
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn injected_fault_fails_only_the_chosen_call() {
        let mut sim = two_link();
        sim.set_fault(Some(SimCall::MassMatrix));
        assert!(sim.mass_matrix(0, &[0.0, 0.0]).is_err());
        assert!(sim.joint_state(0, 1).is_ok());
        sim.set_fault(None);
        assert!(sim.mass_matrix(0, &[0.0, 0.0]).is_ok());
    }

    #[test]
    fn gravity_compensation_holds_position() {
        let mut sim = two_link();
        sim.set_joint_state(1, JointSensorState { position: 0.4, velocity: 0.0 })
            .unwrap();
        sim.set_joint_state(2, JointSensorState { position: -0.3, velocity: 0.0 })
            .unwrap();
        for _ in 0..100 {
            let tau = sim
                .inverse_dynamics(
                    0,
                    &[sim.joints[1].state.position, sim.joints[2].state.position],
                    &[sim.joints[1].state.velocity, sim.joints[2].state.velocity],
                    &[0.0, 0.0],
                )
                .unwrap();
            sim.set_joint_motor_control_array(0, &torque(vec![1, 2], tau)).unwrap();
            sim.step(0.001);
        }
        assert!((sim.joint_state(0, 1).unwrap().position - 0.4).abs() < 1e-6);
        assert!((sim.joint_state(0, 2).unwrap().position + 0.3).abs() < 1e-6);
    }

    #[test]
    fn released_joint_falls_under_gravity() {
        let mut sim = two_link();
        sim.set_joint_motor_control_array(
            0,
            &MotorArrayCommand {
                mode: MotorControlMode::Velocity,
                joint_indices: vec![1, 2],
                forces: vec![0.0, 0.0],
                target_positions: None,
            },
        )
        .unwrap();
        sim.step(0.01);
        assert!(sim.joint_state(0, 1).unwrap().velocity < 0.0);
    }

    #[test]
    fn out_of_range_command_changes_no_motor() {
        let mut sim = two_link();
        let result = sim.set_joint_motor_control_array(0, &torque(vec![1, 7], vec![3.0, 3.0]));
        assert!(matches!(result, Err(ManipError::Simulator { .. })));
        assert!(sim.commands().is_empty());
        assert_eq!(sim.motors[1].mode, MotorControlMode::Velocity);
        assert_eq!(sim.motors[1].force, DEFAULT_BRAKE_FORCE);
    }

    #[test]
    fn disconnected_builder() {
        let sim = SimBackend::builder().disconnected().build();
        assert!(!sim.is_connected());
    }
}
