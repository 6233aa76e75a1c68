//! Scripted simulator double shared by the unit tests of this crate.

use std::cell::RefCell;
use std::collections::HashMap;

use manip_hal::{BodyId, Simulator};
use manip_types::{JointInfo, JointSensorState, JointType, ManipError, MotorArrayCommand};

/// Simulator that answers every query with fixed, scripted values and records
/// every motor command.
pub(crate) struct FixedSim {
    connected: bool,
    joints: Vec<JointInfo>,
    states: HashMap<usize, JointSensorState>,
    gravity: Option<Vec<f64>>,
    mass: Option<Vec<f64>>,
    fail_joint_state: bool,
    fail_mass_matrix: bool,
    fail_motor_control: bool,
    last_accelerations: RefCell<Option<Vec<f64>>>,
    pub(crate) commands: Vec<MotorArrayCommand>,
    pub(crate) syncs: usize,
}

fn joint(index: usize, joint_type: JointType, name: &str) -> JointInfo {
    JointInfo {
        index: Some(index),
        joint_type,
        name: name.to_string(),
    }
}

impl FixedSim {
    pub(crate) fn with_joints(joints: Vec<JointInfo>) -> Self {
        Self {
            connected: true,
            joints,
            states: HashMap::new(),
            gravity: None,
            mass: None,
            fail_joint_state: false,
            fail_mass_matrix: false,
            fail_motor_control: false,
            last_accelerations: RefCell::new(None),
            commands: Vec::new(),
            syncs: 0,
        }
    }

    /// A fixed mount at index 0 followed by revolute joints `j1` (1) and `j2` (2).
    pub(crate) fn two_joint() -> Self {
        Self::with_joints(vec![
            joint(0, JointType::Fixed, "mount"),
            joint(1, JointType::Revolute, "j1"),
            joint(2, JointType::Revolute, "j2"),
        ])
    }

    /// Revolute joints `j1` (0), `j2` (1), `j3` (2).
    pub(crate) fn three_joint() -> Self {
        Self::with_joints(vec![
            joint(0, JointType::Revolute, "j1"),
            joint(1, JointType::Revolute, "j2"),
            joint(2, JointType::Revolute, "j3"),
        ])
    }

    pub(crate) fn only_fixed() -> Self {
        Self::with_joints(vec![joint(0, JointType::Fixed, "mount")])
    }

    pub(crate) fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// States for the actuated joints, in discovery order.
    pub(crate) fn with_states(mut self, states: Vec<JointSensorState>) -> Self {
        let actuated: Vec<usize> = self
            .joints
            .iter()
            .filter(|j| j.is_actuated())
            .filter_map(|j| j.index)
            .collect();
        self.states = actuated.into_iter().zip(states).collect();
        self
    }

    pub(crate) fn with_gravity(mut self, gravity: Vec<f64>) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub(crate) fn with_mass_matrix(mut self, mass: Vec<f64>) -> Self {
        self.mass = Some(mass);
        self
    }

    pub(crate) fn failing_mass_matrix(mut self) -> Self {
        self.fail_mass_matrix = true;
        self
    }

    pub(crate) fn set_fail_joint_state(&mut self, fail: bool) {
        self.fail_joint_state = fail;
    }

    pub(crate) fn set_fail_motor_control(&mut self, fail: bool) {
        self.fail_motor_control = fail;
    }

    pub(crate) fn last_accelerations(&self) -> Option<Vec<f64>> {
        self.last_accelerations.borrow().clone()
    }

    fn fault(call: &str) -> ManipError {
        ManipError::Simulator {
            call: call.to_string(),
            details: "scripted failure".to_string(),
        }
    }
}

impl Simulator for FixedSim {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn sync_bodies(&mut self) -> Result<(), ManipError> {
        self.syncs += 1;
        Ok(())
    }

    fn num_joints(&self, _body: BodyId) -> Result<usize, ManipError> {
        Ok(self.joints.len())
    }

    fn joint_info(&self, _body: BodyId, joint: usize) -> Result<JointInfo, ManipError> {
        self.joints
            .get(joint)
            .cloned()
            .ok_or_else(|| Self::fault("joint_info"))
    }

    fn joint_state(&self, _body: BodyId, joint: usize) -> Result<JointSensorState, ManipError> {
        if self.fail_joint_state {
            return Err(Self::fault("joint_state"));
        }
        Ok(self.states.get(&joint).copied().unwrap_or_default())
    }

    fn inverse_dynamics(
        &self,
        _body: BodyId,
        positions: &[f64],
        _velocities: &[f64],
        accelerations: &[f64],
    ) -> Result<Vec<f64>, ManipError> {
        *self.last_accelerations.borrow_mut() = Some(accelerations.to_vec());
        Ok(self
            .gravity
            .clone()
            .unwrap_or_else(|| vec![0.0; positions.len()]))
    }

    fn mass_matrix(&self, _body: BodyId, positions: &[f64]) -> Result<Vec<f64>, ManipError> {
        if self.fail_mass_matrix {
            return Err(Self::fault("mass_matrix"));
        }
        let n = positions.len();
        Ok(self.mass.clone().unwrap_or_else(|| {
            let mut m = vec![0.0; n * n];
            for i in 0..n {
                m[i * n + i] = 1.0;
            }
            m
        }))
    }

    fn set_joint_motor_control_array(
        &mut self,
        _body: BodyId,
        command: &MotorArrayCommand,
    ) -> Result<(), ManipError> {
        if self.fail_motor_control {
            return Err(Self::fault("set_joint_motor_control_array"));
        }
        self.commands.push(command.clone());
        Ok(())
    }
}
