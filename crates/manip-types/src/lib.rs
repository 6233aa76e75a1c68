use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Actuation strategy governing how commands are issued to the simulator.
///
/// The serialized names are the ones operators use on the command surface
/// (`"JointPositionCtrl"`, `"JointTorqueCtrl"`, `"JointGravComp"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlMode {
    /// Feed the gravity/Coriolis vector back as joint torque.
    #[serde(rename = "JointGravComp")]
    GravityCompensation = 0,
    /// Track the streamed position command through the simulator PD loop.
    #[serde(rename = "JointPositionCtrl")]
    PositionControl = 1,
    /// Pass the streamed torque command straight through.
    #[serde(rename = "JointTorqueCtrl")]
    TorqueControl = 2,
}

impl ControlMode {
    /// Operator-facing name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::GravityCompensation => "JointGravComp",
            ControlMode::PositionControl => "JointPositionCtrl",
            ControlMode::TorqueControl => "JointTorqueCtrl",
        }
    }

    /// `true` for the modes that drive the joints with raw torque.
    pub fn is_torque_related(&self) -> bool {
        matches!(
            self,
            ControlMode::GravityCompensation | ControlMode::TorqueControl
        )
    }

    /// Inverse of `mode as u8`; `None` for values no variant maps to.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ControlMode::GravityCompensation),
            1 => Some(ControlMode::PositionControl),
            2 => Some(ControlMode::TorqueControl),
            _ => None,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = ManipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JointGravComp" => Ok(ControlMode::GravityCompensation),
            "JointPositionCtrl" => Ok(ControlMode::PositionControl),
            "JointTorqueCtrl" => Ok(ControlMode::TorqueControl),
            other => Err(ManipError::UnknownControlMode(other.to_string())),
        }
    }
}

/// Kinematic type of a joint as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointType {
    Revolute,
    Prismatic,
    Spherical,
    Planar,
    /// Rigid mount; never actuated.
    Fixed,
}

/// Static description of one simulator joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointInfo {
    /// Simulator joint index, `None` when the simulator assigns none.
    pub index: Option<usize>,
    pub joint_type: JointType,
    pub name: String,
}

impl JointInfo {
    /// `true` when the joint has an index and is not a fixed mount.
    pub fn is_actuated(&self) -> bool {
        self.index.is_some() && self.joint_type != JointType::Fixed
    }
}

/// Raw sensor reading for a single joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointSensorState {
    pub position: f64,
    pub velocity: f64,
}

/// Low-level joint motor mode understood by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorControlMode {
    /// Velocity servo; with zero force the joints move freely.
    Velocity,
    /// Simulator-internal position/velocity PD loop bounded by `forces`.
    PositionVelocityPd,
    /// Raw joint torque.
    Torque,
}

/// One array-wide motor command, addressed to a list of joint indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorArrayCommand {
    pub mode: MotorControlMode,
    pub joint_indices: Vec<usize>,
    /// Force bound (velocity / PD modes) or applied force (torque mode).
    pub forces: Vec<f64>,
    /// PD target positions; only meaningful for `PositionVelocityPd`.
    pub target_positions: Option<Vec<f64>>,
}

/// Unified event wrapper for the control event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "manip-runtime::arm"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the control event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// The active control mode changed at the top of a cycle.
    ModeChanged {
        robot: String,
        from: ControlMode,
        to: ControlMode,
    },
    /// Joint motors were put in zero-force velocity mode before torque control.
    BrakesReleased { robot: String },
    /// A cycle phase failed and was skipped.
    CycleFault {
        robot: String,
        phase: String,
        message: String,
    },
}

/// Global error type spanning setup failures, simulator faults, and bad commands.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManipError {
    #[error("Simulator is not connected")]
    NotConnected,

    #[error("No body associated with robot '{robot}'")]
    NoBody { robot: String },

    #[error("Body of robot '{robot}' is not a manipulator ({reported} joints reported)")]
    NoJoints { robot: String, reported: usize },

    #[error("Robot is not configured")]
    NotConfigured,

    #[error("Kinematic chain has {got} joints, expected {expected}")]
    ChainLength { expected: usize, got: usize },

    #[error("Unknown joint name: {0}")]
    UnknownJoint(String),

    #[error("Unknown control mode: {0}")]
    UnknownControlMode(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("Simulator call {call} failed: {details}")]
    Simulator { call: String, details: String },
}
