//! `manip-control` – the control core of one simulated manipulator.
//!
//! # Modules
//!
//! - [`chain`] – [`KinematicChain`]: joint name to simulator index mapping and
//!   the ordered set of active joints.
//! - [`sampler`] – per-cycle joint state sampling plus gravity/Coriolis torque
//!   and joint-space inertia from the simulator.
//! - [`ingress`] – [`CommandInputs`]: position and torque command ports copied
//!   into per-joint buffers.
//! - [`mode`] – [`ModeMachine`]: active/requested control modes with deferred
//!   apply, and the [`ModeRequest`] handle for other threads.
//! - [`egress`] – [`FeedbackOutputs`]: position, velocity, gravity and inertia
//!   feedback ports.
//! - [`manipulator`] – [`RobotManipulator`]: configuration plus the
//!   `sense → read_from_ports → act → write_to_ports` cycle.
//!
//! # Control modes
//!
//! | Mode | Per-cycle torque command | Entry setup |
//! |---|---|---|
//! | `JointGravComp` | gravity/Coriolis vector | release brakes |
//! | `JointPositionCtrl` | position command buffer | configure simulator PD loop |
//! | `JointTorqueCtrl` | torque command buffer | release brakes |

pub mod chain;
pub mod egress;
pub mod ingress;
pub mod manipulator;
pub mod mode;
pub mod sampler;

#[cfg(test)]
mod test_support;

pub use chain::KinematicChain;
pub use egress::FeedbackOutputs;
pub use ingress::{CommandBuffers, CommandInputs, IngressReport};
pub use manipulator::{ActReport, DEFAULT_MAX_FORCE, ManipulatorConfig, RobotManipulator};
pub use mode::{BrakeReleasePolicy, ModeMachine, ModeRequest, Transition, TransitionSetup};
pub use sampler::{DynamicsTerms, SensorSnapshot};
