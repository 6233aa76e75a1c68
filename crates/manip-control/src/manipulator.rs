//! [`RobotManipulator`] – one simulated arm bound to its ports.
//!
//! Owns everything the control core keeps per robot: the active kinematic
//! chain, the per-joint buffers, the command inputs and feedback outputs, and
//! the mode state machine.  An external scheduler drives it once per period:
//!
//! ```text
//! sense() → read_from_ports() → act() → write_to_ports()
//! ```
//!
//! Nothing here blocks or spawns; every call runs to completion against the
//! [`Simulator`] it was built with.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut robot = RobotManipulator::new("arm", 0, sim, ManipulatorConfig::default());
//! robot.configure()?;
//! robot.set_control_mode("JointGravComp")?;
//! loop {
//!     robot.sense()?;
//!     robot.read_from_ports()?;
//!     robot.act()?;
//!     robot.write_to_ports()?;
//! }
//! ```

use manip_hal::{BodyId, Simulator};
use manip_middleware::{InputPort, OutputPort, PortDescriptor, PortRegistry, PortWriter};
use manip_types::{ControlMode, ManipError, MotorArrayCommand, MotorControlMode};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::chain::KinematicChain;
use crate::egress::FeedbackOutputs;
use crate::ingress::{CommandBuffers, CommandInputs, IngressReport};
use crate::mode::{BrakeReleasePolicy, ModeMachine, ModeRequest, Transition, TransitionSetup};
use crate::sampler::{self, DynamicsTerms, SensorSnapshot};

/// Force bound applied to every joint when the PD loop is configured.
pub const DEFAULT_MAX_FORCE: f64 = 200.0;

/// Tunables of one manipulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManipulatorConfig {
    pub max_force: f64,
    pub brake_release: BrakeReleasePolicy,
}

impl Default for ManipulatorConfig {
    fn default() -> Self {
        Self {
            max_force: DEFAULT_MAX_FORCE,
            brake_release: BrakeReleasePolicy::Always,
        }
    }
}

/// What `act` did this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActReport {
    /// The transition applied at the top of the cycle, if any.
    pub transition: Option<Transition>,
    /// The mode whose command was sent.
    pub mode: ControlMode,
}

// ────────────────────────────────────────────────────────────────────────────
// Port names
// ────────────────────────────────────────────────────────────────────────────

pub fn position_command_port(robot: &str) -> String {
    format!("in_{robot}_JointPositionCtrl_cmd")
}

pub fn torque_command_port(robot: &str) -> String {
    format!("in_{robot}_JointTorqueCtrl_cmd")
}

pub fn gravity_feedback_port(robot: &str) -> String {
    format!("out_{robot}_gc_fdb")
}

pub fn inertia_feedback_port(robot: &str) -> String {
    format!("out_{robot}_inertia_fdb")
}

pub fn position_feedback_port(robot: &str) -> String {
    format!("out_{robot}_position_fdb")
}

pub fn velocity_feedback_port(robot: &str) -> String {
    format!("out_{robot}_velocities_fdb")
}

// ────────────────────────────────────────────────────────────────────────────
// RobotManipulator
// ────────────────────────────────────────────────────────────────────────────

/// Per-robot state that only exists after a successful `configure`.
struct Configured {
    chain: KinematicChain,
    max_forces: Vec<f64>,
    target_positions: Vec<f64>,
    zero_forces: Vec<f64>,
    snapshot: SensorSnapshot,
    dynamics: DynamicsTerms,
    commands: CommandBuffers,
    inputs: CommandInputs,
    outputs: FeedbackOutputs,
}

/// A manipulator controlled through a [`Simulator`].
pub struct RobotManipulator<S: Simulator> {
    name: String,
    body_id: BodyId,
    sim: S,
    config: ManipulatorConfig,
    modes: ModeMachine,
    ports: PortRegistry,
    state: Option<Configured>,
}

impl<S: Simulator> RobotManipulator<S> {
    /// Bind `body_id` in `sim` under `name`.  Nothing is queried until
    /// [`configure`](Self::configure).
    ///
    /// The robot starts in gravity compensation with position control
    /// requested.
    pub fn new(
        name: impl Into<String>,
        body_id: BodyId,
        sim: S,
        config: ManipulatorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            body_id,
            sim,
            config,
            modes: ModeMachine::new(
                ControlMode::GravityCompensation,
                ControlMode::PositionControl,
                config.brake_release,
            ),
            ports: PortRegistry::new(),
            state: None,
        }
    }

    // ── Setup ───────────────────────────────────────────────────────────────

    /// Discover the actuated joints, size every buffer, and declare the ports.
    ///
    /// On error the previous configuration (if any) is kept.  Calling it again
    /// replaces all ports, so writers and subscriptions taken earlier must be
    /// fetched again.
    pub fn configure(&mut self) -> Result<(), ManipError> {
        if !self.sim.is_connected() {
            warn!(robot = %self.name, "configure: simulator not connected");
            return Err(ManipError::NotConnected);
        }
        if self.body_id < 0 {
            warn!(robot = %self.name, body = self.body_id, "configure: no body");
            return Err(ManipError::NoBody {
                robot: self.name.clone(),
            });
        }
        let reported = self.sim.num_joints(self.body_id)?;
        if reported == 0 {
            return Err(ManipError::NoJoints {
                robot: self.name.clone(),
                reported,
            });
        }

        self.sim.sync_bodies()?;
        let chain = KinematicChain::discover(&self.sim, self.body_id, reported)?;
        if chain.is_empty() {
            warn!(robot = %self.name, reported, "configure: no actuated joints");
            return Err(ManipError::NoJoints {
                robot: self.name.clone(),
                reported,
            });
        }
        let n = chain.len();

        let inputs = CommandInputs::new(
            self.declare_input(
                position_command_port(&self.name),
                "Joint position command, one entry per active joint",
            ),
            self.declare_input(
                torque_command_port(&self.name),
                "Joint torque command, one entry per active joint",
            ),
        );
        let outputs = FeedbackOutputs::new(
            self.declare_output(
                position_feedback_port(&self.name),
                "Measured joint positions",
                DVector::zeros(n),
            ),
            self.declare_output(
                velocity_feedback_port(&self.name),
                "Measured joint velocities",
                DVector::zeros(n),
            ),
            self.declare_output(
                gravity_feedback_port(&self.name),
                "Gravity and Coriolis torque at the measured state",
                DVector::zeros(n),
            ),
            self.declare_output(
                inertia_feedback_port(&self.name),
                "Joint-space inertia matrix",
                DMatrix::zeros(n, n),
            ),
        );

        self.state = Some(Configured {
            chain,
            max_forces: vec![self.config.max_force; n],
            target_positions: vec![0.0; n],
            zero_forces: vec![0.0; n],
            snapshot: SensorSnapshot::zeros(n),
            dynamics: DynamicsTerms::zeros(n),
            commands: CommandBuffers::zeros(n),
            inputs,
            outputs,
        });
        self.modes.handle().request(ControlMode::PositionControl);
        info!(robot = %self.name, body = self.body_id, joints = n, "configured");
        Ok(())
    }

    fn declare_input(&mut self, name: String, doc: &str) -> InputPort<DVector<f64>> {
        if self.ports.add_port(PortDescriptor::input(&name, doc)).is_some() {
            debug!(port = %name, "replaced input port");
        }
        InputPort::new(name, doc)
    }

    fn declare_output<T: Clone>(&mut self, name: String, doc: &str, sample: T) -> OutputPort<T> {
        if self.ports.add_port(PortDescriptor::output(&name, doc)).is_some() {
            debug!(port = %name, "replaced output port");
        }
        OutputPort::new(name, doc).with_data_sample(sample)
    }

    /// Reorder the active joints by name.  All-or-nothing.
    pub fn set_active_kinematic_chain<N: AsRef<str>>(
        &mut self,
        names: &[N],
    ) -> Result<(), ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        if let Err(e) = state.chain.set_active(names) {
            warn!(robot = %self.name, error = %e, "rejected kinematic chain");
            return Err(e);
        }
        debug!(robot = %self.name, indices = ?state.chain.indices(), "active chain updated");
        Ok(())
    }

    /// PD targets used the next time position control is entered.
    pub fn set_target_positions(&mut self, targets: &[f64]) -> Result<(), ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        if targets.len() != state.target_positions.len() {
            return Err(ManipError::DimensionMismatch {
                what: "target positions".to_string(),
                expected: state.target_positions.len(),
                got: targets.len(),
            });
        }
        state.target_positions.copy_from_slice(targets);
        Ok(())
    }

    // ── Modes ───────────────────────────────────────────────────────────────

    /// Request a mode by name (`JointPositionCtrl`, `JointTorqueCtrl`,
    /// `JointGravComp`).  Takes effect at the next [`act`](Self::act).
    pub fn set_control_mode(&self, name: &str) -> Result<ControlMode, ManipError> {
        match self.modes.handle().request_named(name) {
            Ok(mode) => {
                info!(robot = %self.name, mode = %mode, "control mode requested");
                Ok(mode)
            }
            Err(e) => {
                warn!(robot = %self.name, error = %e, "ignoring mode request");
                Err(e)
            }
        }
    }

    pub fn request_mode(&self, mode: ControlMode) {
        self.modes.handle().request(mode);
    }

    /// Handle for requesting modes from another thread.
    pub fn mode_request(&self) -> ModeRequest {
        self.modes.handle()
    }

    pub fn active_mode(&self) -> ControlMode {
        self.modes.active()
    }

    pub fn requested_mode(&self) -> ControlMode {
        self.modes.requested()
    }

    // ── Cycle ───────────────────────────────────────────────────────────────

    /// Sample joint states and recompute gravity and inertia.
    pub fn sense(&mut self) -> Result<(), ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        sampler::sample(
            &self.sim,
            self.body_id,
            &state.chain,
            &mut state.snapshot,
            &mut state.dynamics,
        )
    }

    /// Copy whatever arrived on the command ports into the command buffers.
    pub fn read_from_ports(&mut self) -> Result<IngressReport, ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        Ok(state.inputs.read_into(&mut state.commands))
    }

    /// Apply a pending mode change, then send this cycle's command.
    ///
    /// If the setup call of a transition fails the active mode is left as it
    /// was and the request stays pending for the next cycle.
    pub fn act(&mut self) -> Result<ActReport, ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        let joint_indices = state.chain.indices().to_vec();

        let transition = self.modes.plan();
        if let Some(t) = &transition {
            match t.setup {
                TransitionSetup::ReleaseBrakes => {
                    info!(robot = %self.name, "releasing the brakes");
                    self.sim.set_joint_motor_control_array(
                        self.body_id,
                        &MotorArrayCommand {
                            mode: MotorControlMode::Velocity,
                            joint_indices: joint_indices.clone(),
                            forces: state.zero_forces.clone(),
                            target_positions: None,
                        },
                    )?;
                }
                TransitionSetup::ConfigurePd => {
                    self.sim.set_joint_motor_control_array(
                        self.body_id,
                        &MotorArrayCommand {
                            mode: MotorControlMode::PositionVelocityPd,
                            joint_indices: joint_indices.clone(),
                            forces: state.max_forces.clone(),
                            target_positions: Some(state.target_positions.clone()),
                        },
                    )?;
                }
                TransitionSetup::None => {}
            }
            self.modes.commit(t);
            info!(robot = %self.name, from = %t.from, to = %t.to, "control mode switched");
        }

        let mode = self.modes.active();
        let forces = match mode {
            ControlMode::GravityCompensation => state.dynamics.gravity.as_slice(),
            ControlMode::PositionControl => state.commands.position.as_slice(),
            ControlMode::TorqueControl => state.commands.torque.as_slice(),
        };
        self.sim.set_joint_motor_control_array(
            self.body_id,
            &MotorArrayCommand {
                mode: MotorControlMode::Torque,
                joint_indices,
                forces: forces.to_vec(),
                target_positions: None,
            },
        )?;
        Ok(ActReport { transition, mode })
    }

    /// Publish position, velocity, gravity and inertia feedback.
    pub fn write_to_ports(&mut self) -> Result<(), ManipError> {
        let state = self.state.as_mut().ok_or(ManipError::NotConfigured)?;
        state.outputs.write(&state.snapshot, &state.dynamics);
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body_id(&self) -> BodyId {
        self.body_id
    }

    pub fn config(&self) -> &ManipulatorConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.state.is_some()
    }

    /// Number of active joints; 0 before `configure`.
    pub fn num_joints(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.chain.len())
    }

    /// Simulator indices of the active joints, in control order.
    pub fn joint_indices(&self) -> &[usize] {
        self.state.as_ref().map(|s| s.chain.indices()).unwrap_or(&[])
    }

    pub fn max_forces(&self) -> &[f64] {
        self.state
            .as_ref()
            .map(|s| s.max_forces.as_slice())
            .unwrap_or(&[])
    }

    pub fn target_positions(&self) -> &[f64] {
        self.state
            .as_ref()
            .map(|s| s.target_positions.as_slice())
            .unwrap_or(&[])
    }

    pub fn snapshot(&self) -> Option<&SensorSnapshot> {
        self.state.as_ref().map(|s| &s.snapshot)
    }

    pub fn dynamics(&self) -> Option<&DynamicsTerms> {
        self.state.as_ref().map(|s| &s.dynamics)
    }

    pub fn commands(&self) -> Option<&CommandBuffers> {
        self.state.as_ref().map(|s| &s.commands)
    }

    pub fn feedback(&self) -> Option<&FeedbackOutputs> {
        self.state.as_ref().map(|s| &s.outputs)
    }

    pub fn position_command_writer(&self) -> Option<PortWriter<DVector<f64>>> {
        self.state.as_ref().map(|s| s.inputs.position_writer())
    }

    pub fn torque_command_writer(&self) -> Option<PortWriter<DVector<f64>>> {
        self.state.as_ref().map(|s| s.inputs.torque_writer())
    }

    /// Ports declared by the last successful `configure`.
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
