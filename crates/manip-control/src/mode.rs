//! Control-mode state machine with deferred apply.
//!
//! Two modes exist at any time: the *active* mode, owned by the control
//! cycle, and the *requested* mode, which anyone holding a [`ModeRequest`]
//! may change from any thread.  The request is sampled exactly once at the top
//! of each act phase; if it differs from the active mode a [`Transition`] is
//! planned, carried out by the caller, and then committed.
//!
//! # Transition setup
//!
//! | Requested | Setup issued before the first command |
//! |---|---|
//! | `PositionControl` | configure the simulator PD loop ([`TransitionSetup::ConfigurePd`]) |
//! | `TorqueControl` / `GravityCompensation` | release the brakes ([`TransitionSetup::ReleaseBrakes`]), subject to [`BrakeReleasePolicy`] |

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use manip_types::{ControlMode, ManipError};

/// When entering a torque-related mode, whether to release the brakes even if
/// the previous mode was torque-related too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrakeReleasePolicy {
    /// Release on every transition into `TorqueControl` or
    /// `GravityCompensation`, including between the two.
    #[default]
    Always,
    /// Release only when coming from `PositionControl`.
    FromPositionControlOnly,
}

/// One-off actuator setup performed while switching modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSetup {
    /// Zero-force velocity mode on all active joints.
    ReleaseBrakes,
    /// Position/velocity PD mode with the configured force bounds and targets.
    ConfigurePd,
    /// Nothing to do beyond switching.
    None,
}

/// A planned switch from one mode to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ControlMode,
    pub to: ControlMode,
    pub setup: TransitionSetup,
}

/// Shared, lock-free cell holding the requested control mode.
#[derive(Debug, Clone)]
pub struct ModeRequest(Arc<AtomicU8>);

impl ModeRequest {
    pub fn new(mode: ControlMode) -> Self {
        Self(Arc::new(AtomicU8::new(mode as u8)))
    }

    /// Request `mode`; takes effect at the next act phase.
    pub fn request(&self, mode: ControlMode) {
        self.0.store(mode as u8, Ordering::Release);
    }

    /// Request a mode by its operator name.  Unknown names leave the request
    /// unchanged.
    pub fn request_named(&self, name: &str) -> Result<ControlMode, ManipError> {
        let mode: ControlMode = name.parse()?;
        self.request(mode);
        Ok(mode)
    }

    /// Currently requested mode.
    pub fn get(&self) -> ControlMode {
        // Only ControlMode discriminants are ever stored.
        ControlMode::from_u8(self.0.load(Ordering::Acquire))
            .unwrap_or(ControlMode::GravityCompensation)
    }
}

/// Active/requested mode pair for one robot.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    active: ControlMode,
    requested: ModeRequest,
    policy: BrakeReleasePolicy,
}

impl ModeMachine {
    /// Start in `active` with `requested` pending.
    pub fn new(active: ControlMode, requested: ControlMode, policy: BrakeReleasePolicy) -> Self {
        Self {
            active,
            requested: ModeRequest::new(requested),
            policy,
        }
    }

    pub fn active(&self) -> ControlMode {
        self.active
    }

    pub fn requested(&self) -> ControlMode {
        self.requested.get()
    }

    pub fn policy(&self) -> BrakeReleasePolicy {
        self.policy
    }

    /// A handle other threads can use to request modes.
    pub fn handle(&self) -> ModeRequest {
        self.requested.clone()
    }

    /// Sample the request once and plan the transition it implies, if any.
    pub fn plan(&self) -> Option<Transition> {
        let to = self.requested.get();
        if to == self.active {
            return None;
        }
        let setup = match to {
            ControlMode::PositionControl => TransitionSetup::ConfigurePd,
            ControlMode::TorqueControl | ControlMode::GravityCompensation => match self.policy {
                BrakeReleasePolicy::Always => TransitionSetup::ReleaseBrakes,
                BrakeReleasePolicy::FromPositionControlOnly if !self.active.is_torque_related() => {
                    TransitionSetup::ReleaseBrakes
                }
                BrakeReleasePolicy::FromPositionControlOnly => TransitionSetup::None,
            },
        };
        Some(Transition {
            from: self.active,
            to,
            setup,
        })
    }

    /// Make `transition.to` the active mode.
    pub fn commit(&mut self, transition: &Transition) {
        self.active = transition.to;
    }
}
