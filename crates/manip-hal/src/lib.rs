//! `manip-hal` – simulator abstraction for the manipulator control core.
//!
//! # Modules
//!
//! - [`simulator`] – [`Simulator`]: the narrow interface the control core
//!   needs from a physics backend (joint state, inverse dynamics, mass matrix,
//!   motor arrays, joint discovery).
//! - [`sim`] – [`SimBackend`][sim::SimBackend]: an in-process point-mass
//!   simulator that records every motor command, for tests and the demo CLI.

pub mod sim;
pub mod simulator;

pub use sim::{SimBackend, SimCall, SimJoint};
pub use simulator::{BodyId, Simulator};
