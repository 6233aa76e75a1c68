//! `manip-runtime` – runs a configured manipulator at a fixed period.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`]: the periodic
//!   sense → read → act → write driver.  Publishes mode changes, brake
//!   releases, and phase faults on the [`EventBus`][manip_middleware::EventBus]
//!   and keeps [`CycleStats`].
//! - [`telemetry`] – [`init_tracing`]: installs the global `tracing`
//!   subscriber (compact or JSON) with an optional OTLP span exporter.

pub mod control_loop;
pub mod telemetry;

pub use control_loop::{ControlLoop, CyclePhase, CycleReport, CycleStats};
pub use telemetry::{TracerProviderGuard, init_tracing};
