//! `manip-middleware` – the component plumbing around the control core.
//!
//! Moves vectors and matrices in and out of a component without caring what
//! they mean.
//!
//! # Modules
//!
//! - [`port`] – [`InputPort`] / [`OutputPort`]: latest-value command inputs
//!   with [`FlowStatus`] reporting, and broadcasting feedback outputs.
//! - [`registry`] – [`PortRegistry`]: the name-keyed table of ports a
//!   component has declared.
//! - [`bus`] – topic-based publish/subscribe event bus for control events and
//!   alerts, built on Tokio broadcast channels.

pub mod bus;
pub mod port;
pub mod registry;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use port::{FlowStatus, InputPort, OutputPort, PortWriter, Sample};
pub use registry::{PortDescriptor, PortDirection, PortRegistry};
