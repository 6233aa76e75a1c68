//! Feedback egress: publishes the sampled state once per cycle.

use manip_middleware::OutputPort;
use nalgebra::{DMatrix, DVector};
use tokio::sync::broadcast;

use crate::sampler::{DynamicsTerms, SensorSnapshot};

/// The four feedback output ports of one robot.
pub struct FeedbackOutputs {
    pub(crate) position: OutputPort<DVector<f64>>,
    pub(crate) velocity: OutputPort<DVector<f64>>,
    pub(crate) gravity: OutputPort<DVector<f64>>,
    pub(crate) inertia: OutputPort<DMatrix<f64>>,
}

impl FeedbackOutputs {
    pub fn new(
        position: OutputPort<DVector<f64>>,
        velocity: OutputPort<DVector<f64>>,
        gravity: OutputPort<DVector<f64>>,
        inertia: OutputPort<DMatrix<f64>>,
    ) -> Self {
        Self {
            position,
            velocity,
            gravity,
            inertia,
        }
    }

    /// Publish position, velocity, gravity and inertia, in that order.
    ///
    /// Ports nobody listens to are still updated; see [`OutputPort::last`].
    pub fn write(&mut self, snapshot: &SensorSnapshot, dynamics: &DynamicsTerms) {
        self.position.write(snapshot.positions.clone());
        self.velocity.write(snapshot.velocities.clone());
        self.gravity.write(dynamics.gravity.clone());
        self.inertia.write(dynamics.inertia.clone());
    }

    pub fn subscribe_position(&self) -> broadcast::Receiver<DVector<f64>> {
        self.position.subscribe()
    }

    pub fn subscribe_velocity(&self) -> broadcast::Receiver<DVector<f64>> {
        self.velocity.subscribe()
    }

    pub fn subscribe_gravity(&self) -> broadcast::Receiver<DVector<f64>> {
        self.gravity.subscribe()
    }

    pub fn subscribe_inertia(&self) -> broadcast::Receiver<DMatrix<f64>> {
        self.inertia.subscribe()
    }

    pub fn last_position(&self) -> Option<&DVector<f64>> {
        self.position.last()
    }

    pub fn last_velocity(&self) -> Option<&DVector<f64>> {
        self.velocity.last()
    }

    pub fn last_gravity(&self) -> Option<&DVector<f64>> {
        self.gravity.last()
    }

    pub fn last_inertia(&self) -> Option<&DMatrix<f64>> {
        self.inertia.last()
    }
}
