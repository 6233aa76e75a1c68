//! Command ingress: latest position and torque commands from the framework.
//!
//! The two command channels are independent.  Each cycle both ports are read
//! once; a channel that delivered a value overwrites its whole buffer, a
//! channel with no data leaves its buffer exactly as it was.

use manip_middleware::{FlowStatus, InputPort, PortWriter, Sample};
use nalgebra::DVector;
use tracing::warn;

/// Last received command per channel, in active-chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuffers {
    pub position: DVector<f64>,
    pub torque: DVector<f64>,
}

impl CommandBuffers {
    pub fn zeros(num_joints: usize) -> Self {
        Self {
            position: DVector::zeros(num_joints),
            torque: DVector::zeros(num_joints),
        }
    }
}

/// What each channel delivered during one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressReport {
    pub position: FlowStatus,
    pub torque: FlowStatus,
}

/// The two command input ports of one robot.
pub struct CommandInputs {
    pub(crate) position: InputPort<DVector<f64>>,
    pub(crate) torque: InputPort<DVector<f64>>,
    dropped: u64,
}

impl CommandInputs {
    pub fn new(position: InputPort<DVector<f64>>, torque: InputPort<DVector<f64>>) -> Self {
        Self {
            position,
            torque,
            dropped: 0,
        }
    }

    /// Number of distinct commands rejected for having the wrong dimension.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Writer feeding the position command port.
    pub fn position_writer(&self) -> PortWriter<DVector<f64>> {
        self.position.writer()
    }

    /// Writer feeding the torque command port.
    pub fn torque_writer(&self) -> PortWriter<DVector<f64>> {
        self.torque.writer()
    }

    /// Read both ports once and copy whatever arrived into `buffers`.
    pub fn read_into(&mut self, buffers: &mut CommandBuffers) -> IngressReport {
        IngressReport {
            position: read_channel(&mut self.position, &mut buffers.position, &mut self.dropped),
            torque: read_channel(&mut self.torque, &mut buffers.torque, &mut self.dropped),
        }
    }
}

fn read_channel(
    port: &mut InputPort<DVector<f64>>,
    buffer: &mut DVector<f64>,
    dropped: &mut u64,
) -> FlowStatus {
    let sample = port.read();
    let status = sample.status();
    match sample {
        Sample::NoData => FlowStatus::NoData,
        Sample::Old(value) | Sample::New(value) => {
            if value.len() != buffer.len() {
                // An old sample was already reported when it arrived.
                if status == FlowStatus::NewData {
                    *dropped += 1;
                    warn!(
                        port = port.name(),
                        expected = buffer.len(),
                        got = value.len(),
                        "dropping command with wrong dimension"
                    );
                }
                return FlowStatus::NoData;
            }
            buffer.copy_from(&value);
            status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> CommandInputs {
        CommandInputs::new(
            InputPort::new("in_arm_JointPositionCtrl_cmd", "pos"),
            InputPort::new("in_arm_JointTorqueCtrl_cmd", "trq"),
        )
    }

    #[test]
    fn no_data_keeps_buffers() {
        let mut inputs = inputs();
        let mut buffers = CommandBuffers::zeros(2);
        buffers.position = DVector::from_vec(vec![0.5, -0.5]);

        let report = inputs.read_into(&mut buffers);
        assert_eq!(report.position, FlowStatus::NoData);
        assert_eq!(report.torque, FlowStatus::NoData);
        assert_eq!(buffers.position.as_slice(), &[0.5, -0.5]);
    }

    #[test]
    fn zero_valued_command_is_data() {
        let mut inputs = inputs();
        let mut buffers = CommandBuffers::zeros(2);
        buffers.torque = DVector::from_vec(vec![3.0, 3.0]);

        inputs.torque_writer().write(DVector::zeros(2));
        let report = inputs.read_into(&mut buffers);

        assert_eq!(report.torque, FlowStatus::NewData);
        assert_eq!(buffers.torque.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn torque_only_update_leaves_position_bit_identical() {
        let mut inputs = inputs();
        let mut buffers = CommandBuffers::zeros(3);
        inputs
            .position_writer()
            .write(DVector::from_vec(vec![0.1, f64::MIN_POSITIVE, -0.0]));
        inputs.read_into(&mut buffers);
        let before: Vec<u64> = buffers.position.iter().map(|v| v.to_bits()).collect();

        inputs
            .torque_writer()
            .write(DVector::from_vec(vec![1.0, 2.0, 3.0]));
        let report = inputs.read_into(&mut buffers);

        let after: Vec<u64> = buffers.position.iter().map(|v| v.to_bits()).collect();
        assert_eq!(report.torque, FlowStatus::NewData);
        assert_eq!(report.position, FlowStatus::OldData);
        assert_eq!(before, after);
        assert_eq!(buffers.torque.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn wrong_dimension_is_dropped() {
        let mut inputs = inputs();
        let mut buffers = CommandBuffers::zeros(2);
        inputs
            .position_writer()
            .write(DVector::from_vec(vec![1.0, 2.0, 3.0]));

        let report = inputs.read_into(&mut buffers);
        assert_eq!(report.position, FlowStatus::NoData);
        assert_eq!(buffers.position, DVector::zeros(2));
        assert_eq!(inputs.dropped(), 1);
    }

    #[test]
    fn stale_wrong_dimension_is_reported_once() {
        let mut inputs = inputs();
        let mut buffers = CommandBuffers::zeros(2);
        inputs.torque_writer().write(DVector::from_vec(vec![1.0]));

        for _ in 0..5 {
            let report = inputs.read_into(&mut buffers);
            assert_eq!(report.torque, FlowStatus::NoData);
        }
        assert_eq!(inputs.dropped(), 1);
        assert_eq!(buffers.torque, DVector::zeros(2));

        inputs.torque_writer().write(DVector::from_vec(vec![4.0, 5.0]));
        let report = inputs.read_into(&mut buffers);
        assert_eq!(report.torque, FlowStatus::NewData);
        assert_eq!(buffers.torque.as_slice(), &[4.0, 5.0]);
        assert_eq!(inputs.dropped(), 1);
    }
}
