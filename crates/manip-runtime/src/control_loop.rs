//! [`ControlLoop`] – drives one [`RobotManipulator`] at a fixed period.
//!
//! Each cycle runs the four phases in order:
//!
//! 1. **Sense** – sample joint states and dynamics.  On failure the act phase
//!    is skipped and the previous command stays latched in the simulator.
//! 2. **Read** – copy new position/torque commands into the buffers.
//! 3. **Act** – apply a pending mode change, then send the cycle's command.
//! 4. **Write** – publish the feedback ports.  Runs every cycle; after a
//!    failed sense it republishes the last good sample.
//!
//! Mode changes, brake releases, and phase faults are published on the
//! [`EventBus`]: the first two on [`Topic::ControlEvents`], faults on
//! [`Topic::SystemAlerts`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use manip_control::{ActReport, IngressReport, RobotManipulator, TransitionSetup};
use manip_hal::Simulator;
use manip_middleware::{EventBus, Topic};
use manip_types::{ControlMode, Event, EventPayload, ManipError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Running counters over every cycle executed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycles: u64,
    pub sense_faults: u64,
    pub act_faults: u64,
    /// Mode transitions applied.
    pub transitions: u64,
    /// Duration of the last cycle.
    pub last_cycle: Duration,
    /// Longest cycle seen.
    pub max_cycle: Duration,
}

impl CycleStats {
    fn record(&mut self, elapsed: Duration) {
        self.cycles += 1;
        self.last_cycle = elapsed;
        self.max_cycle = self.max_cycle.max(elapsed);
    }
}

/// Cycle phase that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Sense,
    Read,
    Act,
    Write,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Sense => "sense",
            CyclePhase::Read => "read",
            CyclePhase::Act => "act",
            CyclePhase::Write => "write",
        }
    }
}

/// Outcome of one [`ControlLoop::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub ingress: Option<IngressReport>,
    pub act: Option<ActReport>,
    /// First phase that failed, with its error.
    pub fault: Option<(CyclePhase, ManipError)>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Periodic driver for one configured manipulator.
pub struct ControlLoop<S: Simulator> {
    robot: RobotManipulator<S>,
    bus: EventBus,
    stats: CycleStats,
    source: String,
}

impl<S: Simulator> ControlLoop<S> {
    /// Wrap an already configured robot.
    pub fn new(robot: RobotManipulator<S>, bus: EventBus) -> Self {
        let source = format!("manip-runtime::{}", robot.name());
        Self {
            robot,
            bus,
            stats: CycleStats::default(),
            source,
        }
    }

    pub fn robot(&self) -> &RobotManipulator<S> {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut RobotManipulator<S> {
        &mut self.robot
    }

    /// A clone of the bus events are published on.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run sense → read → act → write once.
    pub fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            cycle: self.stats.cycles + 1,
            ingress: None,
            act: None,
            fault: None,
        };

        let sensed = match self.robot.sense() {
            Ok(()) => true,
            Err(e) => {
                self.stats.sense_faults += 1;
                self.fault(&mut report, CyclePhase::Sense, e);
                false
            }
        };

        let read = match self.robot.read_from_ports() {
            Ok(ingress) => {
                report.ingress = Some(ingress);
                true
            }
            Err(e) => {
                self.fault(&mut report, CyclePhase::Read, e);
                false
            }
        };

        if sensed && read {
            self.act(&mut report);
        }

        if let Err(e) = self.robot.write_to_ports() {
            self.fault(&mut report, CyclePhase::Write, e);
        }

        let elapsed = started.elapsed();
        self.stats.record(elapsed);
        debug!(cycle = report.cycle, elapsed_us = elapsed.as_micros() as u64, "cycle done");
        report
    }

    fn act(&mut self, report: &mut CycleReport) {
        let before = self.robot.active_mode();
        match self.robot.act() {
            Ok(act) => {
                if let Some(t) = &act.transition {
                    self.mode_changed(t.from, t.to);
                    if t.setup == TransitionSetup::ReleaseBrakes {
                        self.publish(
                            Topic::ControlEvents,
                            EventPayload::BrakesReleased {
                                robot: self.robot.name().to_string(),
                            },
                        );
                    }
                }
                report.act = Some(act);
            }
            Err(e) => {
                self.stats.act_faults += 1;
                // The switch may have been committed before the command failed.
                let after = self.robot.active_mode();
                if after != before {
                    self.mode_changed(before, after);
                }
                self.fault(report, CyclePhase::Act, e);
            }
        }
    }

    /// Run cycles every `period` until `stop` is set or `max_cycles` cycles
    /// have run (`0` means no limit).  `after_cycle` sees every report.
    pub async fn run<F>(
        &mut self,
        period: Duration,
        max_cycles: u64,
        stop: Arc<AtomicBool>,
        mut after_cycle: F,
    ) -> &CycleStats
    where
        F: FnMut(&CycleReport),
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            robot = self.robot.name(),
            period_ms = period.as_millis() as u64,
            max_cycles,
            "control loop started"
        );
        let mut ran = 0u64;
        while !stop.load(Ordering::SeqCst) && (max_cycles == 0 || ran < max_cycles) {
            ticker.tick().await;
            let report = self.run_cycle();
            after_cycle(&report);
            ran += 1;
        }
        info!(
            robot = self.robot.name(),
            cycles = self.stats.cycles,
            sense_faults = self.stats.sense_faults,
            act_faults = self.stats.act_faults,
            "control loop stopped"
        );
        &self.stats
    }

    fn mode_changed(&mut self, from: ControlMode, to: ControlMode) {
        self.stats.transitions += 1;
        self.publish(
            Topic::ControlEvents,
            EventPayload::ModeChanged {
                robot: self.robot.name().to_string(),
                from,
                to,
            },
        );
    }

    fn fault(&self, report: &mut CycleReport, phase: CyclePhase, error: ManipError) {
        warn!(
            robot = self.robot.name(),
            cycle = report.cycle,
            phase = phase.as_str(),
            error = %error,
            "cycle phase failed"
        );
        self.publish(
            Topic::SystemAlerts,
            EventPayload::CycleFault {
                robot: self.robot.name().to_string(),
                phase: phase.as_str().to_string(),
                message: error.to_string(),
            },
        );
        report.fault.get_or_insert((phase, error));
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        // No subscribers is fine.
        let _ = self.bus.publish_to(topic, Event::new(&self.source, payload));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
