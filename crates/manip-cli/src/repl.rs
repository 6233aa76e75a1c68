//! REPL – operator shell running beside the control loop.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /mode [name]   – show the modes, or request `JointPositionCtrl`,
//!                    `JointTorqueCtrl` or `JointGravComp`
//!   /cmd pos|trq v1 v2 …
//!                  – write a position or torque command, one value per joint
//!   /status        – cycle counters of the running loop
//!   /quit | /exit  – stop the loop and exit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use manip_control::ModeRequest;
use manip_middleware::PortWriter;
use manip_types::ControlMode;
use nalgebra::DVector;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// What the control loop last reported, shared with the REPL.
#[derive(Debug, Clone, Default)]
pub struct LoopStatus {
    pub cycles: u64,
    pub active: Option<ControlMode>,
    pub faults: u64,
    pub last_fault: Option<String>,
}

pub type SharedStatus = Arc<Mutex<LoopStatus>>;

/// Writers feeding the command ports of the running robot.
#[derive(Clone)]
pub struct CommandPorts {
    pub joints: usize,
    pub position: PortWriter<DVector<f64>>,
    pub torque: PortWriter<DVector<f64>>,
}

/// Which command port a `/cmd` line targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Position,
    Torque,
}

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<'a> {
    Help,
    Mode(Option<&'a str>),
    Cmd(Result<(Channel, Vec<f64>), String>),
    Status,
    Quit,
    Unknown(&'a str),
}

pub fn parse(line: &str) -> Command<'_> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("/help") => Command::Help,
        Some("/mode") => Command::Mode(words.next()),
        Some("/cmd") => Command::Cmd(parse_cmd(words)),
        Some("/status") => Command::Status,
        Some("/quit") | Some("/exit") => Command::Quit,
        _ => Command::Unknown(line),
    }
}

fn parse_cmd<'a>(
    mut words: impl Iterator<Item = &'a str>,
) -> Result<(Channel, Vec<f64>), String> {
    let channel = match words.next() {
        Some("pos") => Channel::Position,
        Some("trq") => Channel::Torque,
        Some(other) => return Err(format!("unknown channel '{other}', expected pos or trq")),
        None => return Err("missing channel, expected pos or trq".to_string()),
    };
    let values = words
        .map(|w| w.parse::<f64>().map_err(|_| format!("'{w}' is not a number")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((channel, values))
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(
    shutdown: Arc<AtomicBool>,
    modes: ModeRequest,
    ports: CommandPorts,
    status: SharedStatus,
) {
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let line = match editor.readline("manip> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match parse(line) {
            Command::Help => cmd_help(),
            Command::Mode(None) => cmd_show_mode(&modes, &status),
            Command::Mode(Some(name)) => cmd_request_mode(&modes, name),
            Command::Cmd(Ok((channel, values))) => {
                cmd_write(&ports, channel, values);
            }
            Command::Cmd(Err(e)) => println!("{}: {}", "Rejected".red(), e),
            Command::Status => cmd_status(&status),
            Command::Quit => {
                println!("{}", "Stopping control loop.".green());
                shutdown.store(true, Ordering::SeqCst);
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Commands".bold().underline());
    println!("  {}  – show active and requested mode", "/mode".bold().cyan());
    println!("  {}  – request a control mode", "/mode <name>".bold().cyan());
    println!(
        "  {}  – write a command, one value per joint",
        "/cmd pos|trq <v…>".bold().cyan()
    );
    println!("  {}  – loop counters", "/status".bold().cyan());
    println!("  {}  – stop and exit", "/quit  /exit".bold().cyan());
    println!();
    println!(
        "  Modes: {}, {}, {}",
        ControlMode::PositionControl.as_str().yellow(),
        ControlMode::TorqueControl.as_str().yellow(),
        ControlMode::GravityCompensation.as_str().yellow()
    );
    println!();
}

fn cmd_show_mode(modes: &ModeRequest, status: &SharedStatus) {
    let active = status
        .lock()
        .ok()
        .and_then(|s| s.active)
        .map_or_else(|| "-".to_string(), |m| m.to_string());
    println!("  Active    : {}", active.bold());
    println!("  Requested : {}", modes.get().to_string().yellow());
}

fn cmd_request_mode(modes: &ModeRequest, name: &str) {
    match modes.request_named(name) {
        Ok(mode) => println!("{} {}", "✓ Requested".green(), mode.to_string().bold()),
        Err(e) => println!("{}: {}", "Rejected".red(), e),
    }
}

fn cmd_write(ports: &CommandPorts, channel: Channel, values: Vec<f64>) -> bool {
    if values.len() != ports.joints {
        println!(
            "{}: expected {} value(s), got {}",
            "Rejected".red(),
            ports.joints,
            values.len()
        );
        return false;
    }
    let writer = match channel {
        Channel::Position => &ports.position,
        Channel::Torque => &ports.torque,
    };
    writer.write(DVector::from_vec(values));
    println!("{} {}", "✓ Sent to".green(), writer.port().bold());
    true
}

fn cmd_status(status: &SharedStatus) {
    let Ok(s) = status.lock() else {
        println!("{}", "Status unavailable".red());
        return;
    };
    println!("{}", "Control loop".bold().underline());
    println!("  Cycles : {}", s.cycles);
    println!("  Faults : {}", s.faults);
    if let Some(fault) = &s.last_fault {
        println!("  Last   : {}", fault.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manip_middleware::{InputPort, Sample};

    #[test]
    fn parse_recognises_commands() {
        assert_eq!(parse("/help"), Command::Help);
        assert_eq!(parse("/status"), Command::Status);
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/exit"), Command::Quit);
        assert_eq!(parse("/mode"), Command::Mode(None));
        assert_eq!(
            parse("/mode   JointTorqueCtrl"),
            Command::Mode(Some("JointTorqueCtrl"))
        );
        assert_eq!(parse("/start"), Command::Unknown("/start"));
    }

    #[test]
    fn parse_reads_command_values() {
        assert_eq!(
            parse("/cmd pos 0.5 -1"),
            Command::Cmd(Ok((Channel::Position, vec![0.5, -1.0])))
        );
        assert_eq!(parse("/cmd trq 2"), Command::Cmd(Ok((Channel::Torque, vec![2.0]))));
        assert!(matches!(parse("/cmd vel 1"), Command::Cmd(Err(_))));
        assert!(matches!(parse("/cmd pos one"), Command::Cmd(Err(_))));
        assert!(matches!(parse("/cmd"), Command::Cmd(Err(_))));
    }

    #[test]
    fn write_feeds_the_selected_port() {
        let mut position = InputPort::new("in_arm_JointPositionCtrl_cmd", "pos");
        let mut torque = InputPort::new("in_arm_JointTorqueCtrl_cmd", "trq");
        let ports = CommandPorts {
            joints: 2,
            position: position.writer(),
            torque: torque.writer(),
        };

        assert!(cmd_write(&ports, Channel::Torque, vec![1.0, 2.0]));
        assert_eq!(torque.read(), Sample::New(DVector::from_vec(vec![1.0, 2.0])));
        assert_eq!(position.read(), Sample::NoData);

        assert!(!cmd_write(&ports, Channel::Position, vec![1.0]));
        assert_eq!(position.read(), Sample::NoData);
    }

    #[test]
    fn request_mode_updates_shared_request() {
        let modes = ModeRequest::new(ControlMode::PositionControl);
        cmd_request_mode(&modes, "JointGravComp");
        assert_eq!(modes.get(), ControlMode::GravityCompensation);

        cmd_request_mode(&modes, "JointVelocityCtrl");
        assert_eq!(modes.get(), ControlMode::GravityCompensation);
    }
}
