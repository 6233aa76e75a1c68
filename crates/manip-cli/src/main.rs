//! `manip-cli` – runs a simulated manipulator under the control loop.
//!
//! The binary:
//!
//! 1. Loads `~/.manip/config.toml` (or `--config <path>`), writing the
//!    defaults on first run, then applies `MANIP_*` overrides.
//! 2. Builds the simulated body, configures the robot, and requests the
//!    configured initial mode.
//! 3. Runs the control loop on a Tokio runtime, stepping the simulation after
//!    every cycle, while an interactive REPL accepts mode requests and joint
//!    commands.
//! 4. Stops on **Ctrl-C**, `/quit`, or after `max_cycles` cycles.

mod config;
mod repl;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use manip_control::RobotManipulator;
use manip_middleware::{EventBus, Topic, TopicReceiver};
use manip_runtime::{ControlLoop, CycleReport, init_tracing};
use manip_types::EventPayload;
use tracing::{error, info, warn};

use crate::repl::{CommandPorts, LoopStatus, SharedStatus};

fn main() {
    let _guard = init_tracing("manip");
    print_banner();

    let path = match config::path_from_args(std::env::args().skip(1)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: {}", "Usage error".red(), e);
            eprintln!("  usage: manip [--config <path>]");
            std::process::exit(2);
        }
    };
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping control loop …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    // ── Robot ─────────────────────────────────────────────────────────────
    let sim = Arc::new(Mutex::new(cfg.build_sim()));
    let mut robot = RobotManipulator::new(
        cfg.robot_name.clone(),
        cfg.body_id,
        sim.clone(),
        cfg.manipulator_config(),
    );
    if let Err(e) = robot.configure() {
        error!(robot = %cfg.robot_name, error = %e, "configuration failed");
        println!("{}: {}", "Configuration failed".red(), e);
        std::process::exit(1);
    }
    robot.request_mode(cfg.initial_mode);
    println!(
        "  Robot {} configured with {} active joint(s), requesting {}",
        cfg.robot_name.bold(),
        robot.num_joints(),
        cfg.initial_mode.to_string().yellow()
    );
    for port in robot.ports().ports(manip_middleware::PortDirection::Input) {
        println!("    {} {}", "in ".dimmed(), port.name);
    }
    for port in robot.ports().ports(manip_middleware::PortDirection::Output) {
        println!("    {} {}", "out".dimmed(), port.name);
    }

    let modes = robot.mode_request();
    let (Some(position), Some(torque)) =
        (robot.position_command_writer(), robot.torque_command_writer())
    else {
        error!(robot = %cfg.robot_name, "command ports missing after configure");
        std::process::exit(1);
    };
    let command_ports = CommandPorts {
        joints: robot.num_joints(),
        position,
        torque,
    };
    let bus = EventBus::default();
    let mut control = ControlLoop::new(robot, bus.clone());

    // ── REPL ──────────────────────────────────────────────────────────────
    let status: SharedStatus = Arc::new(Mutex::new(LoopStatus::default()));
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    {
        let shutdown = shutdown.clone();
        let status = status.clone();
        std::thread::spawn(move || repl::run(shutdown, modes, command_ports, status));
    }

    // ── Control loop ──────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            std::process::exit(1);
        }
    };
    let dt = cfg.cycle_period().as_secs_f64();
    runtime.block_on(async {
        tokio::spawn(print_events(bus.subscribe_to(Topic::ControlEvents)));
        tokio::spawn(print_events(bus.subscribe_to(Topic::SystemAlerts)));

        let stats = control
            .run(cfg.cycle_period(), cfg.max_cycles, shutdown.clone(), |report| {
                match sim.lock() {
                    Ok(mut s) => s.step(dt),
                    Err(_) => warn!("simulator lock poisoned; not stepping"),
                }
                update_status(&status, report);
            })
            .await;
        info!(
            cycles = stats.cycles,
            transitions = stats.transitions,
            max_cycle_us = stats.max_cycle.as_micros() as u64,
            "shutdown"
        );
    });
    shutdown.store(true, Ordering::SeqCst);
    println!("{}", "  ✓ Exiting.".green());
}

fn update_status(status: &SharedStatus, report: &CycleReport) {
    let Ok(mut s) = status.lock() else {
        return;
    };
    s.cycles = report.cycle;
    if let Some(act) = &report.act {
        s.active = Some(act.mode);
    }
    if let Some((phase, e)) = &report.fault {
        s.faults += 1;
        s.last_fault = Some(format!("cycle {} {}: {}", report.cycle, phase.as_str(), e));
    }
}

async fn print_events(mut rx: TopicReceiver) {
    while let Some(event) = rx.recv().await {
        match event.payload {
            EventPayload::ModeChanged { robot, from, to } => println!(
                "\n  {} {}: {} → {}",
                "mode".cyan().bold(),
                robot,
                from,
                to.to_string().bold()
            ),
            EventPayload::BrakesReleased { robot } => {
                println!("\n  {} {}: brakes released", "mode".cyan().bold(), robot)
            }
            EventPayload::CycleFault { robot, phase, message } => println!(
                "\n  {} {} {}: {}",
                "fault".red().bold(),
                robot,
                phase,
                message.dimmed()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "manip".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Simulated manipulator control core");
    println!();
}
