//! Demo configuration – reads/writes `~/.manip/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use manip_control::{BrakeReleasePolicy, DEFAULT_MAX_FORCE, ManipulatorConfig};
use manip_hal::{SimBackend, SimJoint};
use manip_types::ControlMode;
use serde::{Deserialize, Serialize};

/// Joint kinds the demo simulator can model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    #[default]
    Revolute,
    Prismatic,
    Fixed,
}

/// One joint of the simulated body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    #[serde(default)]
    pub kind: JointKind,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Distance from the joint axis to the link's centre of mass.
    #[serde(default = "default_lever")]
    pub lever: f64,
    #[serde(default)]
    pub damping: f64,
}

impl JointSpec {
    fn to_sim_joint(&self) -> SimJoint {
        match self.kind {
            JointKind::Revolute => SimJoint::revolute(&self.name, self.mass, self.lever),
            JointKind::Prismatic => SimJoint::prismatic(&self.name, self.mass, self.lever),
            JointKind::Fixed => SimJoint::fixed(&self.name),
        }
        .with_damping(self.damping)
    }
}

/// Config-file spelling of [`BrakeReleasePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseBrakes {
    #[default]
    Always,
    FromPositionControl,
}

impl From<ReleaseBrakes> for BrakeReleasePolicy {
    fn from(value: ReleaseBrakes) -> Self {
        match value {
            ReleaseBrakes::Always => BrakeReleasePolicy::Always,
            ReleaseBrakes::FromPositionControl => BrakeReleasePolicy::FromPositionControlOnly,
        }
    }
}

/// Persisted demo configuration stored in `~/.manip/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Used in port names and log fields.
    #[serde(default = "default_robot_name")]
    pub robot_name: String,

    #[serde(default)]
    pub body_id: i32,

    #[serde(default = "default_cycle_period_ms")]
    pub cycle_period_ms: u64,

    /// Stop after this many cycles; 0 runs until Ctrl-C or `/quit`.
    #[serde(default)]
    pub max_cycles: u64,

    /// Per-joint force bound for the simulator PD loop.
    #[serde(default = "default_max_force")]
    pub max_force: f64,

    #[serde(default)]
    pub release_brakes: ReleaseBrakes,

    /// Mode requested right after configuration.
    #[serde(default = "default_initial_mode")]
    pub initial_mode: ControlMode,

    #[serde(default = "default_joints")]
    pub joints: Vec<JointSpec>,
}

fn default_robot_name() -> String {
    "arm".to_string()
}
fn default_cycle_period_ms() -> u64 {
    10
}
fn default_max_force() -> f64 {
    DEFAULT_MAX_FORCE
}
fn default_initial_mode() -> ControlMode {
    ControlMode::PositionControl
}
fn default_mass() -> f64 {
    1.0
}
fn default_lever() -> f64 {
    0.5
}
fn default_joints() -> Vec<JointSpec> {
    vec![
        JointSpec {
            name: "base_mount".to_string(),
            kind: JointKind::Fixed,
            mass: 0.0,
            lever: 0.0,
            damping: 0.0,
        },
        JointSpec {
            name: "shoulder".to_string(),
            kind: JointKind::Revolute,
            mass: 4.0,
            lever: 0.3,
            damping: 0.5,
        },
        JointSpec {
            name: "elbow".to_string(),
            kind: JointKind::Revolute,
            mass: 2.0,
            lever: 0.25,
            damping: 0.3,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot_name: default_robot_name(),
            body_id: 0,
            cycle_period_ms: default_cycle_period_ms(),
            max_cycles: 0,
            max_force: default_max_force(),
            release_brakes: ReleaseBrakes::default(),
            initial_mode: default_initial_mode(),
            joints: default_joints(),
        }
    }
}

impl Config {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms.max(1))
    }

    pub fn manipulator_config(&self) -> ManipulatorConfig {
        ManipulatorConfig {
            max_force: self.max_force,
            brake_release: self.release_brakes.into(),
        }
    }

    /// The simulated body described by `joints`, exposed under `body_id`.
    pub fn build_sim(&self) -> SimBackend {
        self.joints
            .iter()
            .fold(SimBackend::builder().with_body_id(self.body_id), |b, j| {
                b.with_joint(j.to_sim_joint())
            })
            .build()
    }
}

/// Return the path to `~/.manip/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".manip").join("config.toml")
}

/// `--config <path>` from the command line, else the default path.
pub fn path_from_args<I: IntoIterator<Item = String>>(args: I) -> Result<PathBuf, String> {
    let mut args = args.into_iter();
    match args.next().as_deref() {
        None => Ok(config_path()),
        Some("--config") => args
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| "--config needs a path".to_string()),
        Some(other) => Err(format!("Unknown argument: {other}")),
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
///
/// Environment overrides are not applied here; see [`apply_env_overrides`].
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `MANIP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MANIP_ROBOT_NAME` | `robot_name` |
/// | `MANIP_CYCLE_PERIOD_MS` | `cycle_period_ms` |
/// | `MANIP_MAX_CYCLES` | `max_cycles` |
/// | `MANIP_INITIAL_MODE` | `initial_mode` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MANIP_ROBOT_NAME")
        && !v.is_empty()
    {
        cfg.robot_name = v;
    }
    if let Ok(v) = std::env::var("MANIP_CYCLE_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.cycle_period_ms = ms;
    }
    if let Ok(v) = std::env::var("MANIP_MAX_CYCLES")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.max_cycles = n;
    }
    if let Ok(v) = std::env::var("MANIP_INITIAL_MODE")
        && let Ok(mode) = v.parse::<ControlMode>()
    {
        cfg.initial_mode = mode;
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
