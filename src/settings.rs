//! Control-plane settings.
//!
//! Settings are read from an optional TOML file. Every field has a default so
//! an empty file (or no file at all) yields a working local setup.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SettingsError;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_RPC_PATH: &str = "/RPC2";
const DEFAULT_SHUTDOWN_DELAY_MS: u64 = 1000;

const DEFAULT_OUTPUT_ROOT: &str = "m5out";
const DEFAULT_KILL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STATE_SETTLE_MS: u64 = 500;

/// One simulated second at the default 1 ps tick resolution.
const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000_000_000;

const DEFAULT_SIGNAL_POLL_MS: u64 = 1000;
const DEFAULT_SIGNAL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub signal: SignalSettings,
}

impl Settings {
    /// Loads settings from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    ///
    /// The parsed settings, or a `SettingsError` if the file cannot be read
    /// or does not match the schema.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    #[serde(default = "default_shutdown_delay")]
    pub shutdown_delay_ms: u64,
}

impl ServerSettings {
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rpc_path: default_rpc_path(),
            shutdown_delay_ms: default_shutdown_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationSettings {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Executable used for worker processes. Defaults to the running binary.
    #[serde(default)]
    pub worker_exe: Option<PathBuf>,

    #[serde(default = "default_kill_timeout")]
    pub kill_timeout_secs: u64,

    /// How long pause/resume wait for the process table to reflect a signal.
    #[serde(default = "default_state_settle")]
    pub state_settle_ms: u64,
}

impl SimulationSettings {
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }

    pub fn state_settle(&self) -> Duration {
        Duration::from_millis(self.state_settle_ms)
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            worker_exe: None,
            kill_timeout_secs: default_kill_timeout(),
            state_settle_ms: default_state_settle(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    /// Simulated ticks replayed per wall-clock second; 0 replays instantly.
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalSettings {
    #[serde(default = "default_signal_poll")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_signal_timeout")]
    pub timeout_secs: u64,
}

impl SignalSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_signal_poll(),
            timeout_secs: default_signal_timeout(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_rpc_path() -> String {
    DEFAULT_RPC_PATH.to_string()
}

fn default_shutdown_delay() -> u64 {
    DEFAULT_SHUTDOWN_DELAY_MS
}

fn default_output_root() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_ROOT)
}

fn default_kill_timeout() -> u64 {
    DEFAULT_KILL_TIMEOUT_SECS
}

fn default_state_settle() -> u64 {
    DEFAULT_STATE_SETTLE_MS
}

fn default_ticks_per_second() -> u64 {
    DEFAULT_TICKS_PER_SECOND
}

fn default_signal_poll() -> u64 {
    DEFAULT_SIGNAL_POLL_MS
}

fn default_signal_timeout() -> u64 {
    DEFAULT_SIGNAL_TIMEOUT_SECS
}
