//! Simulation records.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::Configuration;

/// Lifecycle of a launched simulation as observed by the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimState {
    Unstarted,
    Running,
    Paused,
    Terminated,
}

/// One launched simulation.
#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    pub sim_id: u32,
    /// The configuration as it was when the simulation was launched.
    pub config: Configuration,
    pub generated_on: String,
    #[serde(rename = "path")]
    pub outdir: PathBuf,
    pub pid: Option<i32>,
    #[serde(skip)]
    pub state: SimState,
}

/// Append-only log of simulations with an atomic id counter.
#[derive(Debug)]
pub struct SimulationLog {
    next_id: AtomicU32,
    records: Vec<Simulation>,
}

impl SimulationLog {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            records: Vec::new(),
        }
    }

    /// Creates and appends a record for a new simulation of `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Snapshot of the configuration to simulate
    /// * `output_root` - Directory under which the simulation's own output
    ///   directory is derived
    ///
    /// # Returns
    ///
    /// The newly appended record.
    pub fn create(&mut self, config: Configuration, output_root: &Path) -> &mut Simulation {
        let sim_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let outdir = output_dir(output_root, sim_id, config.config_id);
        self.records.push(Simulation {
            sim_id,
            config,
            generated_on: timestamp(),
            outdir,
            pid: None,
            state: SimState::Unstarted,
        });
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    pub fn list(&self) -> &[Simulation] {
        &self.records
    }

    pub fn by_pid(&self, pid: i32) -> Option<&Simulation> {
        self.records.iter().find(|sim| sim.pid == Some(pid))
    }

    pub fn by_pid_mut(&mut self, pid: i32) -> Option<&mut Simulation> {
        self.records.iter_mut().find(|sim| sim.pid == Some(pid))
    }

    pub fn by_id(&self, sim_id: u32) -> Option<&Simulation> {
        self.records.iter().find(|sim| sim.sim_id == sim_id)
    }

    pub fn by_id_mut(&mut self, sim_id: u32) -> Option<&mut Simulation> {
        self.records.iter_mut().find(|sim| sim.sim_id == sim_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for SimulationLog {
    fn default() -> Self {
        Self::new()
    }
}

/// `<output_root>/sim_<sim>_config_<cfg>`
pub fn output_dir(output_root: &Path, sim_id: u32, config_id: i64) -> PathBuf {
    output_root.join(format!("sim_{}_config_{}", sim_id, config_id))
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_paths_follow_ids() {
        let mut log = SimulationLog::new();
        let root = Path::new("m5out");
        let first = log.create(Configuration::new(7), root).sim_id;
        let second = log.create(Configuration::new(7), root).sim_id;
        assert_eq!((first, second), (1, 2));
        assert_eq!(
            log.by_id(2).map(|s| s.outdir.clone()),
            Some(PathBuf::from("m5out/sim_2_config_7"))
        );
        assert_eq!(log.by_id(1).map(|s| s.state), Some(SimState::Unstarted));
    }

    #[test]
    fn timestamp_has_fixed_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }
}
