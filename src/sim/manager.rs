//! Process lifecycle manager.
//!
//! Launches one simulator process per simulation, keeps the append-only log of
//! simulation records, and controls running processes through job-control
//! signals and process-table introspection. Every control operation answers
//! with a human-readable message instead of an error.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::process::{self, ProcState};
use super::record::{SimState, Simulation, SimulationLog};
use super::worker::WorkerJob;
use crate::config::ConfigRegistry;
use crate::error::SimError;
use crate::settings::{EngineSettings, SimulationSettings};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Starts the OS process of a simulation.
pub trait Launcher: Send {
    /// Spawns the process for `job`, with its output files in `job.outdir`.
    fn launch(&self, job: &WorkerJob) -> io::Result<Child>;
}

/// Runs the hidden `worker` subcommand of an executable, by default the
/// currently running one.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    exe: PathBuf,
}

impl WorkerLauncher {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// The launcher for the current executable.
    pub fn current() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl Launcher for WorkerLauncher {
    fn launch(&self, job: &WorkerJob) -> io::Result<Child> {
        let encoded = job
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut command = Command::new(&self.exe);
        command.arg("worker").arg("--job").arg(encoded);
        spawn_detached(command, &job.outdir)
    }
}

/// Runs an arbitrary command for every simulation, ignoring the job contents.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, job: &WorkerJob) -> io::Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        spawn_detached(command, &job.outdir)
    }
}

/// Spawns `command` in its own process group with stdout and stderr going to
/// `simout` and `simerr` in `outdir`.
fn spawn_detached(mut command: Command, outdir: &Path) -> io::Result<Child> {
    let simout = File::create(outdir.join("simout"))?;
    let simerr = File::create(outdir.join("simerr"))?;
    command
        .stdin(Stdio::null())
        .stdout(simout)
        .stderr(simerr)
        .process_group(0)
        .spawn()
}

/// A control command accepted by `manage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimCommand {
    Status,
    Pause,
    Resume,
    Kill,
}

impl FromStr for SimCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(SimCommand::Status),
            "pause" => Ok(SimCommand::Pause),
            "resume" => Ok(SimCommand::Resume),
            "kill" => Ok(SimCommand::Kill),
            _ => Err(()),
        }
    }
}

/// Failures of a control operation, rendered by `manage`.
enum ControlError {
    NoSuchProcess,
    TimedOut,
    Io(io::Error),
}

impl From<io::Error> for ControlError {
    fn from(err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ESRCH) {
            ControlError::NoSuchProcess
        } else {
            ControlError::Io(err)
        }
    }
}

pub struct SimulationManager {
    log: SimulationLog,
    children: HashMap<i32, Child>,
    launcher: Box<dyn Launcher>,
    settings: SimulationSettings,
    ticks_per_second: u64,
}

impl SimulationManager {
    /// Creates a manager that launches workers through `launcher`.
    pub fn new(
        settings: SimulationSettings,
        engine: &EngineSettings,
        launcher: Box<dyn Launcher>,
    ) -> Self {
        Self {
            log: SimulationLog::new(),
            children: HashMap::new(),
            launcher,
            settings,
            ticks_per_second: engine.ticks_per_second,
        }
    }

    /// Creates a manager using the configured worker executable, or the
    /// current executable if none is configured.
    pub fn from_settings(settings: SimulationSettings, engine: &EngineSettings) -> io::Result<Self> {
        let launcher = match &settings.worker_exe {
            Some(exe) => WorkerLauncher::new(exe),
            None => WorkerLauncher::current()?,
        };
        Ok(Self::new(settings, engine, Box::new(launcher)))
    }

    /// Launches a simulation of a registered configuration.
    ///
    /// # Arguments
    ///
    /// * `registry` - Registry holding the configuration
    /// * `config_id` - Configuration to simulate; it is copied into the record
    ///
    /// # Returns
    ///
    /// The new simulation id. The record is kept even if the process fails to
    /// start; its pid then stays unset.
    pub fn launch(&mut self, registry: &ConfigRegistry, config_id: i64) -> Result<u32, SimError> {
        self.reap_finished();
        let config = registry
            .get(config_id)
            .cloned()
            .ok_or(SimError::UnknownConfig(config_id))?;

        let ticks_per_second = self.ticks_per_second;
        let record = self.log.create(config, &self.settings.output_root);
        let sim_id = record.sim_id;
        let job = WorkerJob {
            sim_id,
            outdir: record.outdir.clone(),
            ticks_per_second,
            config: record.config.clone(),
        };

        let spawned = fs::create_dir_all(&job.outdir).and_then(|_| self.launcher.launch(&job));
        let child = spawned.map_err(|source| SimError::Spawn { sim_id, source })?;
        let pid = child.id() as i32;

        if let Some(record) = self.log.by_id_mut(sim_id) {
            record.pid = Some(pid);
            record.state = SimState::Running;
        }
        self.children.insert(pid, child);
        info!(sim_id, config_id, pid, outdir = %job.outdir.display(), "simulation launched");
        Ok(sim_id)
    }

    /// Lists every simulation record, first collecting any finished processes.
    pub fn simulations(&mut self) -> &[Simulation] {
        self.reap_finished();
        self.log.list()
    }

    pub fn simulation(&self, sim_id: u32) -> Option<&Simulation> {
        self.log.by_id(sim_id)
    }

    /// Number of launched processes whose exit status has not been collected.
    pub fn running(&self) -> usize {
        self.children.len()
    }

    /// Blocks until the process of a simulation exits.
    ///
    /// # Returns
    ///
    /// `false` if the process is still alive after `timeout`. Fails with
    /// `NotFound` if the simulation has no process.
    pub fn wait(&mut self, sim_id: u32, timeout: Duration) -> io::Result<bool> {
        let pid = self
            .log
            .by_id(sim_id)
            .and_then(|sim| sim.pid)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "simulation has no process"))?;
        let exited = self.await_exit(pid, timeout)?;
        if exited {
            self.set_state(pid, SimState::Terminated);
        }
        Ok(exited)
    }

    /// Resolves an identifier that is either a pid or a simulation id.
    ///
    /// Pids take precedence. A simulation id only resolves once its process
    /// has started.
    pub fn resolve(&self, identifier: i64) -> Option<i32> {
        if let Ok(pid) = i32::try_from(identifier) {
            if self.log.by_pid(pid).is_some() {
                return Some(pid);
            }
        }
        let sim_id = u32::try_from(identifier).ok()?;
        self.log.by_id(sim_id).and_then(|sim| sim.pid)
    }

    /// Executes a control command and describes the outcome.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Simulation id or pid
    /// * `command` - One of `status`, `pause`, `resume`, `kill`
    pub fn manage(&mut self, identifier: i64, command: &str) -> String {
        let Some(pid) = self.resolve(identifier) else {
            return "Invalid sim_id or pid".to_string();
        };

        match self.control(pid, command) {
            Ok(message) => message,
            Err(ControlError::NoSuchProcess) => {
                "No such process; it may have already terminated.".to_string()
            }
            Err(ControlError::TimedOut) => {
                format!("Operation on simulation with PID {} timed out.", pid)
            }
            Err(ControlError::Io(err)) => format!("An error occurred: {}", err),
        }
    }

    fn control(&mut self, pid: i32, command: &str) -> Result<String, ControlError> {
        self.reap(pid)?;

        if self.state_of(pid) == Some(SimState::Terminated) {
            let message = match SimCommand::from_str(command) {
                Ok(SimCommand::Status) => format!("Simulation with PID {} has terminated.", pid),
                Ok(SimCommand::Pause) | Ok(SimCommand::Kill) => {
                    format!("Simulation with PID {} is not running.", pid)
                }
                Ok(SimCommand::Resume) => format!("Simulation with PID {} is not paused.", pid),
                Err(()) => invalid_command(),
            };
            return Ok(message);
        }

        let Some(info) = process::probe(pid)? else {
            self.set_state(pid, SimState::Terminated);
            return Err(ControlError::NoSuchProcess);
        };

        let Ok(command) = SimCommand::from_str(command) else {
            return Ok(invalid_command());
        };

        match command {
            SimCommand::Status => {
                let state = match info.state {
                    ProcState::Stopped => "paused",
                    ProcState::Zombie | ProcState::Dead => "terminated (zombie state)",
                    ProcState::Running => "running",
                };
                let runtime = process::format_runtime(process::runtime(&info)?);
                Ok(format!(
                    "Simulation with PID {} is {}. Runtime: {}.",
                    pid, state, runtime
                ))
            }
            SimCommand::Pause => {
                if !info.state.is_alive() {
                    return Ok(format!("Simulation with PID {} is not running.", pid));
                }
                process::send_signal(pid, libc::SIGSTOP)?;
                self.await_state(pid, |s| s == ProcState::Stopped);
                self.set_state(pid, SimState::Paused);
                info!(pid, "simulation paused");
                Ok(format!("Simulation with PID {} paused.", pid))
            }
            SimCommand::Resume => {
                if info.state != ProcState::Stopped {
                    return Ok(format!("Simulation with PID {} is not paused.", pid));
                }
                process::send_signal(pid, libc::SIGCONT)?;
                self.await_state(pid, |s| s != ProcState::Stopped);
                self.set_state(pid, SimState::Running);
                info!(pid, "simulation resumed");
                Ok(format!("Simulation with PID {} resumed.", pid))
            }
            SimCommand::Kill => {
                if !info.state.is_alive() {
                    return Ok(format!("Simulation with PID {} is not running.", pid));
                }
                process::send_signal(pid, libc::SIGTERM)?;
                if info.state == ProcState::Stopped {
                    process::send_signal(pid, libc::SIGCONT)?;
                }
                if !self.await_exit(pid, self.settings.kill_timeout())? {
                    warn!(pid, "simulation did not exit after SIGTERM");
                    return Err(ControlError::TimedOut);
                }
                self.set_state(pid, SimState::Terminated);
                info!(pid, "simulation terminated");
                Ok(format!("Simulation with PID {} terminated.", pid))
            }
        }
    }

    /// Collects the exit status of a finished child, marking it terminated.
    fn reap(&mut self, pid: i32) -> io::Result<bool> {
        let Some(child) = self.children.get_mut(&pid) else {
            return Ok(false);
        };
        match child.try_wait()? {
            Some(status) => {
                debug!(pid, %status, "simulation process reaped");
                self.children.remove(&pid);
                self.set_state(pid, SimState::Terminated);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reaps every child that has already exited.
    fn reap_finished(&mut self) {
        let pids: Vec<i32> = self.children.keys().copied().collect();
        for pid in pids {
            if let Err(err) = self.reap(pid) {
                warn!(pid, error = %err, "failed to collect simulation process status");
            }
        }
    }

    /// Waits until the process is gone. Returns `false` on timeout.
    fn await_exit(&mut self, pid: i32, timeout: Duration) -> io::Result<bool> {
        let started = Instant::now();
        loop {
            if self.children.contains_key(&pid) {
                if self.reap(pid)? {
                    return Ok(true);
                }
            } else {
                match process::probe(pid)? {
                    None => return Ok(true),
                    Some(info) if !info.state.is_alive() => return Ok(true),
                    Some(_) => {}
                }
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Polls the process table until `reached` holds or the settle time passes.
    fn await_state(&self, pid: i32, reached: impl Fn(ProcState) -> bool) {
        let deadline = Instant::now() + self.settings.state_settle();
        while Instant::now() < deadline {
            match process::probe(pid) {
                Ok(Some(info)) if reached(info.state) => return,
                Ok(Some(_)) => thread::sleep(Duration::from_millis(5)),
                _ => return,
            }
        }
    }

    fn state_of(&self, pid: i32) -> Option<SimState> {
        self.log.by_pid(pid).map(|sim| sim.state)
    }

    fn set_state(&mut self, pid: i32, state: SimState) {
        if let Some(sim) = self.log.by_pid_mut(pid) {
            sim.state = state;
        }
    }
}

fn invalid_command() -> String {
    "Invalid command. Use 'status', 'pause', 'resume', or 'kill'.".to_string()
}
