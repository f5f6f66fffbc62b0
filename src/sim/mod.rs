//! Simulation lifecycle.
//!
//! The manager records every launch and controls the resulting simulator
//! processes; the worker module is the entry point those processes run.

/// Launching, resolving and controlling simulator processes.
pub mod manager;

/// Process-table introspection and job-control signals.
pub mod process;

/// Simulation records and the append-only simulation log.
pub mod record;

/// Entry point of simulator processes.
pub mod worker;

pub use manager::{CommandLauncher, Launcher, SimCommand, SimulationManager, WorkerLauncher};
pub use record::{SimState, Simulation, SimulationLog};
pub use worker::{run_in_process, run_worker, WorkerJob};
