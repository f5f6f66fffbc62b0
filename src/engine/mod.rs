//! Simulation engine interface.
//!
//! The discrete-event simulator is an external collaborator. The control plane
//! only needs to run it until the next exit and to trigger a few side effects,
//! which is what the `Engine` trait captures. `TraceEngine` is the built-in
//! implementation used by worker processes.

use std::io;
use std::path::Path;

use crate::exit::ExitStop;

/// Simulated-time statistics counters and the `stats.txt` writer.
pub mod stats;

/// Trace-replay engine.
pub mod trace;

/// Exit traces of the catalog workloads.
pub mod workload;

pub use trace::TraceEngine;

/// Ticks per simulated second (1 tick = 1 ps).
pub const TICKS_PER_SIMULATED_SECOND: u64 = 1_000_000_000_000;

/// Cause reported once the workload has nothing left to run.
pub const LIMIT_REACHED_CAUSE: &str = "simulate() limit reached";

/// A simulator instance driven by the exit dispatcher.
pub trait Engine {
    /// Runs until the next exit and reports it.
    fn run(&mut self) -> io::Result<ExitStop>;

    /// Current simulated tick.
    fn current_tick(&self) -> u64;

    /// Writes a checkpoint into `dir`, creating it if needed.
    fn checkpoint(&mut self, dir: &Path) -> io::Result<()>;

    fn reset_stats(&mut self) -> io::Result<()>;

    fn dump_stats(&mut self) -> io::Result<()>;

    /// Switches to the alternate CPU model.
    fn switch_processor(&mut self) -> io::Result<()>;
}
