//! Trace-replay engine.
//!
//! Stands in for the external simulator inside worker processes. The workload
//! resource selects an exit trace; each segment's instruction count is turned
//! into simulated ticks from the board clock, the core count and the CPU
//! model, and replayed at a configurable rate of simulated ticks per wall
//! second. Signal channel messages received between slices become hypercall
//! exits.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::stats::{SimStats, StatsContext};
use super::workload::{self, Segment, TraceExit};
use super::{Engine, LIMIT_REACHED_CAUSE};
use crate::config::catalog::CpuType;
use crate::config::CompiledSpec;
use crate::exit::ExitStop;
use crate::signal::SignalReceiver;

/// Wall-clock length of one replay slice.
const SLICE: Duration = Duration::from_millis(10);

pub struct TraceEngine {
    spec: CompiledSpec,
    outdir: PathBuf,
    segments: &'static [Segment],
    next: usize,
    remaining_ticks: Option<u64>,
    tick: u64,
    period_ticks: u64,
    cpu: CpuType,
    ticks_per_second: u64,
    stats: SimStats,
    receiver: Option<SignalReceiver>,
}

impl TraceEngine {
    /// Creates an engine for a compiled configuration.
    ///
    /// # Arguments
    ///
    /// * `spec` - The compiled configuration to simulate
    /// * `outdir` - Directory receiving `stats.txt` and checkpoints
    /// * `ticks_per_second` - Simulated ticks replayed per wall second; 0
    ///   replays without pausing
    pub fn new(spec: CompiledSpec, outdir: impl Into<PathBuf>, ticks_per_second: u64) -> Self {
        let cpu = spec.processor.cpu_type().unwrap_or(CpuType::Atomic);
        let segments = workload::trace_for(&spec.workload.resource);
        let period_ticks = spec.board.period_ticks();
        Self {
            spec,
            outdir: outdir.into(),
            segments,
            next: 0,
            remaining_ticks: None,
            tick: 0,
            period_ticks,
            cpu,
            ticks_per_second,
            stats: SimStats::default(),
            receiver: None,
        }
    }

    /// Turns messages received by `receiver` into hypercall exits.
    pub fn with_receiver(mut self, receiver: SignalReceiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn cpu(&self) -> CpuType {
        self.cpu
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    fn ticks_for(&self, instructions: u64) -> u64 {
        let cores = u64::from(self.spec.processor.num_cores.max(1));
        let cycles = instructions.saturating_mul(workload::cpi_milli(self.cpu)) / 1000 / cores;
        cycles.max(1).saturating_mul(self.period_ticks)
    }

    fn slice_ticks(&self) -> u64 {
        if self.ticks_per_second == 0 {
            return u64::MAX;
        }
        let per_slice = u128::from(self.ticks_per_second) * SLICE.as_millis() / 1000;
        u64::try_from(per_slice).unwrap_or(u64::MAX).max(1)
    }

    fn pace(&self, ticks: u64) {
        if self.ticks_per_second == 0 {
            return;
        }
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(self.ticks_per_second);
        thread::sleep(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)));
    }

    fn retire(&mut self, ticks: u64) {
        let cores = u64::from(self.spec.processor.num_cores.max(1));
        let cycles = ticks / self.period_ticks;
        self.tick += ticks;
        self.stats.ticks += ticks;
        self.stats.cycles += cycles;
        self.stats.instructions += cycles * cores * 1000 / workload::cpi_milli(self.cpu);
    }

    fn take_signal(&mut self) -> Option<ExitStop> {
        let receiver = self.receiver.as_ref()?;
        let message = match receiver.poll() {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "discarding unreadable signal message");
                return None;
            }
        };
        let Ok(code) = u32::try_from(message.id) else {
            warn!(id = message.id, "discarding signal message with a negative id");
            return None;
        };
        self.stats.signals += 1;
        info!(code, tick = self.tick, "signal message raised as hypercall exit");
        Some(ExitStop::hypercall(code, message.payload, self.tick))
    }
}

impl Engine for TraceEngine {
    fn run(&mut self) -> io::Result<ExitStop> {
        let segments = self.segments;
        let Some(segment) = segments.get(self.next) else {
            if let Some(stop) = self.take_signal() {
                return Ok(stop);
            }
            return Ok(ExitStop::classic(LIMIT_REACHED_CAUSE, self.tick));
        };

        let segment_ticks = self.ticks_for(segment.instructions);
        let mut remaining = *self.remaining_ticks.get_or_insert(segment_ticks);
        while remaining > 0 {
            if let Some(stop) = self.take_signal() {
                self.remaining_ticks = Some(remaining);
                return Ok(stop);
            }
            let slice = self.slice_ticks().min(remaining);
            self.pace(slice);
            self.retire(slice);
            remaining -= slice;
        }

        self.remaining_ticks = None;
        self.next += 1;
        self.stats.exits += 1;
        let stop = match segment.exit {
            TraceExit::Classic(cause) => ExitStop::classic(cause, self.tick),
            TraceExit::Hypercall(code) => ExitStop::hypercall(code, BTreeMap::new(), self.tick),
        };
        debug!(code = stop.code, cause = %stop.cause, tick = self.tick, "workload exit");
        Ok(stop)
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn checkpoint(&mut self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let mut cpt = fs::File::create(dir.join("m5.cpt"))?;
        writeln!(cpt, "[Globals]")?;
        writeln!(cpt, "curTick={}", self.tick)?;
        writeln!(cpt)?;
        writeln!(cpt, "[workload]")?;
        writeln!(cpt, "resource={}", self.spec.workload.resource)?;
        writeln!(cpt, "segment={}", self.next)?;
        writeln!(cpt, "remaining_ticks={}", self.remaining_ticks.unwrap_or(0))?;
        writeln!(cpt, "cpu={}", self.cpu.name())?;

        let config = serde_json::to_string_pretty(&self.spec)?;
        fs::write(dir.join("config.json"), config)?;

        self.stats.checkpoints += 1;
        info!(dir = %dir.display(), tick = self.tick, "checkpoint written");
        Ok(())
    }

    fn reset_stats(&mut self) -> io::Result<()> {
        self.stats.reset();
        Ok(())
    }

    fn dump_stats(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.outdir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.outdir.join("stats.txt"))?;
        let ctx = StatsContext {
            final_tick: self.tick,
            clock_ghz: self.spec.board.clock_ghz,
            num_cores: self.spec.processor.num_cores,
            cpu: self.cpu.name(),
        };
        self.stats.write_report(&mut file, &ctx)
    }

    fn switch_processor(&mut self) -> io::Result<()> {
        let next = workload::switch_partner(self.cpu);
        info!(from = self.cpu.name(), to = next.name(), tick = self.tick, "switching processor");
        self.cpu = next;
        self.stats.cpu_switches += 1;
        Ok(())
    }
}
