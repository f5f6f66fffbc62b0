//! Simulation statistics collection and reporting.
//!
//! Tracks simulated ticks, cycles, retired instructions and control-plane
//! events between resets, and renders them in the `stats.txt` block format.

use std::io::{self, Write};
use std::time::Instant;

use super::TICKS_PER_SIMULATED_SECOND;

/// Statistics accumulated since the last reset.
pub struct SimStats {
    start_time: Instant,
    pub ticks: u64,
    pub cycles: u64,
    pub instructions: u64,

    pub exits: u64,
    pub signals: u64,
    pub checkpoints: u64,
    pub cpu_switches: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: 0,
            cycles: 0,
            instructions: 0,
            exits: 0,
            signals: 0,
            checkpoints: 0,
            cpu_switches: 0,
        }
    }
}

/// Fixed facts about the simulated system printed alongside the counters.
pub struct StatsContext<'a> {
    pub final_tick: u64,
    pub clock_ghz: f64,
    pub num_cores: u32,
    pub cpu: &'a str,
}

impl SimStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Writes one statistics block.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination, usually `stats.txt` opened for append
    /// * `ctx` - System facts that are not reset with the counters
    pub fn write_report(&self, out: &mut impl Write, ctx: &StatsContext<'_>) -> io::Result<()> {
        let host_seconds = self.start_time.elapsed().as_secs_f64();
        let sim_seconds = self.ticks as f64 / TICKS_PER_SIMULATED_SECOND as f64;

        let cyc = self.cycles.max(1);
        let instr = self.instructions.max(1);
        let ipc = self.instructions as f64 / cyc as f64;
        let cpi = cyc as f64 / instr as f64;
        let host_inst_rate = if host_seconds > 0.0 {
            self.instructions as f64 / host_seconds
        } else {
            0.0
        };

        writeln!(out)?;
        writeln!(out, "---------- Begin Simulation Statistics ----------")?;
        line(out, "simSeconds", format!("{:.6}", sim_seconds), "Number of seconds simulated (Second)")?;
        line(out, "simTicks", self.ticks, "Number of ticks simulated (Tick)")?;
        line(out, "finalTick", ctx.final_tick, "Number of ticks from beginning of simulation (Tick)")?;
        line(out, "simFreq", TICKS_PER_SIMULATED_SECOND, "The number of ticks per simulated second ((Tick/Second))")?;
        line(out, "hostSeconds", format!("{:.2}", host_seconds), "Real time elapsed on the host (Second)")?;
        line(out, "hostInstRate", format!("{:.0}", host_inst_rate), "Simulator instruction rate (inst/s) ((Count/Second))")?;
        line(out, "simInsts", self.instructions, "Number of instructions simulated (Count)")?;
        line(out, "system.clk_domain.clock", format!("{:?}GHz", ctx.clock_ghz), "Clock frequency of the board")?;
        line(out, "system.processor.numCores", ctx.num_cores, "Number of cores")?;
        line(out, "system.processor.cpuType", ctx.cpu, "Active CPU model")?;
        line(out, "system.processor.numCycles", self.cycles, "Number of cpu cycles simulated (Cycle)")?;
        line(out, "system.processor.ipc", format!("{:.6}", ipc), "IPC: instructions per cycle ((Count/Cycle))")?;
        line(out, "system.processor.cpi", format!("{:.6}", cpi), "CPI: cycles per instruction ((Cycle/Count))")?;
        line(out, "gema.exits", self.exits, "Exit events raised by the workload (Count)")?;
        line(out, "gema.signals", self.signals, "Signal channel messages received (Count)")?;
        line(out, "gema.checkpoints", self.checkpoints, "Checkpoints written (Count)")?;
        line(out, "gema.cpuSwitches", self.cpu_switches, "Processor switches (Count)")?;
        writeln!(out)?;
        writeln!(out, "---------- End Simulation Statistics   ----------")?;
        Ok(())
    }
}

fn line(out: &mut impl Write, name: &str, value: impl ToString, desc: &str) -> io::Result<()> {
    writeln!(out, "{:<45} {:>20}  # {}", name, value.to_string(), desc)
}
