//! Worker entry point.
//!
//! A worker is one simulator process. It receives its configuration by value,
//! compiles it, and drives the engine under the exit dispatcher until a
//! handler ends the run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::{compile, Configuration};
use crate::engine::{Engine, TraceEngine};
use crate::error::WorkerError;
use crate::exit::{Dispatcher, RunSummary};
use crate::signal::SignalReceiver;

/// Everything a worker process needs, passed on its command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub sim_id: u32,
    pub outdir: PathBuf,
    pub ticks_per_second: u64,
    pub config: Configuration,
}

impl WorkerJob {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Runs a decoded job to completion and prints the completion line.
///
/// # Returns
///
/// The summary of the run, or the error that prevented it. Errors are also
/// logged so they end up in `simerr`.
pub fn run_worker(job: &WorkerJob) -> Result<RunSummary, WorkerError> {
    let result = run_job(job);
    match &result {
        Ok(summary) => println!(
            "Simulation for sim_id {} completed at tick {} with exit cause: {}",
            job.sim_id, summary.tick, summary.cause
        ),
        Err(err) => error!(sim_id = job.sim_id, error = %err, "simulation failed"),
    }
    result
}

/// Decodes a job from its JSON text and runs it.
pub fn run_encoded(text: &str) -> Result<RunSummary, WorkerError> {
    let job = WorkerJob::decode(text).map_err(|err| {
        error!(error = %err, "could not decode worker job");
        WorkerError::Decode(err)
    })?;
    run_worker(&job)
}

fn run_job(job: &WorkerJob) -> Result<RunSummary, WorkerError> {
    let spec = compile(&job.config)?;
    info!(
        sim_id = job.sim_id,
        config_id = spec.config_id,
        board = %spec.board.kind,
        cpu = %spec.processor.cpu,
        cores = spec.processor.num_cores,
        resource = %spec.workload.resource,
        "starting simulation"
    );

    let receiver = SignalReceiver::install()?;
    let engine = TraceEngine::new(spec, &job.outdir, job.ticks_per_second).with_receiver(receiver);
    run_engine(engine, &job.outdir)
}

/// Runs a configuration in the current process without a signal receiver.
pub fn run_in_process(
    config: &Configuration,
    outdir: &Path,
    ticks_per_second: u64,
) -> Result<RunSummary, WorkerError> {
    let spec = compile(config)?;
    run_engine(TraceEngine::new(spec, outdir, ticks_per_second), outdir)
}

fn run_engine(mut engine: TraceEngine, outdir: &Path) -> Result<RunSummary, WorkerError> {
    fs::create_dir_all(outdir)?;
    let mut dispatcher = Dispatcher::builder(outdir).build();
    let summary = dispatcher.run(&mut engine)?;
    engine.dump_stats()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_job_is_an_error() {
        assert!(matches!(
            run_encoded("{\"sim_id\": 1}"),
            Err(WorkerError::Decode(_))
        ));
    }

    #[test]
    fn incomplete_config_fails_before_running() {
        let dir = std::env::temp_dir().join("gema_worker_incomplete");
        let result = run_in_process(&Configuration::new(1), &dir, 0);
        assert!(matches!(result, Err(WorkerError::Config(_))));
        assert!(!dir.join("stats.txt").exists());
    }
}
