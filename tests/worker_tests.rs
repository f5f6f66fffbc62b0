//! Integration tests for simulations launched through the worker subcommand.

use std::fs;
use std::time::Duration;

use gema::config::{Cache, ConfigRegistry};
use gema::settings::{EngineSettings, SimulationSettings};
use gema::sim::{SimState, SimulationManager, WorkerLauncher};

fn worker_manager(root: &tempfile::TempDir) -> SimulationManager {
    let settings = SimulationSettings {
        output_root: root.path().to_path_buf(),
        worker_exe: None,
        kill_timeout_secs: 5,
        state_settle_ms: 1000,
    };
    let engine = EngineSettings {
        ticks_per_second: 0,
    };
    let launcher = WorkerLauncher::new(env!("CARGO_BIN_EXE_gema"));
    SimulationManager::new(settings, &engine, Box::new(launcher))
}

fn hello_registry(id: i64) -> ConfigRegistry {
    let mut registry = ConfigRegistry::new();
    registry.add(id, None);
    registry.set_board(id, "SimpleBoard", 3.0);
    registry.set_processor(id, "x86", "SimpleProcessor", "timing", 2);
    registry.set_memory(id, "SingleChannelDDR3_1600", 512);
    registry.set_cache(id, Cache::new("PrivateL1CacheHierarchy", 32, 32));
    registry.set_resource(id, "x86-hello64-static");
    registry
}

/// Tests that a launched worker runs to completion and writes its outputs.
#[test]
fn test_worker_runs_to_completion() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = worker_manager(&root);
    let registry = hello_registry(5);

    let sim_id = manager.launch(&registry, 5).unwrap();
    assert!(manager.wait(sim_id, Duration::from_secs(30)).unwrap());

    let sim = manager.simulation(sim_id).unwrap();
    assert_eq!(sim.state, SimState::Terminated);
    let simout = fs::read_to_string(sim.outdir.join("simout")).unwrap();
    assert!(
        simout.contains(&format!("Simulation for sim_id {} completed at tick", sim_id)),
        "simout: {simout}"
    );
    assert!(sim.outdir.join("stats.txt").is_file());
}

/// Tests that a worker given an incomplete configuration reports the failure.
#[test]
fn test_worker_rejects_incomplete_config() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = worker_manager(&root);
    let mut registry = ConfigRegistry::new();
    registry.add(1, None);

    let sim_id = manager.launch(&registry, 1).unwrap();
    assert!(manager.wait(sim_id, Duration::from_secs(30)).unwrap());

    let sim = manager.simulation(sim_id).unwrap();
    let simout = fs::read_to_string(sim.outdir.join("simout")).unwrap();
    assert!(!simout.contains("completed at tick"));
    assert!(!sim.outdir.join("stats.txt").exists());
}
