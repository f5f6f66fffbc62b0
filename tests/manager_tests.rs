//! Integration tests for the process lifecycle manager.

use gema::config::ConfigRegistry;
use gema::error::SimError;
use gema::settings::{EngineSettings, SimulationSettings};
use gema::sim::{CommandLauncher, SimState, SimulationManager};
use tempfile::TempDir;

/// Creates a manager whose simulations are long-running `sleep` processes.
fn sleeping_manager(root: &TempDir) -> SimulationManager {
    manager_with(root, "sleep", &["30"])
}

fn manager_with(root: &TempDir, program: &str, args: &[&str]) -> SimulationManager {
    let settings = SimulationSettings {
        output_root: root.path().to_path_buf(),
        worker_exe: None,
        kill_timeout_secs: 5,
        state_settle_ms: 1000,
    };
    let launcher = CommandLauncher::new(program, args.iter().copied());
    SimulationManager::new(settings, &EngineSettings::default(), Box::new(launcher))
}

fn registry_with(ids: &[i64]) -> ConfigRegistry {
    let mut registry = ConfigRegistry::new();
    for id in ids {
        registry.add(*id, None);
    }
    registry
}

/// Tests that launching records the simulation and starts its process.
#[test]
fn test_launch_records_simulation() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = sleeping_manager(&root);
    let registry = registry_with(&[4]);

    let sim_id = manager.launch(&registry, 4).unwrap();
    assert_eq!(sim_id, 1);

    let sim = manager.simulation(sim_id).unwrap();
    let pid = sim.pid.unwrap();
    assert_eq!(sim.config.config_id, 4);
    assert_eq!(sim.outdir, root.path().join("sim_1_config_4"));
    assert!(sim.outdir.join("simout").exists());
    assert!(sim.outdir.join("simerr").exists());
    assert_eq!(manager.resolve(1), Some(pid));
    assert_eq!(manager.resolve(i64::from(pid)), Some(pid));

    let json = serde_json::to_value(manager.simulations()).unwrap();
    assert_eq!(json[0]["sim_id"], 1);
    assert_eq!(json[0]["pid"], pid);
    assert!(json[0]["path"].is_string());
    assert!(json[0]["generated_on"].is_string());

    manager.manage(1, "kill");
}

/// Tests that launching an unknown configuration fails without a record.
#[test]
fn test_launch_unknown_config() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = sleeping_manager(&root);
    let registry = registry_with(&[]);

    assert!(matches!(
        manager.launch(&registry, 3),
        Err(SimError::UnknownConfig(3))
    ));
    assert!(manager.simulations().is_empty());
}

/// Tests that a failed spawn keeps the record without a pid.
#[test]
fn test_spawn_failure_keeps_record() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_with(&root, "/nonexistent/gema-worker", &[]);
    let registry = registry_with(&[1]);

    assert!(matches!(
        manager.launch(&registry, 1),
        Err(SimError::Spawn { sim_id: 1, .. })
    ));
    assert_eq!(manager.simulations().len(), 1);
    assert!(manager.simulation(1).unwrap().pid.is_none());
    assert_eq!(manager.manage(1, "status"), "Invalid sim_id or pid");
}

/// Tests the pause, resume, and kill cycle.
#[test]
fn test_pause_resume_kill_cycle() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = sleeping_manager(&root);
    let registry = registry_with(&[1]);
    let sim_id = manager.launch(&registry, 1).unwrap();
    let pid = manager.simulation(sim_id).unwrap().pid.unwrap();
    let id = i64::from(sim_id);

    let status = manager.manage(id, "status");
    assert!(
        status.starts_with(&format!("Simulation with PID {} is running. Runtime: ", pid)),
        "{status}"
    );

    assert_eq!(
        manager.manage(id, "pause"),
        format!("Simulation with PID {} paused.", pid)
    );
    assert!(manager
        .manage(id, "status")
        .starts_with(&format!("Simulation with PID {} is paused.", pid)));

    assert_eq!(
        manager.manage(id, "resume"),
        format!("Simulation with PID {} resumed.", pid)
    );
    assert_eq!(
        manager.manage(id, "resume"),
        format!("Simulation with PID {} is not paused.", pid)
    );

    assert_eq!(
        manager.manage(id, "kill"),
        format!("Simulation with PID {} terminated.", pid)
    );
    assert_eq!(
        manager.manage(id, "status"),
        format!("Simulation with PID {} has terminated.", pid)
    );
    assert_eq!(
        manager.manage(id, "kill"),
        format!("Simulation with PID {} is not running.", pid)
    );
}

/// Tests that a paused simulation can be killed.
#[test]
fn test_kill_paused_simulation() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = sleeping_manager(&root);
    let registry = registry_with(&[1]);
    let sim_id = manager.launch(&registry, 1).unwrap();
    let pid = manager.simulation(sim_id).unwrap().pid.unwrap();

    manager.manage(i64::from(sim_id), "pause");
    assert_eq!(
        manager.manage(i64::from(pid), "kill"),
        format!("Simulation with PID {} terminated.", pid)
    );
}

/// Tests that a process that exits on its own is reported as terminated.
#[test]
fn test_finished_process_is_terminated() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_with(&root, "true", &[]);
    let registry = registry_with(&[1]);
    let sim_id = manager.launch(&registry, 1).unwrap();
    let pid = manager.simulation(sim_id).unwrap().pid.unwrap();

    std::thread::sleep(std::time::Duration::from_millis(300));
    assert_eq!(
        manager.manage(i64::from(sim_id), "status"),
        format!("Simulation with PID {} has terminated.", pid)
    );
    assert_eq!(
        manager.manage(i64::from(sim_id), "resume"),
        format!("Simulation with PID {} is not paused.", pid)
    );
}

/// Tests unknown identifiers and commands.
#[test]
fn test_invalid_identifier_and_command() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = sleeping_manager(&root);
    let registry = registry_with(&[1]);
    let sim_id = manager.launch(&registry, 1).unwrap();

    assert_eq!(manager.manage(99, "status"), "Invalid sim_id or pid");
    assert_eq!(manager.manage(-1, "status"), "Invalid sim_id or pid");
    assert_eq!(
        manager.manage(i64::from(sim_id), "explode"),
        "Invalid command. Use 'status', 'pause', 'resume', or 'kill'."
    );

    manager.manage(i64::from(sim_id), "kill");
}

/// Tests that simulation ids keep increasing across launches.
#[test]
fn test_sim_ids_increase() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_with(&root, "true", &[]);
    let registry = registry_with(&[1, 2]);

    assert_eq!(manager.launch(&registry, 1).unwrap(), 1);
    assert_eq!(manager.launch(&registry, 2).unwrap(), 2);
    assert_eq!(manager.launch(&registry, 1).unwrap(), 3);
    assert_eq!(manager.simulations().len(), 3);
}

/// Tests that finished processes are collected when listing and launching.
#[test]
fn test_finished_children_are_collected() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_with(&root, "true", &[]);
    let registry = registry_with(&[1]);

    manager.launch(&registry, 1).unwrap();
    manager.launch(&registry, 1).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));

    let sims = manager.simulations();
    assert_eq!(sims.len(), 2);
    assert!(sims.iter().all(|sim| sim.state == SimState::Terminated));
    assert_eq!(manager.running(), 0);

    manager.launch(&registry, 1).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));
    manager.launch(&registry, 1).unwrap();
    assert_eq!(manager.running(), 1);
    assert_eq!(manager.simulation(3).unwrap().state, SimState::Terminated);
}

/// Tests waiting for a simulation to finish.
#[test]
fn test_wait_for_simulation() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_with(&root, "sleep", &["0.2"]);
    let registry = registry_with(&[1]);
    let sim_id = manager.launch(&registry, 1).unwrap();

    assert!(manager
        .wait(sim_id, std::time::Duration::from_secs(10))
        .unwrap());
    assert_eq!(manager.simulation(sim_id).unwrap().state, SimState::Terminated);
    assert_eq!(manager.running(), 0);
    assert!(manager.wait(99, std::time::Duration::from_millis(10)).is_err());
}
