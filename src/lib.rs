//! gEMA: a control plane for a discrete-event full-system simulator.
//!
//! Clients build simulated-system configurations over XML-RPC, launch each one
//! as an isolated simulator process, and then control those processes: pause,
//! resume, kill, status, and mid-run messages delivered through shared memory
//! plus `SIGHUP`. Inside a simulator process, the exit-event dispatcher decides
//! what happens every time the engine stops.
//!
//! # Architecture
//!
//! * **Gateway**: XML-RPC over HTTP; every result is JSON text.
//! * **Registry and manager**: configurations and simulation records owned by
//!   the gateway process.
//! * **Workers**: one simulator process per run, each with its own dispatcher
//!   and signal receiver.
//!
//! # Modules
//!
//! * `config`: Configuration records, the registry, and compilation.
//! * `engine`: The engine interface and the built-in trace-replay engine.
//! * `error`: Error types for every component.
//! * `exit`: Exit events, handlers, scripts, and the dispatcher.
//! * `rpc`: XML-RPC codec, method table, and HTTP transport.
//! * `settings`: TOML settings file.
//! * `signal`: Shared-memory message channel.
//! * `sim`: Simulation records, process control, and the worker entry point.

/// Configuration records, registry, capability catalog, and compilation.
///
/// Holds the user-editable configurations and turns a complete one into the
/// specification a simulator process runs.
pub mod config;

/// Simulation engine interface and the trace-replay engine.
pub mod engine;

/// Error types shared across the crate.
pub mod error;

/// Exit-event dispatching inside a simulator process.
///
/// Classifies every engine stop, checks it against an optional expected order,
/// and routes it to a handler that decides whether the run continues.
pub mod exit;

/// XML-RPC gateway.
pub mod rpc;

/// Settings loaded from an optional TOML file.
pub mod settings;

/// Shared-memory plus `SIGHUP` message channel to simulator processes.
pub mod signal;

/// Simulation lifecycle: records, process control, and workers.
///
/// Launches simulator processes, tracks them by simulation id and pid, and
/// applies pause/resume/kill/status commands.
pub mod sim;
