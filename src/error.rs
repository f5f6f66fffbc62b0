//! Error types shared across the control plane.
//!
//! Every component reports failures through its own enum so that callers at
//! the RPC boundary can turn them into descriptive strings instead of
//! propagating them as transport failures.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating or compiling a configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A top-level section (board, processor, ...) or one of its required
    /// fields has not been set.
    #[error("Configuration field '{0}' must not be None")]
    Incomplete(&'static str),

    /// A named type is not part of the capability table.
    #[error("Unknown {kind} '{name}'")]
    UnknownType { kind: &'static str, name: String },

    /// A numeric field is outside its valid range.
    #[error("Configuration field '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// The chosen components cannot be combined.
    #[error("Incompatible configuration: {0}")]
    Incompatible(String),

    /// The cache hierarchy could not be constructed from the supplied sizes.
    #[error("Cache configuration is invalid or incomplete: {0}")]
    InvalidCache(String),
}

/// Errors raised by the exit-event dispatcher inside a simulator process.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The observed exit category does not match the expected execution order.
    #[error("Expected a '{expected}' exit event but a '{found}' exit event was encountered.")]
    UnexpectedExit { expected: String, found: String },

    /// More exit events arrived than the expected execution order lists.
    #[error("Exit event '{found}' arrived after the expected execution order was exhausted.")]
    OrderExhausted { found: String },

    /// The raw exit cause could not be mapped to a category.
    #[error("Unknown exit cause '{0}'")]
    UnknownCause(String),

    /// No handler is registered for the hypercall code.
    #[error("No exit handler registered for hypercall {0}")]
    UnknownHandler(u32),

    /// The engine failed while performing a side effect.
    #[error("Engine error: {0}")]
    Engine(#[from] io::Error),
}

/// Errors raised by the signal channel sender and receiver.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The payload was not a JSON object.
    #[error("Invalid JSON payload format: {0}")]
    InvalidJson(String),

    /// A payload key is not a valid identifier.
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// The serialized message does not fit in the shared buffer.
    #[error("JSON payload too large ({size} bytes, must be < {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    /// The target process does not exist.
    #[error("Process {0} does not exist! Check that you are using the correct PID.")]
    NoSuchProcess(i32),

    /// The receiver did not acknowledge the message in time.
    #[error("Timed out after {0:?} waiting for the receiver to acknowledge")]
    Timeout(std::time::Duration),

    /// A shared memory or signal syscall failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Errors raised while decoding or encoding XML-RPC documents.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request body is not well-formed XML.
    #[error("Malformed XML: {0}")]
    Xml(String),

    /// The document is well-formed but not a valid XML-RPC call.
    #[error("Invalid XML-RPC request: {0}")]
    Protocol(String),

    /// The method name is not served by the gateway.
    #[error("method \"{0}\" is not supported")]
    UnknownMethod(String),

    /// A parameter has the wrong arity or type.
    #[error("{0}")]
    BadParams(String),
}

impl From<quick_xml::Error> for RpcError {
    fn from(err: quick_xml::Error) -> Self {
        RpcError::Xml(err.to_string())
    }
}

/// Errors raised while loading the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML for the settings schema.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised by the process lifecycle manager.
#[derive(Debug, Error)]
pub enum SimError {
    /// No configuration with that identifier is registered.
    #[error("Config with ID {0} does not exist.")]
    UnknownConfig(i64),

    /// The job handed to the worker could not be serialized.
    #[error("failed to encode worker job: {0}")]
    Job(#[from] serde_json::Error),

    /// The simulator process could not be started.
    #[error("failed to start simulation {sim_id}: {source}")]
    Spawn {
        sim_id: u32,
        #[source]
        source: io::Error,
    },
}

/// Errors raised inside a worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job description could not be decoded.
    #[error("invalid worker job: {0}")]
    Decode(#[from] serde_json::Error),

    /// The carried configuration does not compile.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run loop stopped on a protocol violation or engine failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The signal receiver could not be installed.
    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("worker I/O failed: {0}")]
    Io(#[from] io::Error),
}
