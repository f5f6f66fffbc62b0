//! Simulation configurations.
//!
//! A `Configuration` is the user-editable description of a simulated system:
//! board, processor, memory, cache hierarchy, and the workload resource. All
//! fields are optional while a configuration is being edited; completeness is
//! only enforced when it is compiled into a `CompiledSpec`.

use serde::{Deserialize, Serialize};

/// Capability table of the simulator library (boards, CPUs, memories, caches).
pub mod catalog;

/// Translation of a complete configuration into a runnable specification.
pub mod compile;

/// In-memory registry of configurations.
pub mod registry;

pub use compile::{compile, CacheHierarchy, CompiledSpec};
pub use registry::ConfigRegistry;

/// Board selection: board type name and clock frequency in GHz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Board {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub clk: Option<f64>,
}

/// Processor selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Processor {
    pub isa: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub cpu: Option<String>,
    pub ncores: Option<i64>,
}

/// Memory selection: memory type name and size in MB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Memory {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<i64>,
}

/// Cache hierarchy selection. Sizes are in KiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub l1d_size: Option<i64>,
    pub l1i_size: Option<i64>,
    pub l2_size: Option<i64>,
    pub l1d_assoc: Option<i64>,
    pub l1i_assoc: Option<i64>,
    pub l2_assoc: Option<i64>,
}

impl Cache {
    /// Builds a cache selection with the two mandatory L1 sizes.
    pub fn new(kind: &str, l1d_size: i64, l1i_size: i64) -> Self {
        Self {
            kind: Some(kind.to_string()),
            l1d_size: Some(l1d_size),
            l1i_size: Some(l1i_size),
            ..Self::default()
        }
    }

    pub fn with_l2(mut self, l2_size: i64) -> Self {
        self.l2_size = Some(l2_size);
        self
    }

    pub fn with_assoc(mut self, l1d: i64, l1i: i64, l2: i64) -> Self {
        self.l1d_assoc = Some(l1d);
        self.l1i_assoc = Some(l1i);
        self.l2_assoc = Some(l2);
        self
    }
}

/// A named, editable simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub config_id: i64,
    pub resource: Option<String>,
    pub board: Board,
    pub processor: Processor,
    pub memory: Memory,
    pub cache: Cache,
}

impl Configuration {
    /// Creates an empty shell with only the identifier set.
    pub fn new(config_id: i64) -> Self {
        Self {
            config_id,
            ..Self::default()
        }
    }

    /// Creates a configuration populated from structured data.
    ///
    /// Sections missing from `data` become empty sub-records.
    pub fn from_data(config_id: i64, data: ConfigurationData) -> Self {
        Self {
            config_id,
            resource: data.resource.and_then(|r| r.name),
            board: data.board.unwrap_or_default(),
            processor: data.processor.unwrap_or_default(),
            memory: data.memory.unwrap_or_default(),
            cache: data.cache.unwrap_or_default(),
        }
    }
}

/// Structured initial data accepted by `ConfigRegistry::add`.
///
/// Mirrors the dictionary shape clients send:
/// `{"board": {...}, "processor": {...}, "memory": {...}, "cache": {...},
///   "resource": {"name": "..."}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigurationData {
    #[serde(default)]
    pub board: Option<Board>,
    #[serde(default)]
    pub processor: Option<Processor>,
    #[serde(default)]
    pub memory: Option<Memory>,
    #[serde(default)]
    pub cache: Option<Cache>,
    #[serde(default)]
    pub resource: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceRef {
    pub name: Option<String>,
}
