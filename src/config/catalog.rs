//! Simulator Capability Table.
//!
//! The fixed set of component types the external simulator library provides.
//! Configuration compilation resolves names against these tables, and
//! `discover_options` exposes them to clients for UI population.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// Board types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BoardKind {
    SimpleBoard,
    X86Board,
}

impl BoardKind {
    pub const ALL: [BoardKind; 2] = [BoardKind::SimpleBoard, BoardKind::X86Board];

    pub fn name(self) -> &'static str {
        match self {
            BoardKind::SimpleBoard => "SimpleBoard",
            BoardKind::X86Board => "X86Board",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Constructor parameters of the board.
    pub fn params(self) -> &'static [&'static str] {
        &["clk_freq", "processor", "memory", "cache_hierarchy"]
    }

    /// Returns `true` if the board can host a processor of the given ISA.
    pub fn supports(self, isa: Isa) -> bool {
        match self {
            BoardKind::SimpleBoard => true,
            BoardKind::X86Board => isa == Isa::X86,
        }
    }
}

/// Processor types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ProcessorKind {
    SimpleProcessor,
}

impl ProcessorKind {
    pub fn name(self) -> &'static str {
        "SimpleProcessor"
    }

    pub fn from_name(name: &str) -> Option<Self> {
        (name == "SimpleProcessor").then_some(ProcessorKind::SimpleProcessor)
    }

    pub fn params(self) -> &'static [&'static str] {
        &["cpu_type", "num_cores", "isa"]
    }
}

/// CPU models a processor can be built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuType {
    Atomic,
    Kvm,
    Minor,
    O3,
    Timing,
}

impl CpuType {
    pub const ALL: [CpuType; 5] = [
        CpuType::Atomic,
        CpuType::Kvm,
        CpuType::Minor,
        CpuType::O3,
        CpuType::Timing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CpuType::Atomic => "atomic",
            CpuType::Kvm => "kvm",
            CpuType::Minor => "minor",
            CpuType::O3 => "o3",
            CpuType::Timing => "timing",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.name() == lower)
    }
}

/// Instruction set architectures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Isa {
    Arm,
    Mips,
    Null,
    Power,
    Riscv,
    Sparc,
    X86,
}

impl Isa {
    pub const ALL: [Isa; 7] = [
        Isa::Arm,
        Isa::Mips,
        Isa::Null,
        Isa::Power,
        Isa::Riscv,
        Isa::Sparc,
        Isa::X86,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Isa::Arm => "arm",
            Isa::Mips => "mips",
            Isa::Null => "null",
            Isa::Power => "power",
            Isa::Riscv => "riscv",
            Isa::Sparc => "sparc",
            Isa::X86 => "x86",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|i| i.name() == lower)
    }
}

pub const SINGLE_CHANNEL_MEMORY: &[&str] = &[
    "SingleChannelDDR3_1600",
    "SingleChannelDDR3_2133",
    "SingleChannelDDR4_2400",
    "SingleChannelHBM",
    "SingleChannelLPDDR3_1600",
];

pub const MULTI_CHANNEL_MEMORY: &[&str] = &[
    "DualChannelDDR3_1600",
    "DualChannelDDR3_2133",
    "DualChannelDDR4_2400",
    "DualChannelLPDDR3_1600",
    "HBM2Stack",
];

/// Resolves a memory type name to its canonical static name.
pub fn memory_model(name: &str) -> Option<&'static str> {
    SINGLE_CHANNEL_MEMORY
        .iter()
        .chain(MULTI_CHANNEL_MEMORY.iter())
        .find(|m| **m == name)
        .copied()
}

/// Cache hierarchy types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CacheKind {
    NoCache,
    PrivateL1CacheHierarchy,
    PrivateL1PrivateL2CacheHierarchy,
    PrivateL1SharedL2CacheHierarchy,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::NoCache,
        CacheKind::PrivateL1SharedL2CacheHierarchy,
        CacheKind::PrivateL1PrivateL2CacheHierarchy,
        CacheKind::PrivateL1CacheHierarchy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CacheKind::NoCache => "NoCache",
            CacheKind::PrivateL1CacheHierarchy => "PrivateL1CacheHierarchy",
            CacheKind::PrivateL1PrivateL2CacheHierarchy => "PrivateL1PrivateL2CacheHierarchy",
            CacheKind::PrivateL1SharedL2CacheHierarchy => "PrivateL1SharedL2CacheHierarchy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Constructor parameters accepted by the hierarchy.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            CacheKind::NoCache => &[],
            CacheKind::PrivateL1CacheHierarchy => &["l1d_size", "l1i_size"],
            CacheKind::PrivateL1PrivateL2CacheHierarchy => &["l1d_size", "l1i_size", "l2_size"],
            CacheKind::PrivateL1SharedL2CacheHierarchy => &[
                "l1d_size",
                "l1i_size",
                "l2_size",
                "l1d_assoc",
                "l1i_assoc",
                "l2_assoc",
            ],
        }
    }

    pub fn accepts(self, param: &str) -> bool {
        self.params().contains(&param)
    }
}

/// Workload resources known to the resource catalog, with their target ISA.
pub const RESOURCES: &[(&str, Isa)] = &[
    ("x86-hello64-static", Isa::X86),
    ("x86-matrix-multiply", Isa::X86),
    ("x86-npb-cg-size-s", Isa::X86),
    ("x86-m5-exit", Isa::X86),
    ("arm-hello64-static", Isa::Arm),
    ("arm-m5-exit", Isa::Arm),
    ("riscv-hello", Isa::Riscv),
    ("riscv-m5-exit", Isa::Riscv),
];

/// Looks up a workload resource and returns its canonical id and ISA.
pub fn resource(name: &str) -> Option<(&'static str, Isa)> {
    RESOURCES.iter().find(|(id, _)| *id == name).copied()
}

/// Describes every option a client can choose from.
///
/// The result is keyed by board type; each entry lists the board constructor
/// parameters, the available memory variants, the CPU type names, and the
/// constructor parameters of every cache hierarchy.
pub fn discover_options() -> Value {
    let memory: Vec<&str> = SINGLE_CHANNEL_MEMORY
        .iter()
        .chain(MULTI_CHANNEL_MEMORY.iter())
        .copied()
        .collect();
    let cpus: Vec<&str> = CpuType::ALL.iter().map(|c| c.name()).collect();
    let isas: Vec<&str> = Isa::ALL.iter().map(|i| i.name()).collect();

    let mut caches = Map::new();
    for kind in CacheKind::ALL {
        caches.insert(kind.name().to_string(), json!(kind.params()));
    }

    let mut options = Map::new();
    for board in BoardKind::ALL {
        options.insert(
            board.name().to_string(),
            json!({
                "board": board.params(),
                "memory": memory,
                "processor": cpus,
                "isa": isas,
                "cache_hierarchy": caches,
            }),
        );
    }
    Value::Object(options)
}
