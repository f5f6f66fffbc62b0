//! Configuration Compiler.
//!
//! Turns an editable `Configuration` into a `CompiledSpec`: every section is
//! checked for completeness, every named type is resolved against the
//! capability table, and the cache hierarchy is constructed from the subset of
//! parameters its type accepts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::catalog::{self, BoardKind, CacheKind, CpuType, Isa, ProcessorKind};
use super::{Cache, Configuration};
use crate::error::ConfigError;

const DEFAULT_L1_ASSOC: u32 = 8;
const DEFAULT_L2_ASSOC: u32 = 16;

/// A validated, type-resolved configuration ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSpec {
    pub config_id: i64,
    pub board: BoardSpec,
    pub processor: ProcessorSpec,
    pub memory: MemorySpec,
    pub cache: CacheHierarchy,
    pub workload: WorkloadSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub kind: String,
    pub clock_ghz: f64,
}

impl BoardSpec {
    /// Clock frequency formatted the way the simulator library expects it.
    pub fn clk_freq(&self) -> String {
        format!("{:?}GHz", self.clock_ghz)
    }

    /// Length of one clock period in ticks (1 tick = 1 ps).
    pub fn period_ticks(&self) -> u64 {
        (1000.0 / self.clock_ghz).round().max(1.0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub kind: String,
    pub cpu: String,
    pub isa: String,
    pub num_cores: u32,
}

impl ProcessorSpec {
    pub fn isa(&self) -> Option<Isa> {
        Isa::from_name(&self.isa)
    }

    pub fn cpu_type(&self) -> Option<CpuType> {
        CpuType::from_name(&self.cpu)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySpec {
    pub model: String,
    pub size_mb: u64,
}

impl MemorySpec {
    pub fn size(&self) -> String {
        format!("{}MB", self.size_mb)
    }
}

/// A constructed cache hierarchy. Sizes are in KiB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheHierarchy {
    NoCache,
    PrivateL1CacheHierarchy {
        l1d_size: u64,
        l1i_size: u64,
    },
    PrivateL1PrivateL2CacheHierarchy {
        l1d_size: u64,
        l1i_size: u64,
        l2_size: u64,
    },
    PrivateL1SharedL2CacheHierarchy {
        l1d_size: u64,
        l1i_size: u64,
        l2_size: u64,
        l1d_assoc: u32,
        l1i_assoc: u32,
        l2_assoc: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub resource: String,
    pub isa: String,
}

/// Compiles a configuration into a runnable specification.
///
/// # Arguments
///
/// * `config` - The configuration to compile. It is not modified.
///
/// # Returns
///
/// The compiled specification, or the first `ConfigError` encountered.
pub fn compile(config: &Configuration) -> Result<CompiledSpec, ConfigError> {
    let board = &config.board;
    let processor = &config.processor;
    let memory = &config.memory;

    let board_name = board.kind.as_deref().ok_or(ConfigError::Incomplete("board.type"))?;
    let clk = board.clk.ok_or(ConfigError::Incomplete("board.clk"))?;
    let isa_name = processor.isa.as_deref().ok_or(ConfigError::Incomplete("processor.isa"))?;
    let proc_name = processor.kind.as_deref().ok_or(ConfigError::Incomplete("processor.type"))?;
    let cpu_name = processor.cpu.as_deref().ok_or(ConfigError::Incomplete("processor.cpu"))?;
    let ncores = processor.ncores.ok_or(ConfigError::Incomplete("processor.ncores"))?;
    let mem_name = memory.kind.as_deref().ok_or(ConfigError::Incomplete("memory.type"))?;
    let mem_size = memory.size.ok_or(ConfigError::Incomplete("memory.size"))?;
    if config.cache.kind.is_none() {
        return Err(ConfigError::Incomplete("cache"));
    }
    let resource_name = config.resource.as_deref().ok_or(ConfigError::Incomplete("resource"))?;

    let board_kind = BoardKind::from_name(board_name).ok_or_else(|| unknown("board", board_name))?;
    let proc_kind =
        ProcessorKind::from_name(proc_name).ok_or_else(|| unknown("processor", proc_name))?;
    let cpu = CpuType::from_name(cpu_name).ok_or_else(|| unknown("CPU type", cpu_name))?;
    let isa = Isa::from_name(isa_name).ok_or_else(|| unknown("ISA", isa_name))?;
    let mem_model = catalog::memory_model(mem_name).ok_or_else(|| unknown("memory", mem_name))?;
    let (resource_id, resource_isa) =
        catalog::resource(resource_name).ok_or_else(|| unknown("resource", resource_name))?;

    if !(clk.is_finite() && clk > 0.0) {
        return Err(out_of_range("board.clk", clk));
    }
    let num_cores = u32::try_from(ncores)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| out_of_range("processor.ncores", ncores))?;
    let size_mb = u64::try_from(mem_size)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| out_of_range("memory.size", mem_size))?;

    if !board_kind.supports(isa) {
        return Err(ConfigError::Incompatible(format!(
            "{} does not support the {} ISA",
            board_kind.name(),
            isa.name()
        )));
    }
    if resource_isa != isa {
        return Err(ConfigError::Incompatible(format!(
            "resource '{}' targets {} but the processor is {}",
            resource_id,
            resource_isa.name(),
            isa.name()
        )));
    }

    let cache = build_cache_hierarchy(&config.cache)?;

    Ok(CompiledSpec {
        config_id: config.config_id,
        board: BoardSpec {
            kind: board_kind.name().to_string(),
            clock_ghz: clk,
        },
        processor: ProcessorSpec {
            kind: proc_kind.name().to_string(),
            cpu: cpu.name().to_string(),
            isa: isa.name().to_string(),
            num_cores,
        },
        memory: MemorySpec {
            model: mem_model.to_string(),
            size_mb,
        },
        cache,
        workload: WorkloadSpec {
            resource: resource_id.to_string(),
            isa: resource_isa.name().to_string(),
        },
    })
}

/// Constructs a cache hierarchy from a cache selection.
///
/// Parameters the chosen hierarchy does not accept are dropped, as are unset
/// or zero-valued optional parameters. Construction fails only if the type is
/// unknown or a parameter the hierarchy requires is missing or invalid.
pub fn build_cache_hierarchy(cache: &Cache) -> Result<CacheHierarchy, ConfigError> {
    let name = cache.kind.as_deref().ok_or(ConfigError::Incomplete("cache.type"))?;
    let kind = CacheKind::from_name(name).ok_or_else(|| unknown("cache hierarchy", name))?;

    let supplied = [
        ("l1d_size", cache.l1d_size),
        ("l1i_size", cache.l1i_size),
        ("l2_size", cache.l2_size),
        ("l1d_assoc", cache.l1d_assoc),
        ("l1i_assoc", cache.l1i_assoc),
        ("l2_assoc", cache.l2_assoc),
    ];
    let params: BTreeMap<&str, i64> = supplied
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| *v != 0).map(|v| (key, v)))
        .filter(|(key, _)| kind.accepts(key))
        .collect();

    let size = |key: &'static str| -> Result<u64, ConfigError> {
        let value = params
            .get(key)
            .ok_or_else(|| ConfigError::InvalidCache(format!("{} requires {}", name, key)))?;
        u64::try_from(*value)
            .map_err(|_| ConfigError::InvalidCache(format!("{} must be positive", key)))
    };
    let assoc = |key: &'static str, default: u32| -> Result<u32, ConfigError> {
        match params.get(key) {
            None => Ok(default),
            Some(v) => u32::try_from(*v)
                .map_err(|_| ConfigError::InvalidCache(format!("{} must be positive", key))),
        }
    };

    Ok(match kind {
        CacheKind::NoCache => CacheHierarchy::NoCache,
        CacheKind::PrivateL1CacheHierarchy => CacheHierarchy::PrivateL1CacheHierarchy {
            l1d_size: size("l1d_size")?,
            l1i_size: size("l1i_size")?,
        },
        CacheKind::PrivateL1PrivateL2CacheHierarchy => {
            CacheHierarchy::PrivateL1PrivateL2CacheHierarchy {
                l1d_size: size("l1d_size")?,
                l1i_size: size("l1i_size")?,
                l2_size: size("l2_size")?,
            }
        }
        CacheKind::PrivateL1SharedL2CacheHierarchy => {
            CacheHierarchy::PrivateL1SharedL2CacheHierarchy {
                l1d_size: size("l1d_size")?,
                l1i_size: size("l1i_size")?,
                l2_size: size("l2_size")?,
                l1d_assoc: assoc("l1d_assoc", DEFAULT_L1_ASSOC)?,
                l1i_assoc: assoc("l1i_assoc", DEFAULT_L1_ASSOC)?,
                l2_assoc: assoc("l2_assoc", DEFAULT_L2_ASSOC)?,
            }
        }
    })
}

fn unknown(kind: &'static str, name: &str) -> ConfigError {
    ConfigError::UnknownType {
        kind,
        name: name.to_string(),
    }
}

fn out_of_range(field: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_l1_drops_l2_and_assoc() {
        let cache = Cache::new("PrivateL1CacheHierarchy", 64, 32)
            .with_l2(256)
            .with_assoc(4, 4, 8);
        assert_eq!(
            build_cache_hierarchy(&cache),
            Ok(CacheHierarchy::PrivateL1CacheHierarchy {
                l1d_size: 64,
                l1i_size: 32
            })
        );
    }

    #[test]
    fn private_l2_requires_l2_size() {
        let cache = Cache::new("PrivateL1PrivateL2CacheHierarchy", 64, 64);
        assert!(matches!(
            build_cache_hierarchy(&cache),
            Err(ConfigError::InvalidCache(_))
        ));
    }

    #[test]
    fn shared_l2_uses_default_assoc() {
        let cache = Cache::new("PrivateL1SharedL2CacheHierarchy", 32, 32).with_l2(512);
        assert_eq!(
            build_cache_hierarchy(&cache),
            Ok(CacheHierarchy::PrivateL1SharedL2CacheHierarchy {
                l1d_size: 32,
                l1i_size: 32,
                l2_size: 512,
                l1d_assoc: 8,
                l1i_assoc: 8,
                l2_assoc: 16,
            })
        );
    }

    #[test]
    fn clock_formatting_keeps_decimal() {
        let board = BoardSpec {
            kind: "SimpleBoard".into(),
            clock_ghz: 3.0,
        };
        assert_eq!(board.clk_freq(), "3.0GHz");
        assert_eq!(board.period_ticks(), 333);
    }
}
