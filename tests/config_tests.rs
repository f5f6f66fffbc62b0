//! Integration tests for the configuration registry and compilation.

use gema::config::compile::build_cache_hierarchy;
use gema::config::{compile, Cache, CacheHierarchy, ConfigRegistry, ConfigurationData};
use gema::error::ConfigError;

/// Builds a complete x86 configuration in the registry under `id`.
fn populate(registry: &mut ConfigRegistry, id: i64) {
    assert!(registry.add(id, None));
    assert!(registry.set_board(id, "X86Board", 3.0));
    assert!(registry.set_processor(id, "x86", "SimpleProcessor", "timing", 2));
    assert!(registry.set_memory(id, "DualChannelDDR4_2400", 2048));
    assert!(registry.set_cache(
        id,
        Cache::new("PrivateL1PrivateL2CacheHierarchy", 64, 64).with_l2(1024)
    ));
    assert!(registry.set_resource(id, "x86-matrix-multiply"));
}

/// Tests that adding a duplicate identifier fails.
#[test]
fn test_add_duplicate_fails() {
    let mut registry = ConfigRegistry::new();
    assert!(registry.add(1, None));
    assert!(!registry.add(1, None));
    assert_eq!(registry.len(), 1);
}

/// Tests that an empty shell has every sub-record unset.
#[test]
fn test_empty_shell() {
    let mut registry = ConfigRegistry::new();
    registry.add(7, None);
    let config = registry.get(7).unwrap();
    assert_eq!(config.config_id, 7);
    assert!(config.board.kind.is_none());
    assert!(config.processor.ncores.is_none());
    assert!(config.memory.size.is_none());
    assert!(config.cache.kind.is_none());
    assert!(config.resource.is_none());
}

/// Tests that structured data populates every sub-record.
#[test]
fn test_add_with_data() {
    let data: ConfigurationData = serde_json::from_str(
        r#"{
            "board": {"type": "SimpleBoard", "clk": 2.5},
            "processor": {"isa": "riscv", "type": "SimpleProcessor", "cpu": "minor", "ncores": 1},
            "memory": {"type": "SingleChannelDDR3_1600", "size": 512},
            "cache": {"type": "PrivateL1CacheHierarchy", "l1d_size": 32, "l1i_size": 32},
            "resource": {"name": "riscv-hello"}
        }"#,
    )
    .unwrap();

    let mut registry = ConfigRegistry::new();
    assert!(registry.add(3, Some(data)));
    let spec = registry.compile(3).unwrap();
    assert_eq!(spec.board.kind, "SimpleBoard");
    assert_eq!(spec.processor.isa, "riscv");
    assert_eq!(spec.workload.resource, "riscv-hello");
    assert_eq!(
        spec.cache,
        CacheHierarchy::PrivateL1CacheHierarchy {
            l1d_size: 32,
            l1i_size: 32
        }
    );
}

/// Tests that non-positive values are rejected without touching the record.
#[test]
fn test_setters_reject_invalid_values() {
    let mut registry = ConfigRegistry::new();
    registry.add(1, None);

    assert!(!registry.set_processor(1, "x86", "SimpleProcessor", "timing", 0));
    assert!(!registry.set_memory(1, "DualChannelDDR4_2400", -5));
    assert!(!registry.set_board(1, "X86Board", 0.0));
    assert!(!registry.set_cache(1, Cache::new("PrivateL1CacheHierarchy", 0, 32)));

    let config = registry.get(1).unwrap();
    assert!(config.processor.ncores.is_none());
    assert!(config.memory.size.is_none());
    assert!(config.board.clk.is_none());
    assert!(config.cache.kind.is_none());
}

/// Tests that setters on a missing identifier fail.
#[test]
fn test_setters_on_missing_config() {
    let mut registry = ConfigRegistry::new();
    assert!(!registry.set_board(9, "X86Board", 3.0));
    assert!(!registry.set_resource(9, "x86-hello64-static"));
    assert!(!registry.delete(9));
}

/// Tests compilation of a complete configuration.
#[test]
fn test_compile_complete_config() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 2);

    let spec = registry.compile(2).unwrap();
    assert_eq!(spec.config_id, 2);
    assert_eq!(spec.board.clk_freq(), "3.0GHz");
    assert_eq!(spec.processor.num_cores, 2);
    assert_eq!(spec.processor.isa, "x86");
    assert_eq!(spec.memory.size_mb, 2048);
    assert_eq!(
        spec.cache,
        CacheHierarchy::PrivateL1PrivateL2CacheHierarchy {
            l1d_size: 64,
            l1i_size: 64,
            l2_size: 1024
        }
    );
}

/// Tests that a configuration without a resource does not compile.
#[test]
fn test_compile_without_resource() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 1);
    let mut config = registry.get(1).unwrap().clone();
    config.resource = None;

    assert_eq!(compile(&config), Err(ConfigError::Incomplete("resource")));
}

/// Tests that compilation failures are reported as absent, not propagated.
#[test]
fn test_registry_compile_failure_is_none() {
    let mut registry = ConfigRegistry::new();
    registry.add(1, None);
    assert!(registry.compile(1).is_none());
    assert!(registry.compile(99).is_none());
}

/// Tests that an x86 board rejects other ISAs.
#[test]
fn test_x86_board_requires_x86() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 1);
    registry.set_processor(1, "arm", "SimpleProcessor", "timing", 2);
    registry.set_resource(1, "arm-hello64-static");

    let config = registry.get(1).unwrap();
    assert!(matches!(compile(config), Err(ConfigError::Incompatible(_))));
}

/// Tests that unknown type names are reported.
#[test]
fn test_unknown_memory_type() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 1);
    registry.set_memory(1, "QuadChannelDDR9", 1024);

    let config = registry.get(1).unwrap();
    assert!(matches!(
        compile(config),
        Err(ConfigError::UnknownType { kind: "memory", .. })
    ));
}

/// Tests that compilation leaves the stored configuration unchanged.
#[test]
fn test_compile_does_not_mutate() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 1);
    let before = registry.get(1).unwrap().clone();
    registry.compile(1).unwrap();
    assert_eq!(registry.get(1).unwrap(), &before);
}

/// Dictionary form of the single-channel x86 benchmark configuration.
const NPB_CONFIG: &str = r#"{
    "board": {"type": "SimpleBoard", "clk": 3.0},
    "processor": {"isa": "x86", "type": "SimpleProcessor", "cpu": "timing", "ncores": 2},
    "memory": {"type": "SingleChannelDDR3_1600", "size": 2048},
    "cache": {
        "type": "PrivateL1CacheHierarchy",
        "l1d_size": 64,
        "l1i_size": 64,
        "l2_size": 0,
        "l1d_assoc": 0,
        "l1i_assoc": 0,
        "l2_assoc": 0
    },
    "resource": {"name": "x86-npb-cg-size-s"}
}"#;

/// Tests that the benchmark configuration compiles the same way whether it is
/// built field by field or from its dictionary, with zero-valued optional
/// cache parameters dropped.
#[test]
fn test_compile_npb_config_with_zero_cache_params() {
    let mut registry = ConfigRegistry::new();

    let data: ConfigurationData = serde_json::from_str(NPB_CONFIG).unwrap();
    assert!(registry.add(2, Some(data)));

    assert!(registry.add(3, None));
    assert!(registry.set_board(3, "SimpleBoard", 3.0));
    assert!(registry.set_processor(3, "x86", "SimpleProcessor", "timing", 2));
    assert!(registry.set_memory(3, "SingleChannelDDR3_1600", 2048));
    assert!(registry.set_cache(
        3,
        Cache::new("PrivateL1CacheHierarchy", 64, 64)
            .with_l2(0)
            .with_assoc(0, 0, 0)
    ));
    assert!(registry.set_resource(3, "x86-npb-cg-size-s"));

    let from_data = registry.compile(2).unwrap();
    let from_setters = registry.compile(3).unwrap();
    for spec in [&from_data, &from_setters] {
        assert_eq!(spec.board.kind, "SimpleBoard");
        assert_eq!(spec.board.clk_freq(), "3.0GHz");
        assert_eq!(spec.processor.num_cores, 2);
        assert_eq!(spec.processor.isa, "x86");
        assert_eq!(spec.workload.resource, "x86-npb-cg-size-s");
        assert_eq!(
            spec.cache,
            CacheHierarchy::PrivateL1CacheHierarchy {
                l1d_size: 64,
                l1i_size: 64
            }
        );
    }
    assert_eq!(from_data.memory, from_setters.memory);

    let stored = &registry.get(2).unwrap().cache;
    assert_eq!(stored.l2_size, Some(0));
    assert_eq!(stored.l2_assoc, Some(0));
}

/// Tests that zero associativities fall back to the hierarchy defaults.
#[test]
fn test_zero_assoc_uses_defaults() {
    let cache = Cache::new("PrivateL1SharedL2CacheHierarchy", 32, 32)
        .with_l2(512)
        .with_assoc(0, 4, 0);

    assert_eq!(
        build_cache_hierarchy(&cache),
        Ok(CacheHierarchy::PrivateL1SharedL2CacheHierarchy {
            l1d_size: 32,
            l1i_size: 32,
            l2_size: 512,
            l1d_assoc: 8,
            l1i_assoc: 4,
            l2_assoc: 16
        })
    );

    let no_l2 = Cache::new("PrivateL1PrivateL2CacheHierarchy", 32, 32).with_l2(0);
    assert!(matches!(
        build_cache_hierarchy(&no_l2),
        Err(ConfigError::InvalidCache(_))
    ));
}

/// Tests that a cache without a hierarchy type is stored but does not compile.
#[test]
fn test_cache_without_type_fails_at_compile() {
    let mut registry = ConfigRegistry::new();
    populate(&mut registry, 1);

    let untyped = Cache {
        l1d_size: Some(32),
        l1i_size: Some(32),
        ..Cache::default()
    };
    assert!(registry.set_cache(1, untyped));
    assert!(registry.get(1).unwrap().cache.kind.is_none());
    assert_eq!(
        compile(registry.get(1).unwrap()),
        Err(ConfigError::Incomplete("cache"))
    );
    assert!(registry.compile(1).is_none());
}
