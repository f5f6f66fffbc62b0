//! Configuration registry.
//!
//! Holds configurations in insertion order. Mutators never fail loudly: a
//! missing identifier or an out-of-bounds value returns `false` and leaves the
//! registry untouched.

use tracing::{debug, warn};

use super::compile::{compile, CompiledSpec};
use super::{Board, Cache, Configuration, ConfigurationData, Memory, Processor};

#[derive(Debug, Default)]
pub struct ConfigRegistry {
    configs: Vec<Configuration>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new configuration.
    ///
    /// # Arguments
    ///
    /// * `config_id` - Unique identifier for the configuration
    /// * `data` - Optional structured data used to populate every sub-record
    ///
    /// # Returns
    ///
    /// `false` if a configuration with the same identifier already exists.
    pub fn add(&mut self, config_id: i64, data: Option<ConfigurationData>) -> bool {
        if self.get(config_id).is_some() {
            debug!(config_id, "config already exists");
            return false;
        }

        let config = match data {
            Some(data) => Configuration::from_data(config_id, data),
            None => Configuration::new(config_id),
        };
        self.configs.push(config);
        debug!(config_id, "config added");
        true
    }

    /// Removes a configuration. Returns `false` if it does not exist.
    pub fn delete(&mut self, config_id: i64) -> bool {
        let before = self.configs.len();
        self.configs.retain(|cfg| cfg.config_id != config_id);
        self.configs.len() != before
    }

    /// Sets the board. Fails if the clock frequency is not strictly positive.
    pub fn set_board(&mut self, config_id: i64, kind: &str, clk: f64) -> bool {
        if !(clk.is_finite() && clk > 0.0) {
            return false;
        }
        self.update(config_id, |cfg| {
            cfg.board = Board {
                kind: Some(kind.to_string()),
                clk: Some(clk),
            };
        })
    }

    /// Sets the processor. Fails if the core count is not strictly positive.
    pub fn set_processor(
        &mut self,
        config_id: i64,
        isa: &str,
        kind: &str,
        cpu: &str,
        ncores: i64,
    ) -> bool {
        if ncores <= 0 {
            return false;
        }
        self.update(config_id, |cfg| {
            cfg.processor = Processor {
                isa: Some(isa.to_string()),
                kind: Some(kind.to_string()),
                cpu: Some(cpu.to_string()),
                ncores: Some(ncores),
            };
        })
    }

    /// Sets the memory. Fails if the size is not strictly positive.
    pub fn set_memory(&mut self, config_id: i64, kind: &str, size: i64) -> bool {
        if size <= 0 {
            return false;
        }
        self.update(config_id, |cfg| {
            cfg.memory = Memory {
                kind: Some(kind.to_string()),
                size: Some(size),
            };
        })
    }

    /// Sets the cache hierarchy. Both L1 sizes must be present and strictly
    /// positive; L2 size and associativities are optional.
    ///
    /// The hierarchy type is not checked here. A missing or unknown type is
    /// reported when the configuration is compiled.
    pub fn set_cache(&mut self, config_id: i64, cache: Cache) -> bool {
        let l1_valid = matches!(
            (cache.l1d_size, cache.l1i_size),
            (Some(d), Some(i)) if d > 0 && i > 0
        );
        if !l1_valid {
            return false;
        }
        self.update(config_id, |cfg| cfg.cache = cache)
    }

    /// Sets the workload resource identifier.
    pub fn set_resource(&mut self, config_id: i64, resource: &str) -> bool {
        self.update(config_id, |cfg| cfg.resource = Some(resource.to_string()))
    }

    pub fn get(&self, config_id: i64) -> Option<&Configuration> {
        self.configs.iter().find(|cfg| cfg.config_id == config_id)
    }

    pub fn list(&self) -> &[Configuration] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Compiles a stored configuration.
    ///
    /// Failures are logged and reported as `None`; they never propagate.
    pub fn compile(&self, config_id: i64) -> Option<CompiledSpec> {
        let config = self.get(config_id)?;
        match compile(config) {
            Ok(spec) => Some(spec),
            Err(err) => {
                warn!(config_id, error = %err, "Configuration Error");
                None
            }
        }
    }

    fn update(&mut self, config_id: i64, apply: impl FnOnce(&mut Configuration)) -> bool {
        match self.configs.iter_mut().find(|cfg| cfg.config_id == config_id) {
            Some(cfg) => {
                apply(cfg);
                true
            }
            None => false,
        }
    }
}
