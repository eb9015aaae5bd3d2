//! Engine configuration
//!
//! The flags that steer inline cache adaptation and deoptimization. Configurations can
//! be built in code with the `with_*` builders or loaded from a JSON file; absent keys
//! keep their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default bound on the number of receiver shapes a polymorphic keyed stub covers
pub const DEFAULT_MAX_KEYED_POLYMORPHISM: usize = 4;

/// Default number of entries kept in the megamorphic stub cache
pub const DEFAULT_STUB_CACHE_CAPACITY: usize = 2048;

/// Default number of deoptimizations after which a function is never optimized again
pub const DEFAULT_MAX_DEOPT_COUNT: u32 = 10;

/// Tunables for the inline cache system and the deoptimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether miss handlers may patch call sites at all
    pub use_ic: bool,
    /// Maximum number of receiver shapes in a polymorphic keyed stub
    pub max_keyed_polymorphism: usize,
    /// Capacity of the megamorphic stub cache
    pub stub_cache_capacity: usize,
    /// Emit a trace line for every call-site state change
    pub trace_ic: bool,
    /// Emit a trace line for every deoptimization
    pub trace_deopt: bool,
    /// Emit a trace line for every on-stack replacement attempt
    pub trace_osr: bool,
    /// Deoptimizations after which a function is marked as not optimizable
    pub max_deopt_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_ic: true,
            max_keyed_polymorphism: DEFAULT_MAX_KEYED_POLYMORPHISM,
            stub_cache_capacity: DEFAULT_STUB_CACHE_CAPACITY,
            trace_ic: false,
            trace_deopt: false,
            trace_osr: false,
            max_deopt_count: DEFAULT_MAX_DEOPT_COUNT,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable call-site patching
    pub fn with_use_ic(mut self, use_ic: bool) -> Self {
        self.use_ic = use_ic;
        self
    }

    /// Set the polymorphism bound for keyed stubs
    pub fn with_max_keyed_polymorphism(mut self, max: usize) -> Self {
        self.max_keyed_polymorphism = max;
        self
    }

    /// Set the stub cache capacity
    pub fn with_stub_cache_capacity(mut self, capacity: usize) -> Self {
        self.stub_cache_capacity = capacity;
        self
    }

    /// Enable inline cache tracing
    pub fn with_trace_ic(mut self, enabled: bool) -> Self {
        self.trace_ic = enabled;
        self
    }

    /// Enable deoptimization tracing
    pub fn with_trace_deopt(mut self, enabled: bool) -> Self {
        self.trace_deopt = enabled;
        self
    }

    /// Enable on-stack replacement tracing
    pub fn with_trace_osr(mut self, enabled: bool) -> Self {
        self.trace_osr = enabled;
        self
    }

    /// Set the deoptimization budget per function
    pub fn with_max_deopt_count(mut self, count: u32) -> Self {
        self.max_deopt_count = count;
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize the configuration as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize engine config: {}", e)))
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_keyed_polymorphism == 0 {
            return Err(Error::config("max_keyed_polymorphism must be at least 1"));
        }
        if self.stub_cache_capacity == 0 {
            return Err(Error::config("stub_cache_capacity must be at least 1"));
        }
        if self.max_deopt_count == 0 {
            return Err(Error::config("max_deopt_count must be at least 1"));
        }
        Ok(())
    }
}
