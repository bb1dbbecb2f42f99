//! Configuration module
//!
//! Loads the pipeline configuration from a TOML file, applies `.env` and
//! environment overrides, and validates the result. Every section and field
//! has a default, so an empty file is a valid configuration.

use crate::analysis::{AnalyzerConfig, FeeConfig};
use crate::cache::CacheConfig;
use crate::rpc::{Commitment, RpcConfig};
use crate::simulation::SimulationConfig;
use crate::tx_builder::{BuilderConfig, OptimizerConfig};
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_RPC_URL: &str = "TXFORGE_RPC_URL";
pub const ENV_COMMITMENT: &str = "TXFORGE_COMMITMENT";
pub const ENV_RPC_TIMEOUT_MS: &str = "TXFORGE_RPC_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {reason}")]
    Override { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Cache capacities per key space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_validation_cache")]
    pub validation: CacheConfig,

    #[serde(default = "default_simulation_cache")]
    pub simulation: CacheConfig,

    #[serde(default = "default_analysis_cache")]
    pub analysis: CacheConfig,
}

fn default_validation_cache() -> CacheConfig {
    CacheConfig {
        capacity: 1_000,
        ttl_ms: Some(30_000),
    }
}

fn default_simulation_cache() -> CacheConfig {
    CacheConfig::new(500)
}

fn default_analysis_cache() -> CacheConfig {
    CacheConfig::new(500)
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            validation: default_validation_cache(),
            simulation: default_simulation_cache(),
            analysis: default_analysis_cache(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub builder: BuilderConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub analysis: AnalyzerConfig,

    #[serde(default)]
    pub fees: FeeConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file (no overrides, no validation)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from file (or defaults when `path` is `None`), apply `.env` and
    /// environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TXFORGE_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(raw) = lookup(ENV_COMMITMENT) {
            let commitment: Commitment = raw.parse().map_err(|reason| ConfigError::Override {
                name: ENV_COMMITMENT.to_string(),
                reason,
            })?;
            self.rpc.commitment = commitment;
            self.builder.commitment = commitment;
            self.validation.commitment = commitment;
            self.simulation.commitment = commitment;
        }
        if let Some(raw) = lookup(ENV_RPC_TIMEOUT_MS) {
            self.rpc.timeout_ms = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Override {
                    name: ENV_RPC_TIMEOUT_MS.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc.url.starts_with("http://") || self.rpc.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "rpc.url must be an http(s) URL, got '{}'",
                self.rpc.url
            )));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_ms must be positive".to_string()));
        }
        if self.builder.max_instructions == 0 {
            return Err(ConfigError::Invalid(
                "builder.max_instructions must be positive".to_string(),
            ));
        }
        if self.validation.max_parallel_requests == 0 {
            return Err(ConfigError::Invalid(
                "validation.max_parallel_requests must be positive".to_string(),
            ));
        }
        for (name, cache) in [
            ("validation", &self.cache.validation),
            ("simulation", &self.cache.simulation),
            ("analysis", &self.cache.analysis),
        ] {
            if cache.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "cache.{}.capacity must be positive",
                    name
                )));
            }
        }
        for (name, margin) in [
            ("fees.safety_margin", self.fees.safety_margin),
            ("analysis.compute_margin", self.analysis.compute_margin),
            ("optimizer.compute_margin", self.optimizer.compute_margin),
        ] {
            if !(0.0..=10.0).contains(&margin) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 10], got {}",
                    name, margin
                )));
            }
        }
        if self.analysis.anomaly_factor <= 1.0 {
            return Err(ConfigError::Invalid(
                "analysis.anomaly_factor must be greater than 1".to_string(),
            ));
        }
        Ok(())
    }
}
