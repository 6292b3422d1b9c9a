//! Configuration loading for the Lader CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use lader_core::mapping::{default_mapping, load_mapping_file};
use lader_core::RegisterStore;
use lader_sim::{EnvConfig, FactorySpec, RewardConfig, SimulationConfig};

/// Configuration for the command line tools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
    pub reward: RewardConfig,
    pub machines: FactorySpec,
    pub modbus: ModbusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also log to this file when set
    pub log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

/// Device connection settings. The connection itself is owned by the
/// device-side integration; the CLI only uses the polling interval and the
/// mapping file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub polling_interval_ms: u64,
    /// Register mapping JSON; the built-in mapping when empty
    pub mapping_file: String,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            slave_id: 1,
            polling_interval_ms: 100,
            mapping_file: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        // Add config file if it exists
        if let Some(path) = &config_path {
            tracing::debug!("Loading config from: {:?}", path);
            builder = builder.add_source(File::from(path.clone()).required(explicit.is_some()));
        }

        // Add environment variables with LADER_ prefix
        builder = builder.add_source(
            Environment::with_prefix("LADER")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .env_config()
            .validate()
            .context("Invalid simulation configuration")?;
        Ok(config)
    }

    /// Find the configuration file
    pub fn find_config_file() -> Option<PathBuf> {
        // Check in order: LADER_CONFIG env, ./lader.toml, ~/.config/lader/lader.toml
        if let Ok(path) = std::env::var("LADER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("lader.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("lader").join("lader.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Environment settings carried by this configuration
    pub fn env_config(&self) -> EnvConfig {
        EnvConfig {
            simulation: self.simulation.clone(),
            reward: self.reward.clone(),
            machines: self.machines.clone(),
        }
    }

    /// Register store over the configured mapping
    pub fn register_store(&self) -> Result<RegisterStore> {
        let defs = if self.modbus.mapping_file.is_empty() {
            default_mapping()
        } else {
            load_mapping_file(&self.modbus.mapping_file)
                .with_context(|| format!("Failed to load mapping file {}", self.modbus.mapping_file))?
        };
        RegisterStore::from_mapping(&defs).context("Invalid register mapping")
    }
}
