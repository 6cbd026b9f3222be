//! Pairer configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::PairingDelegatePriority;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Pairer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairerConfig {
    /// Countdown armed before each bond/connect attempt
    pub bond_timeout_secs: u64,
    pub delegate_priority: PairingDelegatePriority,
    /// Saved-devices feature
    pub saved_devices_enabled: bool,
    /// Require explicit opt-in before writing an account key
    pub strict_opt_in: bool,
}

impl Default for PairerConfig {
    fn default() -> Self {
        Self {
            bond_timeout_secs: 15,
            delegate_priority: PairingDelegatePriority::High,
            saved_devices_enabled: true,
            strict_opt_in: false,
        }
    }
}

impl PairerConfig {
    /// Load configuration from an optional TOML file, then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FASTPAIR_CONFIG") {
            Ok(config_path) => Self::load_from_toml(&config_path)?,
            Err(_) => Self::default(),
        };

        if let Ok(secs) = std::env::var("FASTPAIR_BOND_TIMEOUT_SECS") {
            config.bond_timeout_secs = secs
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid bond_timeout_secs: {}", e)))?;
        }

        if let Ok(priority) = std::env::var("FASTPAIR_DELEGATE_PRIORITY") {
            config.delegate_priority = match priority.to_ascii_lowercase().as_str() {
                "low" => PairingDelegatePriority::Low,
                "high" => PairingDelegatePriority::High,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "Invalid delegate_priority: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(flag) = std::env::var("FASTPAIR_SAVED_DEVICES") {
            config.saved_devices_enabled = parse_flag("saved_devices_enabled", &flag)?;
        }

        if let Ok(flag) = std::env::var("FASTPAIR_STRICT_OPT_IN") {
            config.strict_opt_in = parse_flag("strict_opt_in", &flag)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Load from a TOML file; unset keys keep their defaults
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bond_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bond_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bond_timeout(&self) -> Duration {
        Duration::from_secs(self.bond_timeout_secs)
    }

    /// Opt-in must be confirmed before an account key is written.
    pub fn requires_opt_in_before_write(&self) -> bool {
        self.saved_devices_enabled && self.strict_opt_in
    }

    /// Associating a key implicitly opts the account in.
    pub fn opts_in_on_association(&self) -> bool {
        self.saved_devices_enabled && !self.strict_opt_in
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(format!("Invalid {}: {}", name, other))),
    }
}
