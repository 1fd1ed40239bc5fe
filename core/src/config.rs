//! Core settings and configuration management
//!
//! Tunables for framing, reassembly, duplicate suppression, channel key
//! derivation and content padding. Serializes to and from JSON; every load
//! and save is validated.

use crate::channel::DEFAULT_PBKDF2_ITERATIONS;
use crate::message::DEFAULT_BLOCK_SIZE;
use crate::protocol::{ReassemblyConfig, WireConfig, DEFAULT_CHUNK_SIZE, DEFAULT_TTL};
use crate::protocol::reassembly::{DEFAULT_MAX_PENDING, DEFAULT_REASSEMBLY_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Complete core configuration. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Largest payload per frame before fragmenting
    pub chunk_size: usize,

    /// Hop budget given to packets this node originates
    pub default_ttl: u8,

    /// Packets that may be mid-reassembly at once
    pub reassembly_max_pending: usize,

    /// Idle seconds before a partial packet is dropped
    pub reassembly_timeout_secs: u64,

    /// Planned insertions for the seen-packet filter
    pub bloom_expected_insertions: usize,

    /// Target false-positive rate for the seen-packet filter
    pub bloom_false_positive_rate: f64,

    /// PBKDF2 work factor for channel passwords
    pub pbkdf2_iterations: u32,

    /// Content padding block for the message codec
    pub message_block_size: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_ttl: DEFAULT_TTL,
            reassembly_max_pending: DEFAULT_MAX_PENDING,
            reassembly_timeout_secs: DEFAULT_REASSEMBLY_TIMEOUT.as_secs(),
            bloom_expected_insertions: 500,
            bloom_false_positive_rate: 0.01,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            message_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CoreSettings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size == 0 || self.chunk_size > u16::MAX as usize {
            return Err(SettingsError::ConfigError(
                "chunk_size must be in 1..=65535".to_string(),
            ));
        }

        if self.default_ttl == 0 {
            return Err(SettingsError::ConfigError(
                "default_ttl must be at least 1".to_string(),
            ));
        }

        if self.reassembly_max_pending == 0 || self.reassembly_timeout_secs == 0 {
            return Err(SettingsError::ConfigError(
                "reassembly capacity and timeout must be nonzero".to_string(),
            ));
        }

        if self.bloom_expected_insertions == 0 {
            return Err(SettingsError::ConfigError(
                "bloom_expected_insertions must be nonzero".to_string(),
            ));
        }

        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(SettingsError::ConfigError(
                "bloom_false_positive_rate must be in (0, 1)".to_string(),
            ));
        }

        if self.pbkdf2_iterations == 0 {
            return Err(SettingsError::ConfigError(
                "pbkdf2_iterations must be nonzero".to_string(),
            ));
        }

        if !(2..=256).contains(&self.message_block_size) {
            return Err(SettingsError::ConfigError(
                "message_block_size must be in 2..=256".to_string(),
            ));
        }

        Ok(())
    }

    pub fn reassembly_config(&self) -> ReassemblyConfig {
        ReassemblyConfig {
            max_pending: self.reassembly_max_pending,
            timeout: Duration::from_secs(self.reassembly_timeout_secs),
        }
    }

    pub fn wire_config(&self) -> WireConfig {
        WireConfig {
            chunk_size: self.chunk_size,
            reassembly: self.reassembly_config(),
        }
    }

    /// Load settings from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_string(&content)
    }

    /// Save settings to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let json = self.to_json_string()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Convert to pretty JSON string
    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        self.validate()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Create from JSON string
    pub fn from_json_string(json: &str) -> Result<Self, SettingsError> {
        let settings: CoreSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }
}
