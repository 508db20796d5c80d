//! Gazetteer configuration via `periodo.toml`
//!
//! On first open, a default `periodo.toml` is written into the data directory.
//! To change settings, edit the file and reopen.

use super::transactions::RetryConfig;
use periodo_core::{Error, Result, ValidationMode};
use periodo_durability::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the gazetteer data directory.
pub const CONFIG_FILE_NAME: &str = "periodo.toml";

/// WAL file name placed in the gazetteer data directory.
pub const WAL_FILE_NAME: &str = "periodo.wal";

/// Identifier minting and resolution settings, the `[identifiers]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierConfig {
    /// Mint attempts per new entity before giving up with a collision error
    #[serde(default = "default_max_mint_attempts")]
    pub max_mint_attempts: usize,
    /// Accept the retired check-character scheme when resolving identifiers.
    /// Never consulted when minting or merging.
    #[serde(default = "default_true")]
    pub accept_legacy_checksums: bool,
}

fn default_max_mint_attempts() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            max_mint_attempts: default_max_mint_attempts(),
            accept_legacy_checksums: true,
        }
    }
}

impl IdentifierConfig {
    /// Validation mode for read-path identifier lookups
    pub fn read_validation(&self) -> ValidationMode {
        if self.accept_legacy_checksums {
            ValidationMode::AllowLegacy
        } else {
            ValidationMode::Strict
        }
    }
}

/// Conflict retry settings, the `[transactions]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Maximum number of re-runs after a commit conflict
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    RetryConfig::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryConfig::default().base_delay_ms
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::default().max_delay_ms
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&TransactionConfig> for RetryConfig {
    fn from(config: &TransactionConfig) -> Self {
        RetryConfig {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

/// Gazetteer configuration loaded from `periodo.toml`.
///
/// # Example
///
/// ```toml
/// durability = "always"
///
/// [identifiers]
/// max_mint_attempts = 10
/// accept_legacy_checksums = false
///
/// [transactions]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Identifier settings
    #[serde(default)]
    pub identifiers: IdentifierConfig,
    /// Transaction retry settings
    #[serde(default)]
    pub transactions: TransactionConfig,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            identifiers: IdentifierConfig::default(),
            transactions: TransactionConfig::default(),
        }
    }
}

impl GazetteerConfig {
    /// Create a GazetteerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::Standard),
            "always" => Ok(DurabilityMode::Always),
            other => Err(Error::Config(format!(
                "Invalid durability mode '{}' in {}. Expected \"standard\" or \"always\".",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// Retry policy for conflicting commits
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::from(&self.transactions)
    }

    /// Check every value, not just that the file parsed
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        if self.identifiers.max_mint_attempts == 0 {
            return Err(Error::Config(
                "identifiers.max_mint_attempts must be at least 1".to_string(),
            ));
        }
        if self.transactions.base_delay_ms > self.transactions.max_delay_ms {
            return Err(Error::Config(format!(
                "transactions.base_delay_ms ({}) exceeds transactions.max_delay_ms ({})",
                self.transactions.base_delay_ms, self.transactions.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# PeriodO gazetteer configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = flush every commit, fsync left to the OS
#   "always"   = fsync every commit, zero data loss
durability = "standard"

[identifiers]
# Attempts to mint an unused identifier for each new entity
max_mint_attempts = 10
# Accept identifiers carrying the retired check character when resolving.
# Minting and merging always use the current scheme.
accept_legacy_checksums = true

[transactions]
# Re-runs of a unit of work after another writer committed first
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds an
    /// invalid value.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: GazetteerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            tracing::info!(path = %path.display(), "Wrote default configuration");
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
