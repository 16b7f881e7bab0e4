//! Ledger configuration

use crate::constants::*;
use crate::error::{LedgerError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fork tree limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockPoolConfig {
    /// Maximum number of cached blocks
    pub cache_limit: usize,
    /// Blocks this many heights behind the tail are dropped
    pub retention_window: u64,
}

impl Default for BlockPoolConfig {
    fn default() -> Self {
        Self {
            cache_limit: BLOCK_CACHE_LIMIT,
            retention_window: BLOCK_RETENTION_WINDOW,
        }
    }
}

/// Transaction pool budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxPoolConfig {
    /// Total serialized bytes held by the pool
    pub max_size_bytes: usize,
    /// Total number of transactions held by the pool
    pub max_count: usize,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: TX_POOL_SIZE_LIMIT,
            max_count: TX_POOL_COUNT_LIMIT,
        }
    }
}

/// Chain policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// Height gap above which a pushed block triggers a download request
    pub height_diff_threshold: u64,
    /// Confirmations before a block is irreversible
    pub min_confirmation_num: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            height_diff_threshold: HEIGHT_DIFF_THRESHOLD,
            min_confirmation_num: MIN_CONFIRMATION_NUM,
        }
    }
}

/// Top-level ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub block_pool: BlockPoolConfig,
    pub tx_pool: TxPoolConfig,
    pub chain: ChainConfig,
    /// Number of per-address UTXO sets kept in memory
    pub utxo_cache_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            block_pool: BlockPoolConfig::default(),
            tx_pool: TxPoolConfig::default(),
            chain: ChainConfig::default(),
            utxo_cache_limit: UTXO_CACHE_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// ```
    /// use ledger_core::config::LedgerConfig;
    ///
    /// let config = LedgerConfig::from_json(r#"{ "tx_pool": { "max_count": 16 } }"#).unwrap();
    /// assert_eq!(config.tx_pool.max_count, 16);
    /// assert_eq!(config.utxo_cache_limit, 1024);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_pool.cache_limit == 0 {
            return Err(LedgerError::Config("block_pool.cache_limit must be non-zero".to_string()));
        }
        if self.utxo_cache_limit == 0 {
            return Err(LedgerError::Config("utxo_cache_limit must be non-zero".to_string()));
        }
        if self.tx_pool.max_count == 0 || self.tx_pool.max_size_bytes == 0 {
            return Err(LedgerError::Config("tx_pool budgets must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.height_diff_threshold, HEIGHT_DIFF_THRESHOLD);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LedgerConfig::from_json(r#"{ "block_pool": { "retention_window": 5 } }"#).unwrap();
        assert_eq!(config.block_pool.retention_window, 5);
        assert_eq!(config.block_pool.cache_limit, BLOCK_CACHE_LIMIT);
        assert_eq!(config.tx_pool, TxPoolConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = LedgerConfig::from_json(r#"{ "mempool": {} }"#);
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = LedgerConfig::from_json(r#"{ "utxo_cache_limit": 0 }"#);
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = LedgerConfig::from_json_file("/nonexistent/ledger.json");
        assert!(result.is_err());
    }
}
