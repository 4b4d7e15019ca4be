//! Engine configuration loaded from JSON
//!
//! ```json
//! {
//!   "network": "testnet",
//!   "max_inputs_per_transaction": 16,
//!   "fee_cache_ttl_secs": 30,
//!   "minimum_fees": [{ "token_id": 0, "minimum_fee": 400000000 }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::network::NetworkType;
use crate::protocol::{ProtocolParams, TokenId, MAX_INPUTS};
use crate::{Error, Result};

/// Default lifetime of a cached fee strategy
pub const DEFAULT_FEE_CACHE_TTL_SECS: u64 = 30;

/// Minimum fee override for one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFee {
    /// Token the fee applies to
    pub token_id: TokenId,
    /// Minimum fee in the token's smallest unit
    pub minimum_fee: u64,
}

/// Transaction-engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Network the engine builds for
    pub network: NetworkType,
    /// Override for the per-transaction input limit
    pub max_inputs_per_transaction: Option<usize>,
    /// Fee cache lifetime in seconds
    pub fee_cache_ttl_secs: u64,
    /// Per-token minimum fees used by the static fee oracle
    pub minimum_fees: Vec<TokenFee>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            max_inputs_per_transaction: None,
            fee_cache_ttl_secs: DEFAULT_FEE_CACHE_TTL_SECS,
            minimum_fees: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(max_inputs) = self.max_inputs_per_transaction {
            // Consolidation merges `max_inputs` records into one, so it must shrink the set.
            if max_inputs < 2 {
                return Err(Error::InvalidConfig(format!(
                    "max_inputs_per_transaction must be at least 2, got {}",
                    max_inputs
                )));
            }
            if max_inputs > MAX_INPUTS {
                return Err(Error::InvalidConfig(format!(
                    "max_inputs_per_transaction {} exceeds protocol limit {}",
                    max_inputs, MAX_INPUTS
                )));
            }
        }

        if self.fee_cache_ttl_secs == 0 {
            return Err(Error::InvalidConfig(
                "fee_cache_ttl_secs must be positive".to_string(),
            ));
        }

        for (i, fee) in self.minimum_fees.iter().enumerate() {
            if fee.minimum_fee == 0 {
                return Err(Error::InvalidConfig(format!(
                    "minimum fee for {} must be positive",
                    fee.token_id
                )));
            }
            if self.minimum_fees[..i].iter().any(|f| f.token_id == fee.token_id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate minimum fee entry for {}",
                    fee.token_id
                )));
            }
        }

        Ok(())
    }

    /// Protocol parameters with configured overrides applied
    pub fn protocol_params(&self) -> ProtocolParams {
        let mut params = ProtocolParams::from_network(self.network);
        if let Some(max_inputs) = self.max_inputs_per_transaction {
            params.max_inputs_per_transaction = max_inputs;
        }
        params
    }

    /// Configured minimum fee for a token, if any
    pub fn minimum_fee(&self, token_id: TokenId) -> Option<u64> {
        self.minimum_fees
            .iter()
            .find(|f| f.token_id == token_id)
            .map(|f| f.minimum_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol_params().max_inputs_per_transaction, MAX_INPUTS);
    }

    #[test]
    fn test_parse_with_overrides() {
        let config = EngineConfig::from_json_str(
            r#"{
                "network": "testnet",
                "max_inputs_per_transaction": 4,
                "minimum_fees": [{ "token_id": 1, "minimum_fee": 2560 }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.network, NetworkType::Testnet);
        assert_eq!(config.fee_cache_ttl_secs, DEFAULT_FEE_CACHE_TTL_SECS);
        assert_eq!(config.protocol_params().max_inputs_per_transaction, 4);
        assert_eq!(config.minimum_fee(TokenId::EUSD), Some(2560));
        assert_eq!(config.minimum_fee(TokenId::MOB), None);
    }

    #[test]
    fn test_rejects_single_input_limit() {
        let result = EngineConfig::from_json_str(r#"{ "max_inputs_per_transaction": 1 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_input_limit_above_protocol() {
        let result = EngineConfig::from_json_str(r#"{ "max_inputs_per_transaction": 17 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_duplicate_token_fee() {
        let result = EngineConfig::from_json_str(
            r#"{ "minimum_fees": [
                { "token_id": 0, "minimum_fee": 10 },
                { "token_id": 0, "minimum_fee": 20 }
            ] }"#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = EngineConfig::from_json_str("{ network: ");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "network": "local", "fee_cache_ttl_secs": 5 }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.network, NetworkType::Local);
        assert_eq!(config.fee_cache_ttl_secs, 5);
    }
}
