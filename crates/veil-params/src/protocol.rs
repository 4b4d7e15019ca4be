//! Transaction-format limits and protocol identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::network::{Network, NetworkType};

/// Maximum number of inputs a single transaction may spend
pub const MAX_INPUTS: usize = 16;

/// Maximum number of outputs a single transaction may create
pub const MAX_OUTPUTS: usize = 16;

/// Number of ring members (real input plus decoys) per input
pub const RING_SIZE: usize = 11;

/// Maximum distance between the current block and a tombstone block
pub const MAX_TOMBSTONE_BLOCKS: u64 = 20_160;

/// Token identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(u64);

impl TokenId {
    /// Native token
    pub const MOB: TokenId = TokenId(0);
    /// Dollar-pegged token
    pub const EUSD: TokenId = TokenId(1);

    /// Wrap a raw token id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw token id
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TokenId::MOB => write!(f, "MOB"),
            TokenId::EUSD => write!(f, "eUSD"),
            TokenId(id) => write!(f, "token#{}", id),
        }
    }
}

/// Block version a transaction is built against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockVersion(u32);

impl BlockVersion {
    /// Highest block version this crate knows how to describe
    pub const MAX: BlockVersion = BlockVersion(3);

    /// Wrap a raw block version
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Raw block version
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Whether transactions at this version may spend non-native tokens
    pub const fn supports_multiple_tokens(&self) -> bool {
        self.0 >= 2
    }
}

impl fmt::Display for BlockVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Protocol parameters
#[derive(Debug, Clone)]
pub struct ProtocolParams {
    /// Network configuration
    pub network: Network,
    /// Maximum inputs per transaction
    pub max_inputs_per_transaction: usize,
    /// Maximum outputs per transaction
    pub max_outputs_per_transaction: usize,
    /// Ring size per input
    pub ring_size: usize,
    /// Maximum tombstone distance in blocks
    pub max_tombstone_blocks: u64,
}

impl ProtocolParams {
    /// Create protocol params for mainnet
    pub fn mainnet() -> Self {
        Self {
            network: Network::mainnet(),
            max_inputs_per_transaction: MAX_INPUTS,
            max_outputs_per_transaction: MAX_OUTPUTS,
            ring_size: RING_SIZE,
            max_tombstone_blocks: MAX_TOMBSTONE_BLOCKS,
        }
    }

    /// Create protocol params for testnet
    pub fn testnet() -> Self {
        Self {
            network: Network::testnet(),
            ..Self::mainnet()
        }
    }

    /// Create protocol params for a local network
    pub fn local() -> Self {
        Self {
            network: Network::local(),
            max_tombstone_blocks: 100,
            ..Self::mainnet()
        }
    }

    /// Get protocol params by network type
    pub fn from_network(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Local => Self::local(),
        }
    }

    /// Latest tombstone block allowed for a transaction built at `current_block`
    pub fn tombstone_limit(&self, current_block: u64) -> u64 {
        current_block.saturating_add(self.max_tombstone_blocks)
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_protocol() {
        let params = ProtocolParams::mainnet();
        assert_eq!(params.max_inputs_per_transaction, 16);
        assert_eq!(params.ring_size, 11);
    }

    #[test]
    fn test_tombstone_limit_saturates() {
        let params = ProtocolParams::local();
        assert_eq!(params.tombstone_limit(1_000), 1_100);
        assert_eq!(params.tombstone_limit(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(TokenId::MOB.to_string(), "MOB");
        assert_eq!(TokenId::EUSD.to_string(), "eUSD");
        assert_eq!(TokenId::new(7).to_string(), "token#7");
    }

    #[test]
    fn test_block_version_token_support() {
        assert!(!BlockVersion::new(1).supports_multiple_tokens());
        assert!(BlockVersion::MAX.supports_multiple_tokens());
    }
}
