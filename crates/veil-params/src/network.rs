//! Veil network definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::protocol::BlockVersion;
use crate::Error;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Local development network
    Local,
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(NetworkType::Mainnet),
            "testnet" | "test" => Ok(NetworkType::Testnet),
            "local" | "localnet" => Ok(NetworkType::Local),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Block version new transactions are built for
    pub block_version: BlockVersion,
    /// Whether fog report URLs are expected on recipient addresses
    pub fog_enabled: bool,
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            block_version: BlockVersion::new(3),
            fog_enabled: true,
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            block_version: BlockVersion::new(3),
            fog_enabled: true,
        }
    }

    /// Get local network parameters
    pub const fn local() -> Self {
        Self {
            network_type: NetworkType::Local,
            name: "local",
            block_version: BlockVersion::new(3),
            fog_enabled: false,
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Local => Self::local(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = Network::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.name, "mainnet");
        assert!(net.fog_enabled);
    }

    #[test]
    fn test_network_from_type() {
        let net = Network::from_type(NetworkType::Testnet);
        assert_eq!(net.network_type, NetworkType::Testnet);
    }

    #[test]
    fn test_network_type_parse() {
        assert_eq!("Mainnet".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert_eq!("local".parse::<NetworkType>().unwrap(), NetworkType::Local);
        assert!("moonnet".parse::<NetworkType>().is_err());
    }
}
