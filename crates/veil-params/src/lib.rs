//! Veil protocol parameters and engine configuration
//!
//! This crate provides network presets, transaction-format limits, token and
//! block-version identifiers, and the JSON configuration consumed by the
//! transaction-construction core.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod network;
pub mod protocol;

pub use config::{EngineConfig, TokenFee, DEFAULT_FEE_CACHE_TTL_SECS};
pub use network::{Network, NetworkType};
pub use protocol::{
    BlockVersion, ProtocolParams, TokenId, MAX_INPUTS, MAX_OUTPUTS, MAX_TOMBSTONE_BLOCKS, RING_SIZE,
};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
