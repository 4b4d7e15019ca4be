//! Transaction fee strategies
//!
//! A [`FeeStrategy`] maps a transaction shape (input and output counts) to the
//! fee owed in the transaction's token. Strategies are immutable snapshots:
//! one is fetched per estimation or build and used for the whole call.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::amount::TokenId;
use crate::{Error, Result};

/// Default minimum fee for MOB (0.0004 MOB in picoMOB)
pub const DEFAULT_MOB_MINIMUM_FEE: u64 = 400_000_000;

/// Default minimum fee for eUSD (in micro-eUSD)
pub const DEFAULT_EUSD_MINIMUM_FEE: u64 = 2_560;

/// Minimum fee assumed for tokens without a configured value
pub const DEFAULT_TOKEN_MINIMUM_FEE: u64 = 2_560;

/// Transaction shape a fee is evaluated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxShape {
    /// Number of inputs
    pub num_inputs: usize,
    /// Number of outputs, change included
    pub num_outputs: usize,
}

impl TxShape {
    /// Create shape
    pub const fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
        }
    }
}

/// Fee policy for a (fee level, token) pair
pub trait FeeStrategy: Send + Sync + fmt::Debug {
    /// Fee owed by a transaction of the given shape
    fn fee(&self, shape: TxShape) -> u64;
}

impl<T: FeeStrategy + ?Sized> FeeStrategy for Arc<T> {
    fn fee(&self, shape: TxShape) -> u64 {
        (**self).fee(shape)
    }
}

/// Shape-independent fee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFeeStrategy {
    fee: u64,
}

impl FixedFeeStrategy {
    /// Create fixed fee strategy
    pub const fn new(fee: u64) -> Self {
        Self { fee }
    }
}

impl FeeStrategy for FixedFeeStrategy {
    fn fee(&self, _shape: TxShape) -> u64 {
        self.fee
    }
}

/// Fee growing linearly with input and output count
///
/// Saturates at `u64::MAX`; a saturated fee exceeds every balance, so it can
/// only make a transaction unaffordable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeFeeStrategy {
    /// Flat component
    pub base_fee: u64,
    /// Added per input
    pub per_input_fee: u64,
    /// Added per output
    pub per_output_fee: u64,
}

impl FeeStrategy for ShapeFeeStrategy {
    fn fee(&self, shape: TxShape) -> u64 {
        let inputs = u64::try_from(shape.num_inputs).unwrap_or(u64::MAX);
        let outputs = u64::try_from(shape.num_outputs).unwrap_or(u64::MAX);
        self.base_fee
            .saturating_add(self.per_input_fee.saturating_mul(inputs))
            .saturating_add(self.per_output_fee.saturating_mul(outputs))
    }
}

/// Named fee policy
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeLevel {
    /// Network minimum fee
    #[default]
    Minimum,
    /// Twice the minimum
    Standard,
    /// Four times the minimum
    Priority,
}

impl FeeLevel {
    /// Fee multiplier over the token's minimum fee
    pub fn multiplier(&self) -> u64 {
        match self {
            FeeLevel::Minimum => 1,
            FeeLevel::Standard => 2,
            FeeLevel::Priority => 4,
        }
    }

    /// Apply level to a minimum fee
    pub fn apply(&self, minimum_fee: u64) -> u64 {
        minimum_fee.saturating_mul(self.multiplier())
    }

    /// Strategy used when no fee oracle is reachable
    pub fn default_fee_strategy(&self, token_id: TokenId) -> FixedFeeStrategy {
        FixedFeeStrategy::new(self.apply(minimum_fee(token_id)))
    }
}

impl fmt::Display for FeeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeLevel::Minimum => write!(f, "minimum"),
            FeeLevel::Standard => write!(f, "standard"),
            FeeLevel::Priority => write!(f, "priority"),
        }
    }
}

impl FromStr for FeeLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimum" | "min" => Ok(FeeLevel::Minimum),
            "standard" => Ok(FeeLevel::Standard),
            "priority" => Ok(FeeLevel::Priority),
            other => Err(Error::InvalidInput(format!("unknown fee level '{}'", other))),
        }
    }
}

/// Built-in minimum fee for a token
pub fn minimum_fee(token_id: TokenId) -> u64 {
    match token_id {
        TokenId::MOB => DEFAULT_MOB_MINIMUM_FEE,
        TokenId::EUSD => DEFAULT_EUSD_MINIMUM_FEE,
        _ => DEFAULT_TOKEN_MINIMUM_FEE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_fee_ignores_shape() {
        let strategy = FixedFeeStrategy::new(5);

        assert_eq!(strategy.fee(TxShape::new(1, 1)), 5);
        assert_eq!(strategy.fee(TxShape::new(16, 2)), 5);
    }

    #[test]
    fn test_shape_fee_grows_with_inputs() {
        let strategy = ShapeFeeStrategy {
            base_fee: 10,
            per_input_fee: 3,
            per_output_fee: 1,
        };

        assert_eq!(strategy.fee(TxShape::new(1, 2)), 15);
        assert_eq!(strategy.fee(TxShape::new(4, 2)), 24);
    }

    #[test]
    fn test_shape_fee_saturates() {
        let strategy = ShapeFeeStrategy {
            base_fee: u64::MAX - 1,
            per_input_fee: u64::MAX,
            per_output_fee: 0,
        };

        assert_eq!(strategy.fee(TxShape::new(2, 1)), u64::MAX);
    }

    #[test]
    fn test_fee_levels() {
        assert_eq!(FeeLevel::Minimum.apply(1_000), 1_000);
        assert_eq!(FeeLevel::Standard.apply(1_000), 2_000);
        assert_eq!(FeeLevel::Priority.apply(1_000), 4_000);
        assert_eq!(FeeLevel::Priority.apply(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_default_fee_strategy() {
        let strategy = FeeLevel::Minimum.default_fee_strategy(TokenId::MOB);
        assert_eq!(strategy.fee(TxShape::new(1, 2)), DEFAULT_MOB_MINIMUM_FEE);

        let strategy = FeeLevel::Standard.default_fee_strategy(TokenId::EUSD);
        assert_eq!(strategy.fee(TxShape::new(1, 2)), 2 * DEFAULT_EUSD_MINIMUM_FEE);
    }

    #[test]
    fn test_fee_level_parse() {
        assert_eq!("Priority".parse::<FeeLevel>().unwrap(), FeeLevel::Priority);
        assert!("urgent".parse::<FeeLevel>().is_err());
    }
}
