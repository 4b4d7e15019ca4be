//! Checked amount arithmetic
//!
//! Every balance decision goes through these helpers. Sums are accumulated in
//! 128 bits, which cannot overflow for any slice of `u64` values, so
//! comparisons never materialize a wrapped intermediate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

pub use veil_params::TokenId;

/// Arithmetic failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Result exceeds `u64::MAX`
    #[error("amount overflows u64")]
    Overflow,
    /// Result is below zero
    #[error("amount underflows zero")]
    Underflow,
}

/// Comparison applied to two sums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `sum(a) > sum(b)`
    Greater,
    /// `sum(a) >= sum(b)`
    GreaterOrEqual,
    /// `sum(a) == sum(b)`
    Equal,
}

/// Token amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in the token's smallest unit
    pub value: u64,
    /// Token
    pub token_id: TokenId,
}

impl Amount {
    /// Create amount
    pub const fn new(value: u64, token_id: TokenId) -> Self {
        Self { value, token_id }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.token_id)
    }
}

/// Strictly positive `u64`, used for every spend amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositiveU64(NonZeroU64);

impl PositiveU64 {
    /// `None` when `value` is zero
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Inner value
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl From<PositiveU64> for u64 {
    fn from(value: PositiveU64) -> Self {
        value.get()
    }
}

impl fmt::Display for PositiveU64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

fn wide_sum(values: &[u64]) -> u128 {
    values.iter().map(|&v| u128::from(v)).sum()
}

/// Sum values, failing instead of wrapping
pub fn safe_sum(values: &[u64]) -> Result<u64, AmountError> {
    values
        .iter()
        .try_fold(0u64, |acc, &v| acc.checked_add(v))
        .ok_or(AmountError::Overflow)
}

/// Compare `sum(a)` against `sum(b)` without overflow
pub fn safe_compare(a: &[u64], op: Comparison, b: &[u64]) -> bool {
    let (a, b) = (wide_sum(a), wide_sum(b));
    match op {
        Comparison::Greater => a > b,
        Comparison::GreaterOrEqual => a >= b,
        Comparison::Equal => a == b,
    }
}

/// Compare `sum(a)` against a single value
pub fn safe_compare_value(a: &[u64], op: Comparison, value: u64) -> bool {
    safe_compare(a, op, &[value])
}

/// `sum(a) - sum(b)`, failing when negative or when the difference exceeds `u64`
pub fn safe_subtract(a: &[u64], b: &[u64]) -> Result<u64, AmountError> {
    let difference = wide_sum(a)
        .checked_sub(wide_sum(b))
        .ok_or(AmountError::Underflow)?;
    u64::try_from(difference).map_err(|_| AmountError::Overflow)
}

/// `sum(a) - value`
pub fn safe_subtract_value(a: &[u64], value: u64) -> Result<u64, AmountError> {
    safe_subtract(a, &[value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_sum() {
        assert_eq!(safe_sum(&[]), Ok(0));
        assert_eq!(safe_sum(&[1, 2, 3]), Ok(6));
        assert_eq!(safe_sum(&[u64::MAX, 0]), Ok(u64::MAX));
        assert_eq!(safe_sum(&[u64::MAX, 1]), Err(AmountError::Overflow));
    }

    #[test]
    fn test_compare_beyond_u64() {
        // Both sides exceed u64::MAX; only the 128-bit accumulator can tell them apart.
        let a = [u64::MAX, u64::MAX];
        let b = [u64::MAX, u64::MAX - 1];
        assert!(safe_compare(&a, Comparison::Greater, &b));
        assert!(!safe_compare(&b, Comparison::GreaterOrEqual, &a));
        assert!(safe_compare(&a, Comparison::Equal, &[u64::MAX, u64::MAX]));
    }

    #[test]
    fn test_compare_value() {
        assert!(safe_compare_value(&[5, 5], Comparison::Greater, 9));
        assert!(safe_compare_value(&[5, 5], Comparison::GreaterOrEqual, 10));
        assert!(!safe_compare_value(&[5, 5], Comparison::Greater, 10));
    }

    #[test]
    fn test_safe_subtract() {
        assert_eq!(safe_subtract(&[100, 50], &[140, 5]), Ok(5));
        assert_eq!(safe_subtract(&[10], &[11]), Err(AmountError::Underflow));
        assert_eq!(safe_subtract_value(&[u64::MAX, u64::MAX], 1), Err(AmountError::Overflow));
        assert_eq!(safe_subtract_value(&[u64::MAX, 1], 1), Ok(u64::MAX));
    }

    #[test]
    fn test_positive_u64() {
        assert!(PositiveU64::new(0).is_none());
        assert_eq!(PositiveU64::new(7).map(u64::from), Some(7));
    }
}
