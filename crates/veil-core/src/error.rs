//! Error types for Veil Core
//!
//! Every failure a caller can act on is returned as a typed [`Error`].
//! Signing-backend contract violations are not represented here; they abort
//! the operation (see [`crate::backend`]).

use std::fmt;

use crate::oracle::ConnectionError;
use crate::selection::SelectionError;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Veil Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request: zero amount, out-of-range subaddress, unbalanced composition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Spendable records cannot cover amount plus fee
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Checked arithmetic overflowed while summing balances
    #[error("Balance overflow: {0}")]
    BalanceOverflow(String),

    /// The fee alone exceeds the spendable balance
    #[error("Fee exceeds balance: {0}")]
    FeeExceedsBalance(String),

    /// Fee oracle fetch failed
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Signing backend rejected a remote report key
    #[error("Attestation verification failed: {0}")]
    AttestationVerificationFailed(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(#[from] veil_params::Error),

    /// Snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::InsufficientBalance(_)
                | Error::FeeExceedsBalance(_)
                | Error::Connection(_)
        )
    }

    /// Whether the operation may be retried unchanged
    ///
    /// Attestation failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput(_) => {
                "The transaction request is invalid. Please check the amount and recipient.".to_string()
            }
            Error::InsufficientBalance(_) => {
                "You don't have enough funds for this transaction. Please check your balance and try again.".to_string()
            }
            Error::FeeExceedsBalance(_) => {
                "Your balance is too small to cover the network fee.".to_string()
            }
            Error::Connection(_) => {
                "Unable to fetch current network fees. Please check your connection and try again.".to_string()
            }
            Error::AttestationVerificationFailed(_) => {
                "The recipient's service could not be verified. The transaction was not created.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput(_) => ErrorCategory::Input,
            Error::InsufficientBalance(_) | Error::BalanceOverflow(_) => ErrorCategory::Balance,
            Error::FeeExceedsBalance(_) => ErrorCategory::Fee,
            Error::Connection(_) => ErrorCategory::Network,
            Error::AttestationVerificationFailed(_) => ErrorCategory::Security,
            Error::Config(_) => ErrorCategory::Config,
            Error::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

impl From<SelectionError> for Error {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::InvalidAmount(reason) => Error::InvalidInput(reason),
            SelectionError::InsufficientBalance(reason) => Error::InsufficientBalance(reason),
            SelectionError::BalanceOverflow(reason) => Error::BalanceOverflow(reason),
            SelectionError::FeeExceedsBalance(reason) => Error::FeeExceedsBalance(reason),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request validation errors
    Input,
    /// Balance-related errors
    Balance,
    /// Fee-related errors
    Fee,
    /// Network-related errors
    Network,
    /// Attestation and key verification errors
    Security,
    /// Configuration errors
    Config,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "Input"),
            ErrorCategory::Balance => write!(f, "Balance"),
            ErrorCategory::Fee => write!(f, "Fee"),
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Security => write!(f, "Security"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_detection() {
        assert!(Error::InsufficientBalance("test".to_string()).is_user_error());
        assert!(Error::InvalidInput("test".to_string()).is_user_error());
        assert!(!Error::BalanceOverflow("test".to_string()).is_user_error());
        assert!(!Error::AttestationVerificationFailed("test".to_string()).is_user_error());
    }

    #[test]
    fn test_attestation_failure_not_retryable() {
        assert!(!Error::AttestationVerificationFailed("bad report".to_string()).is_retryable());
        assert!(Error::Connection(ConnectionError::Timeout).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let msg = Error::InsufficientBalance("details".to_string()).user_message();
        assert!(msg.contains("don't have enough funds"));

        let msg = Error::FeeExceedsBalance("details".to_string()).user_message();
        assert!(msg.contains("network fee"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::InsufficientBalance("test".to_string()).category(),
            ErrorCategory::Balance
        );
        assert_eq!(
            Error::FeeExceedsBalance("test".to_string()).category(),
            ErrorCategory::Fee
        );
        assert_eq!(
            Error::Connection(ConnectionError::Timeout).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            Error::AttestationVerificationFailed("test".to_string()).category(),
            ErrorCategory::Security
        );
    }

    #[test]
    fn test_selection_error_conversion() {
        let err: Error = SelectionError::FeeExceedsBalance("fee".to_string()).into();
        assert!(matches!(err, Error::FeeExceedsBalance(_)));

        let err: Error = SelectionError::InvalidAmount("zero".to_string()).into();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Balance.to_string(), "Balance");
        assert_eq!(ErrorCategory::Security.to_string(), "Security");
    }
}
