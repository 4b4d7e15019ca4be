//! Account key material consumed by the transaction builder
//!
//! Key derivation lives outside this crate. An [`AccountKey`] is handed the
//! already-derived subaddress spend keys and only answers lookups by index.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Subaddress that receives ordinary payments
pub const DEFAULT_SUBADDRESS_INDEX: u64 = 0;

/// Reserved subaddress that receives change outputs
pub const CHANGE_SUBADDRESS_INDEX: u64 = u64::MAX - 1;

/// Private scalar, wiped on drop
#[derive(Clone)]
pub struct RistrettoPrivate(Zeroizing<[u8; 32]>);

impl RistrettoPrivate {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RistrettoPrivate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RistrettoPrivate(<redacted>)")
    }
}

/// Compressed public point
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RistrettoPublic(#[serde(with = "hex")] [u8; 32]);

impl RistrettoPublic {
    /// Wrap raw point bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw point bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RistrettoPublic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RistrettoPublic({})", hex::encode(self.0))
    }
}

/// Fog service a recipient's outputs are reported to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FogInfo {
    /// Report server URL
    pub report_url: String,
    /// Report id within the server's response
    pub report_id: String,
}

/// Recipient address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicAddress {
    /// Public view key
    pub view_public_key: RistrettoPublic,
    /// Public spend key
    pub spend_public_key: RistrettoPublic,
    /// Fog reporting details, if the recipient uses fog
    pub fog_info: Option<FogInfo>,
}

impl PublicAddress {
    /// Create address without fog
    pub fn new(view_public_key: RistrettoPublic, spend_public_key: RistrettoPublic) -> Self {
        Self {
            view_public_key,
            spend_public_key,
            fog_info: None,
        }
    }

    /// Attach fog reporting details
    pub fn with_fog(mut self, fog_info: FogInfo) -> Self {
        self.fog_info = Some(fog_info);
        self
    }
}

/// Spending account
pub struct AccountKey {
    view_private_key: RistrettoPrivate,
    spend_private_key: RistrettoPrivate,
    subaddress_spend_keys: Vec<RistrettoPrivate>,
    change_spend_key: Option<RistrettoPrivate>,
    fog_info: Option<FogInfo>,
}

impl AccountKey {
    /// Create account from root keys and derived subaddress spend keys
    ///
    /// `subaddress_spend_keys[i]` is the spend key of subaddress `i`.
    pub fn new(
        view_private_key: RistrettoPrivate,
        spend_private_key: RistrettoPrivate,
        subaddress_spend_keys: Vec<RistrettoPrivate>,
    ) -> Self {
        Self {
            view_private_key,
            spend_private_key,
            subaddress_spend_keys,
            change_spend_key: None,
            fog_info: None,
        }
    }

    /// Attach the spend key of the reserved change subaddress
    pub fn with_change_spend_key(mut self, key: RistrettoPrivate) -> Self {
        self.change_spend_key = Some(key);
        self
    }

    /// Attach fog reporting details for this account's own outputs
    pub fn with_fog(mut self, fog_info: FogInfo) -> Self {
        self.fog_info = Some(fog_info);
        self
    }

    /// Private view key
    pub fn view_private_key(&self) -> &RistrettoPrivate {
        &self.view_private_key
    }

    /// Root private spend key
    pub fn spend_private_key(&self) -> &RistrettoPrivate {
        &self.spend_private_key
    }

    /// Fog details
    pub fn fog_info(&self) -> Option<&FogInfo> {
        self.fog_info.as_ref()
    }

    /// Spend key for a subaddress, `None` when the index is out of range
    pub fn subaddress_spend_private_key(&self, index: u64) -> Option<&RistrettoPrivate> {
        if index == CHANGE_SUBADDRESS_INDEX {
            return self.change_spend_key.as_ref();
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.subaddress_spend_keys.get(i))
    }

    /// Number of ordinary subaddresses with known spend keys
    pub fn subaddress_count(&self) -> usize {
        self.subaddress_spend_keys.len()
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("subaddress_count", &self.subaddress_spend_keys.len())
            .field("has_change_key", &self.change_spend_key.is_some())
            .field("fog_info", &self.fog_info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> RistrettoPrivate {
        RistrettoPrivate::from_bytes([byte; 32])
    }

    #[test]
    fn test_subaddress_lookup() {
        let account = AccountKey::new(key(1), key(2), vec![key(10), key(11)]);

        assert_eq!(account.subaddress_spend_private_key(1).unwrap().as_bytes(), &[11; 32]);
        assert!(account.subaddress_spend_private_key(2).is_none());
        assert!(account.subaddress_spend_private_key(CHANGE_SUBADDRESS_INDEX).is_none());
    }

    #[test]
    fn test_change_subaddress_lookup() {
        let account = AccountKey::new(key(1), key(2), vec![key(10)]).with_change_spend_key(key(99));

        assert_eq!(
            account.subaddress_spend_private_key(CHANGE_SUBADDRESS_INDEX).unwrap().as_bytes(),
            &[99; 32]
        );
    }

    #[test]
    fn test_debug_redacts_private_keys() {
        let account = AccountKey::new(key(7), key(8), vec![key(9)]);
        let rendered = format!("{:?} {:?}", account, key(7));

        assert!(!rendered.contains("07"));
        assert!(rendered.contains("<redacted>"));
    }
}
