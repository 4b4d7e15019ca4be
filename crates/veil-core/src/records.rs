//! Unspent value records and prepared transaction inputs

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, TokenId};
use crate::keys::RistrettoPublic;
use crate::Result;

/// Serialized ledger output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutBytes(#[serde(with = "hex")] pub Vec<u8>);

/// Proof that an output is part of the ledger at some state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipProof(#[serde(with = "hex")] pub Vec<u8>);

/// Key image marking an output as spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyImage(#[serde(with = "hex")] pub [u8; 32]);

/// Unspent output owned by the account
///
/// Records are immutable once observed; the engine only reads snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownTxOut {
    /// Value in the token's smallest unit
    pub value: u64,
    /// Token
    pub token_id: TokenId,
    /// Global ledger index
    pub global_index: u64,
    /// Subaddress the output was received on
    pub subaddress_index: u64,
    /// One-time public key
    pub public_key: RistrettoPublic,
    /// Key image
    pub key_image: KeyImage,
    /// Serialized output
    pub tx_out: TxOutBytes,
}

impl KnownTxOut {
    /// Value and token
    pub fn amount(&self) -> Amount {
        Amount::new(self.value, self.token_id)
    }
}

/// One member of an input ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingMember {
    /// Serialized output
    pub tx_out: TxOutBytes,
    /// Membership proof for the output
    pub membership_proof: MembershipProof,
}

/// Input ready for the signing backend: the real output hidden among decoys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTxInput {
    /// The output actually being spent
    pub known_tx_out: KnownTxOut,
    /// Ring members, the real output included
    pub ring: Vec<RingMember>,
    /// Position of the real output within `ring`
    pub real_input_index: usize,
}

impl PreparedTxInput {
    /// Value of the real output
    pub fn value(&self) -> u64 {
        self.known_tx_out.value
    }
}

/// Parse a JSON array of records
pub fn records_from_json(json: &str) -> Result<Vec<KnownTxOut>> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_json() {
        let json = format!(
            r#"[{{
                "value": 1000,
                "token_id": 0,
                "global_index": 42,
                "subaddress_index": 0,
                "public_key": "{key}",
                "key_image": "{key}",
                "tx_out": "0a0b"
            }}]"#,
            key = "11".repeat(32)
        );

        let records = records_from_json(&json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount(), Amount::new(1000, TokenId::MOB));
        assert_eq!(records[0].global_index, 42);
        assert_eq!(records[0].tx_out.0, vec![0x0a, 0x0b]);
    }

    #[test]
    fn test_records_from_json_rejects_bad_hex() {
        let json = r#"[{ "value": 1, "token_id": 0, "global_index": 0, "subaddress_index": 0,
            "public_key": "zz", "key_image": "zz", "tx_out": "" }]"#;
        assert!(records_from_json(json).is_err());
    }
}
