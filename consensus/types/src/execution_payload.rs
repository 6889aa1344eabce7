use crate::{serde_hex, Address, Hash256, Uint256};
use serde::{Deserialize, Serialize};

/// An execution-layer payload, shallow form.
///
/// The validator client never executes or validates payloads; only the fields
/// it logs or forwards are modelled, with the transactions carried opaquely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub parent_hash: Hash256,
    pub fee_recipient: Address,
    pub state_root: Hash256,
    #[serde(with = "crate::serde_quoted")]
    pub block_number: u64,
    #[serde(with = "crate::serde_quoted")]
    pub gas_limit: u64,
    #[serde(with = "crate::serde_quoted")]
    pub gas_used: u64,
    #[serde(with = "crate::serde_quoted")]
    pub timestamp: u64,
    #[serde(with = "crate::serde_wei")]
    pub base_fee_per_gas: Uint256,
    pub block_hash: Hash256,
    #[serde(with = "transactions_hex")]
    pub transactions: Vec<Vec<u8>>,
}

/// The header form of a payload, as carried by blinded blocks and builder
/// bids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: Hash256,
    pub fee_recipient: Address,
    pub state_root: Hash256,
    #[serde(with = "crate::serde_quoted")]
    pub block_number: u64,
    #[serde(with = "crate::serde_quoted")]
    pub gas_limit: u64,
    #[serde(with = "crate::serde_quoted")]
    pub gas_used: u64,
    #[serde(with = "crate::serde_quoted")]
    pub timestamp: u64,
    #[serde(with = "crate::serde_wei")]
    pub base_fee_per_gas: Uint256,
    pub block_hash: Hash256,
    pub transactions_root: Hash256,
}

mod transactions_hex {
    use super::*;
    use serde::de::Error;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        transactions: &[Vec<u8>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = transactions.iter().map(serde_hex::encode).collect();
        serde::Serialize::serialize(&encoded, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded: Vec<String> = serde::Deserialize::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|tx| serde_hex::decode(tx).map_err(D::Error::custom))
            .collect()
    }
}
