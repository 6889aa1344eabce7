use crate::{ExecutionPayloadHeader, PublicKeyBytes, SignatureBytes, Uint256};
use serde::{Deserialize, Serialize};

/// A builder's commitment to an execution payload, with its claimed value.
///
/// `value` is in wei. A relay is free to return a different value on a
/// re-query; nothing here may assume monotonicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderBid {
    pub header: ExecutionPayloadHeader,
    #[serde(with = "crate::serde_wei")]
    pub value: Uint256,
    pub pubkey: PublicKeyBytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBuilderBid {
    pub message: BuilderBid,
    pub signature: SignatureBytes,
}
