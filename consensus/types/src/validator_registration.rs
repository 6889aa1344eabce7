use crate::{Address, PublicKeyBytes, SignatureBytes};
use serde::{Deserialize, Serialize};

/// A validator's registration with the builder network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRegistration {
    pub fee_recipient: Address,
    #[serde(with = "crate::serde_quoted")]
    pub gas_limit: u64,
    /// Seconds since the UNIX epoch at which the registration was produced.
    #[serde(with = "crate::serde_quoted")]
    pub timestamp: u64,
    pub pubkey: PublicKeyBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedValidatorRegistration {
    pub message: ValidatorRegistration,
    pub signature: SignatureBytes,
}
