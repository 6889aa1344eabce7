use async_trait::async_trait;
use std::fmt;
use types::{
    AttestationData, BlockProposal, ContributionAndProof, AggregateAndProof, Epoch, Hash256,
    PublicKeyBytes, SignatureBytes, Slot, ValidatorRegistration,
};

/// Why the signer did not produce a signature.
///
/// The signer is the sole authority on slashing protection. A refusal is
/// terminal for the duty; `already_signed` marks the idempotent case where the
/// validator has produced this message before and the duty can be recorded as
/// done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    Refused { already_signed: bool },
    Unavailable(String),
    Failed(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignerError::Refused { already_signed } => {
                write!(f, "signer refused (already signed: {already_signed})")
            }
            SignerError::Unavailable(msg) => write!(f, "signer unavailable: {msg}"),
            SignerError::Failed(msg) => write!(f, "signing failed: {msg}"),
        }
    }
}

impl std::error::Error for SignerError {}

/// Per-validator result of a batch signing call.
#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    Signature(SignatureBytes),
    Refused { already_signed: bool },
    Failed(String),
}

/// The signing operations this client consumes.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign the same attestation data for a batch of validators. The result
    /// is aligned with `pubkeys`; individual refusals do not fail the batch.
    async fn sign_attestations(
        &self,
        data: &AttestationData,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<Vec<SignOutcome>, SignerError>;

    async fn sign_block(
        &self,
        pubkey: PublicKeyBytes,
        block: &BlockProposal,
    ) -> Result<SignatureBytes, SignerError>;

    async fn sign_randao_reveal(
        &self,
        pubkey: PublicKeyBytes,
        epoch: Epoch,
    ) -> Result<SignatureBytes, SignerError>;

    async fn sign_sync_committee_message(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
        beacon_block_root: Hash256,
    ) -> Result<SignatureBytes, SignerError>;

    async fn sign_contribution_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        message: &ContributionAndProof,
    ) -> Result<SignatureBytes, SignerError>;

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        message: &AggregateAndProof,
    ) -> Result<SignatureBytes, SignerError>;

    /// Selection proof for attestation aggregation.
    async fn sign_slot(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
    ) -> Result<SignatureBytes, SignerError>;

    /// Selection proof for sync-committee aggregation.
    async fn sign_sync_selection(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
        subcommittee_index: u64,
    ) -> Result<SignatureBytes, SignerError>;

    async fn sign_validator_registration(
        &self,
        pubkey: PublicKeyBytes,
        registration: &ValidatorRegistration,
    ) -> Result<SignatureBytes, SignerError>;
}
