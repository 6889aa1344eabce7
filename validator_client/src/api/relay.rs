use super::ApiError;
use async_trait::async_trait;
use types::{
    ExecutionPayload, Hash256, PublicKeyBytes, SignedBlindedBeaconBlock,
    SignedValidatorRegistration, SignedBuilderBid, Slot,
};

/// The builder-relay operations this client consumes.
///
/// Relays are best-effort: a failure never blocks a duty, and one accepted
/// submission is enough.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> Result<(), ApiError>;

    /// The relay's current bid for the next block, or `None` if it has no
    /// payload to offer.
    async fn get_header(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
    ) -> Result<Option<SignedBuilderBid>, ApiError>;

    /// Reveal the payload behind a signed blinded block.
    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<ExecutionPayload, ApiError>;
}
