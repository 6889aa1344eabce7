use super::ApiError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use types::{
    Attestation, AttestationData, BlockProposal, ChainSpec, CommitteeIndex, Epoch, Graffiti,
    Hash256, PublicKeyBytes, SignatureBytes, SignedAggregateAndProof, SignedBeaconBlock,
    SignedBlindedBeaconBlock, SignedContributionAndProof, Slot, SyncCommitteeContribution,
    SyncCommitteeMessage, ValidatorIndex,
};

/// One validator's attestation assignment for a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttesterDuty {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "types::serde_quoted")]
    pub validator_index: ValidatorIndex,
    #[serde(with = "types::serde_quoted")]
    pub committee_index: CommitteeIndex,
    #[serde(with = "types::serde_quoted")]
    pub committee_length: u64,
    #[serde(with = "types::serde_quoted")]
    pub committees_at_slot: u64,
    /// The validator's position within its committee.
    #[serde(with = "types::serde_quoted")]
    pub validator_committee_index: u64,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposerDuty {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "types::serde_quoted")]
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
}

/// A validator's sync-committee membership for a sync period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDuty {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "types::serde_quoted")]
    pub validator_index: ValidatorIndex,
    pub validator_sync_committee_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderInfo {
    pub root: Hash256,
    pub slot: Slot,
    pub parent_root: Hash256,
}

// Server-sent event payloads, as the standard `eth/v1/events` stream emits
// them.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadEvent {
    pub slot: Slot,
    pub block: Hash256,
    pub state: Hash256,
    #[serde(default)]
    pub epoch_transition: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReorgEvent {
    pub slot: Slot,
    #[serde(with = "types::serde_quoted")]
    pub depth: u64,
    pub old_head_block: Hash256,
    pub new_head_block: Hash256,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedCheckpointEvent {
    pub block: Hash256,
    pub state: Hash256,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Head(HeadEvent),
    ChainReorg(ChainReorgEvent),
    FinalizedCheckpoint(FinalizedCheckpointEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    Head,
    ChainReorg,
    FinalizedCheckpoint,
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EventTopic::Head => write!(f, "head"),
            EventTopic::ChainReorg => write!(f, "chain_reorg"),
            EventTopic::FinalizedCheckpoint => write!(f, "finalized_checkpoint"),
        }
    }
}

pub type EventStream = BoxStream<'static, EventKind>;

/// The beacon-node operations this client consumes.
///
/// Returned blocks are fork-versioned; implementations surface unknown forks
/// as `BlockProposal::Unsupported` rather than failing, so that a newer node
/// in the pool degrades gracefully.
#[async_trait]
pub trait BeaconNodeApi: Send + Sync {
    async fn spec(&self) -> Result<ChainSpec, ApiError>;

    /// Seconds from the UNIX epoch to chain genesis.
    async fn genesis_time(&self) -> Result<Duration, ApiError>;

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<AttestationData, ApiError>;

    async fn produce_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError>;

    async fn produce_blinded_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError>;

    async fn submit_attestations(&self, attestations: &[Attestation]) -> Result<(), ApiError>;

    async fn submit_block(&self, block: &SignedBeaconBlock) -> Result<(), ApiError>;

    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<(), ApiError>;

    /// Header summary of the block with the given root, if the node knows it.
    async fn block_header_by_root(
        &self,
        root: Hash256,
    ) -> Result<Option<BlockHeaderInfo>, ApiError>;

    /// Header summary of the canonical block at `slot`, if any.
    async fn block_header_at_slot(
        &self,
        slot: Slot,
    ) -> Result<Option<BlockHeaderInfo>, ApiError>;

    /// The full signed block with the given root, if the node knows it.
    async fn signed_beacon_block(
        &self,
        root: Hash256,
    ) -> Result<Option<SignedBeaconBlock>, ApiError>;

    async fn attester_duties(
        &self,
        epoch: Epoch,
        indices: &[ValidatorIndex],
    ) -> Result<Vec<AttesterDuty>, ApiError>;

    async fn proposer_duties(&self, epoch: Epoch) -> Result<Vec<ProposerDuty>, ApiError>;

    async fn sync_duties(
        &self,
        epoch: Epoch,
        indices: &[ValidatorIndex],
    ) -> Result<Vec<SyncDuty>, ApiError>;

    /// Resolve pubkeys to validator indices, omitting unknown validators.
    async fn validator_indices(
        &self,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<HashMap<PublicKeyBytes, ValidatorIndex>, ApiError>;

    /// The best aggregate the node has seen for the given attestation data.
    async fn aggregate_attestation(
        &self,
        slot: Slot,
        data: &AttestationData,
    ) -> Result<Option<Attestation>, ApiError>;

    async fn submit_aggregate_and_proofs(
        &self,
        aggregates: &[SignedAggregateAndProof],
    ) -> Result<(), ApiError>;

    async fn submit_sync_committee_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> Result<(), ApiError>;

    async fn sync_committee_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, ApiError>;

    async fn submit_contribution_and_proofs(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), ApiError>;

    /// Subscribe to the node's event stream. The stream ends when the node
    /// closes it; the caller is responsible for re-subscribing.
    async fn subscribe_events(&self, topics: &[EventTopic]) -> Result<EventStream, ApiError>;
}
