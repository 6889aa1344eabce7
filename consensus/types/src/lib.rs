//! Consensus-layer data model for the Vigil validator client.
//!
//! These types cover the subset of the Ethereum consensus specification that a
//! validator client observes: attestations, sync-committee messages,
//! fork-versioned (blinded) beacon blocks and builder bids. They are plain
//! data carriers; no state-transition or hashing logic lives here.

mod aggregate_and_proof;
mod attestation;
mod attestation_data;
mod beacon_block;
mod bitfield;
mod blinded_beacon_block;
mod bls;
mod builder_bid;
mod chain_spec;
mod checkpoint;
mod execution_payload;
mod fork_name;
mod graffiti;
mod proposal;
pub mod serde_hex;
pub mod serde_quoted;
pub mod serde_wei;
mod slot_epoch;
mod sync_committee;
mod validator_registration;

pub use crate::aggregate_and_proof::{AggregateAndProof, SignedAggregateAndProof};
pub use crate::attestation::Attestation;
pub use crate::attestation_data::AttestationData;
pub use crate::beacon_block::{
    BeaconBlock, BeaconBlockAltair, BeaconBlockBase, BeaconBlockBellatrix, BeaconBlockBodyAltair,
    BeaconBlockBodyBase, BeaconBlockBodyBellatrix, BeaconBlockBodyCapella, BeaconBlockBodyDeneb,
    BeaconBlockCapella, BeaconBlockDeneb,
};
pub use crate::bitfield::Bitlist;
pub use crate::blinded_beacon_block::{
    BlindedBeaconBlock, BlindedBeaconBlockBellatrix, BlindedBeaconBlockBodyBellatrix,
    BlindedBeaconBlockBodyCapella, BlindedBeaconBlockBodyDeneb, BlindedBeaconBlockCapella,
    BlindedBeaconBlockDeneb,
};
pub use crate::bls::{KzgCommitment, PublicKeyBytes, SignatureBytes};
pub use crate::builder_bid::{BuilderBid, SignedBuilderBid};
pub use crate::chain_spec::ChainSpec;
pub use crate::checkpoint::Checkpoint;
pub use crate::execution_payload::{ExecutionPayload, ExecutionPayloadHeader};
pub use crate::fork_name::ForkName;
pub use crate::graffiti::Graffiti;
pub use crate::proposal::{BlockProposal, SignedBeaconBlock, SignedBlindedBeaconBlock};
pub use crate::slot_epoch::{Epoch, Slot, SlotIter};
pub use crate::sync_committee::{
    ContributionAndProof, SignedContributionAndProof, SyncAggregate, SyncCommitteeContribution,
    SyncCommitteeMessage,
};
pub use crate::validator_registration::{SignedValidatorRegistration, ValidatorRegistration};

/// A 32-byte root (block root, state root, checkpoint root).
pub type Hash256 = ethereum_types::H256;

/// A 256-bit unsigned integer, used for builder bid values in wei.
pub type Uint256 = ethereum_types::U256;

/// A 20-byte execution-layer address.
pub type Address = ethereum_types::H160;

pub type CommitteeIndex = u64;
pub type ValidatorIndex = u64;
