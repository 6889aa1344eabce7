use crate::{Bitlist, Hash256, SignatureBytes, Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};

/// The aggregated sync-committee signature carried in a block body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAggregate {
    pub sync_committee_bits: Bitlist,
    pub sync_committee_signature: SignatureBytes,
}

impl SyncAggregate {
    pub fn empty(sync_committee_size: u64) -> Self {
        Self {
            sync_committee_bits: Bitlist::with_len(sync_committee_size as usize),
            sync_committee_signature: SignatureBytes::empty(),
        }
    }
}

/// One validator's vote for the head block root at a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommitteeMessage {
    pub slot: Slot,
    pub beacon_block_root: Hash256,
    #[serde(with = "crate::serde_quoted")]
    pub validator_index: ValidatorIndex,
    pub signature: SignatureBytes,
}

/// An aggregate of sync-committee messages over one subcommittee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommitteeContribution {
    pub slot: Slot,
    pub beacon_block_root: Hash256,
    #[serde(with = "crate::serde_quoted")]
    pub subcommittee_index: u64,
    pub aggregation_bits: Bitlist,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionAndProof {
    #[serde(with = "crate::serde_quoted")]
    pub aggregator_index: ValidatorIndex,
    pub contribution: SyncCommitteeContribution,
    pub selection_proof: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedContributionAndProof {
    pub message: ContributionAndProof,
    pub signature: SignatureBytes,
}
