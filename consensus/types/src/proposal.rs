use crate::{
    Attestation, BeaconBlock, BlindedBeaconBlock, ForkName, Hash256, SignatureBytes, Slot,
    SyncAggregate,
};
use serde::{Deserialize, Serialize};

/// A candidate block returned by a block-production endpoint.
///
/// `Unsupported` carries the version string of a fork this client does not
/// know; such candidates are never selected (they score zero) but their
/// presence is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockProposal {
    Full(BeaconBlock),
    Blinded(BlindedBeaconBlock),
    Unsupported { version: String },
}

impl BlockProposal {
    pub fn fork_name(&self) -> Option<ForkName> {
        match self {
            BlockProposal::Full(block) => Some(block.fork_name()),
            BlockProposal::Blinded(block) => Some(block.fork_name()),
            BlockProposal::Unsupported { .. } => None,
        }
    }

    pub fn slot(&self) -> Option<Slot> {
        match self {
            BlockProposal::Full(block) => Some(block.slot()),
            BlockProposal::Blinded(block) => Some(block.slot()),
            BlockProposal::Unsupported { .. } => None,
        }
    }

    pub fn parent_root(&self) -> Option<Hash256> {
        match self {
            BlockProposal::Full(block) => Some(block.parent_root()),
            BlockProposal::Blinded(block) => Some(block.parent_root()),
            BlockProposal::Unsupported { .. } => None,
        }
    }

    pub fn attestations(&self) -> &[Attestation] {
        match self {
            BlockProposal::Full(block) => block.attestations(),
            BlockProposal::Blinded(block) => block.attestations(),
            BlockProposal::Unsupported { .. } => &[],
        }
    }

    pub fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        match self {
            BlockProposal::Full(block) => block.sync_aggregate(),
            BlockProposal::Blinded(block) => Some(block.sync_aggregate()),
            BlockProposal::Unsupported { .. } => None,
        }
    }

    pub fn is_blinded(&self) -> bool {
        matches!(self, BlockProposal::Blinded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlindedBeaconBlock {
    pub message: BlindedBeaconBlock,
    pub signature: SignatureBytes,
}
