use crate::{
    Attestation, ExecutionPayload, Graffiti, Hash256, KzgCommitment, ForkName, SignatureBytes,
    Slot, SyncAggregate, ValidatorIndex,
};
use serde::{Deserialize, Serialize};

/// A fork-versioned beacon block carrying a full execution payload.
///
/// Exactly one variant is populated; there are no nullable sibling branches.
/// Accessors pattern-match so callers never need to know the fork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", content = "data", rename_all = "lowercase")]
pub enum BeaconBlock {
    #[serde(rename = "phase0")]
    Base(BeaconBlockBase),
    Altair(BeaconBlockAltair),
    Bellatrix(BeaconBlockBellatrix),
    Capella(BeaconBlockCapella),
    Deneb(BeaconBlockDeneb),
}

macro_rules! block_struct {
    ($name:ident, $body:ident) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub slot: Slot,
            #[serde(with = "crate::serde_quoted")]
            pub proposer_index: ValidatorIndex,
            pub parent_root: Hash256,
            pub state_root: Hash256,
            pub body: $body,
        }
    };
}

block_struct!(BeaconBlockBase, BeaconBlockBodyBase);
block_struct!(BeaconBlockAltair, BeaconBlockBodyAltair);
block_struct!(BeaconBlockBellatrix, BeaconBlockBodyBellatrix);
block_struct!(BeaconBlockCapella, BeaconBlockBodyCapella);
block_struct!(BeaconBlockDeneb, BeaconBlockBodyDeneb);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconBlockBodyBase {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconBlockBodyAltair {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconBlockBodyBellatrix {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload: ExecutionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconBlockBodyCapella {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload: ExecutionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconBlockBodyDeneb {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload: ExecutionPayload,
    pub blob_kzg_commitments: Vec<KzgCommitment>,
}

macro_rules! map_block {
    ($self:expr, $block:ident => $expr:expr) => {
        match $self {
            BeaconBlock::Base($block) => $expr,
            BeaconBlock::Altair($block) => $expr,
            BeaconBlock::Bellatrix($block) => $expr,
            BeaconBlock::Capella($block) => $expr,
            BeaconBlock::Deneb($block) => $expr,
        }
    };
}

impl BeaconBlock {
    pub fn fork_name(&self) -> ForkName {
        match self {
            BeaconBlock::Base(_) => ForkName::Base,
            BeaconBlock::Altair(_) => ForkName::Altair,
            BeaconBlock::Bellatrix(_) => ForkName::Bellatrix,
            BeaconBlock::Capella(_) => ForkName::Capella,
            BeaconBlock::Deneb(_) => ForkName::Deneb,
        }
    }

    pub fn slot(&self) -> Slot {
        map_block!(self, block => block.slot)
    }

    pub fn proposer_index(&self) -> ValidatorIndex {
        map_block!(self, block => block.proposer_index)
    }

    pub fn parent_root(&self) -> Hash256 {
        map_block!(self, block => block.parent_root)
    }

    pub fn state_root(&self) -> Hash256 {
        map_block!(self, block => block.state_root)
    }

    pub fn attestations(&self) -> &[Attestation] {
        map_block!(self, block => &block.body.attestations)
    }

    pub fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        match self {
            BeaconBlock::Base(_) => None,
            BeaconBlock::Altair(block) => Some(&block.body.sync_aggregate),
            BeaconBlock::Bellatrix(block) => Some(&block.body.sync_aggregate),
            BeaconBlock::Capella(block) => Some(&block.body.sync_aggregate),
            BeaconBlock::Deneb(block) => Some(&block.body.sync_aggregate),
        }
    }

    pub fn execution_payload(&self) -> Option<&ExecutionPayload> {
        match self {
            BeaconBlock::Base(_) | BeaconBlock::Altair(_) => None,
            BeaconBlock::Bellatrix(block) => Some(&block.body.execution_payload),
            BeaconBlock::Capella(block) => Some(&block.body.execution_payload),
            BeaconBlock::Deneb(block) => Some(&block.body.execution_payload),
        }
    }
}
