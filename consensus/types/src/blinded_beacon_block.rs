use crate::{
    Attestation, ExecutionPayloadHeader, ForkName, Graffiti, Hash256, KzgCommitment,
    SignatureBytes, Slot, SyncAggregate, ValidatorIndex,
};
use serde::{Deserialize, Serialize};

/// A fork-versioned blinded beacon block: the execution payload is replaced by
/// its header, to be unblinded by the originating builder after signing.
///
/// Blinded blocks exist from Bellatrix onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", content = "data", rename_all = "lowercase")]
pub enum BlindedBeaconBlock {
    Bellatrix(BlindedBeaconBlockBellatrix),
    Capella(BlindedBeaconBlockCapella),
    Deneb(BlindedBeaconBlockDeneb),
}

macro_rules! blinded_block_struct {
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

blinded_block_struct!(BlindedBeaconBlockBellatrix, BlindedBeaconBlockBodyBellatrix);
blinded_block_struct!(BlindedBeaconBlockCapella, BlindedBeaconBlockBodyCapella);
blinded_block_struct!(BlindedBeaconBlockDeneb, BlindedBeaconBlockBodyDeneb);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBeaconBlockBodyBellatrix {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload_header: ExecutionPayloadHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBeaconBlockBodyCapella {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload_header: ExecutionPayloadHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBeaconBlockBodyDeneb {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub attestations: Vec<Attestation>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload_header: ExecutionPayloadHeader,
    pub blob_kzg_commitments: Vec<KzgCommitment>,
}

macro_rules! map_blinded_block {
    ($self:expr, $block:ident => $expr:expr) => {
        match $self {
            BlindedBeaconBlock::Bellatrix($block) => $expr,
            BlindedBeaconBlock::Capella($block) => $expr,
            BlindedBeaconBlock::Deneb($block) => $expr,
        }
    };
}

impl BlindedBeaconBlock {
    pub fn fork_name(&self) -> ForkName {
        match self {
            BlindedBeaconBlock::Bellatrix(_) => ForkName::Bellatrix,
            BlindedBeaconBlock::Capella(_) => ForkName::Capella,
            BlindedBeaconBlock::Deneb(_) => ForkName::Deneb,
        }
    }

    pub fn slot(&self) -> Slot {
        map_blinded_block!(self, block => block.slot)
    }

    pub fn proposer_index(&self) -> ValidatorIndex {
        map_blinded_block!(self, block => block.proposer_index)
    }

    pub fn parent_root(&self) -> Hash256 {
        map_blinded_block!(self, block => block.parent_root)
    }

    pub fn state_root(&self) -> Hash256 {
        map_blinded_block!(self, block => block.state_root)
    }

    pub fn attestations(&self) -> &[Attestation] {
        map_blinded_block!(self, block => &block.body.attestations)
    }

    pub fn sync_aggregate(&self) -> &SyncAggregate {
        map_blinded_block!(self, block => &block.body.sync_aggregate)
    }

    pub fn execution_payload_header(&self) -> &ExecutionPayloadHeader {
        map_blinded_block!(self, block => &block.body.execution_payload_header)
    }

    /// Replace the payload header, preserving every consensus field.
    ///
    /// Used to graft a builder bid's header onto a locally obtained blinded
    /// block when the bid outranks the payload the beacon node supplied.
    pub fn with_payload_header(mut self, header: ExecutionPayloadHeader) -> Self {
        map_blinded_block!(&mut self, block => block.body.execution_payload_header = header);
        self
    }
}
