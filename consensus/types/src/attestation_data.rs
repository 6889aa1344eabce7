use crate::{Checkpoint, CommitteeIndex, Hash256, Slot};
use serde::{Deserialize, Serialize};

/// The data upon which an attestation is based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AttestationData {
    pub slot: Slot,
    #[serde(with = "crate::serde_quoted")]
    pub index: CommitteeIndex,

    // LMD GHOST vote
    pub beacon_block_root: Hash256,

    // FFG vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}
