use crate::{Epoch, ForkName, Slot};
use serde::{Deserialize, Serialize};

/// The chain parameters the validator client consumes.
///
/// Populated from the beacon node's `spec` endpoint at startup; the weight
/// constants default to the Altair participation weights and are carried here
/// so scoring tests are reproducible against a fixed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    pub sync_committee_size: u64,
    pub sync_committee_subnet_count: u64,
    pub target_aggregators_per_committee: u64,
    pub target_aggregators_per_sync_subcommittee: u64,

    // Participation reward weights (Altair).
    pub timely_source_weight: u64,
    pub timely_target_weight: u64,
    pub timely_head_weight: u64,
    pub sync_reward_weight: u64,
    pub weight_denominator: u64,

    pub altair_fork_epoch: Option<Epoch>,
    pub bellatrix_fork_epoch: Option<Epoch>,
    pub capella_fork_epoch: Option<Epoch>,
    pub deneb_fork_epoch: Option<Epoch>,
}

impl ChainSpec {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            sync_committee_size: 512,
            sync_committee_subnet_count: 4,
            target_aggregators_per_committee: 16,
            target_aggregators_per_sync_subcommittee: 16,
            timely_source_weight: 14,
            timely_target_weight: 26,
            timely_head_weight: 14,
            sync_reward_weight: 2,
            weight_denominator: 64,
            altair_fork_epoch: Some(Epoch::new(74240)),
            bellatrix_fork_epoch: Some(Epoch::new(144896)),
            capella_fork_epoch: Some(Epoch::new(194048)),
            deneb_fork_epoch: Some(Epoch::new(269568)),
        }
    }

    /// The fork in effect at `slot`.
    pub fn fork_name_at_slot(&self, slot: Slot) -> ForkName {
        self.fork_name_at_epoch(slot.epoch(self.slots_per_epoch))
    }

    pub fn fork_name_at_epoch(&self, epoch: Epoch) -> ForkName {
        let active = |fork_epoch: Option<Epoch>| fork_epoch.map_or(false, |at| epoch >= at);
        if active(self.deneb_fork_epoch) {
            ForkName::Deneb
        } else if active(self.capella_fork_epoch) {
            ForkName::Capella
        } else if active(self.bellatrix_fork_epoch) {
            ForkName::Bellatrix
        } else if active(self.altair_fork_epoch) {
            ForkName::Altair
        } else {
            ForkName::Base
        }
    }

    /// `⌊√slots_per_epoch⌋`, the inclusion-distance bound for a timely source
    /// vote.
    pub fn timely_source_distance(&self) -> u64 {
        (self.slots_per_epoch as f64).sqrt() as u64
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}
