//! A rolling index of recent blocks' attestation bitlists, keyed by block
//! root.
//!
//! The proposal scorer walks this index from a candidate's parent root to
//! discount votes a prior ancestor block already included. Entries are
//! inserted by the controller when a block is observed and evicted once they
//! fall outside the scoring window.

use std::collections::HashMap;
use types::{Attestation, Bitlist, CommitteeIndex, Hash256, Slot};

/// Votes older than this many slots can no longer earn rewards, so blocks
/// beyond the window are irrelevant to scoring.
pub const PRIOR_VOTES_WINDOW: u64 = 64;

/// The attestation content of one observed block.
#[derive(Debug, Clone, Default)]
pub struct BlockVotes {
    pub parent_root: Hash256,
    pub slot: Slot,
    /// Aggregation bits by the attested slot and committee.
    pub votes: HashMap<Slot, HashMap<CommitteeIndex, Bitlist>>,
}

#[derive(Default)]
pub struct PriorBlockVotes {
    entries: HashMap<Hash256, BlockVotes>,
}

impl PriorBlockVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block's attestations, evicting anything that has left the
    /// scoring window.
    pub fn observe_block(
        &mut self,
        root: Hash256,
        parent_root: Hash256,
        slot: Slot,
        attestations: &[Attestation],
    ) {
        let mut votes: HashMap<Slot, HashMap<CommitteeIndex, Bitlist>> = HashMap::new();
        for attestation in attestations {
            let bits = votes
                .entry(attestation.data.slot)
                .or_default()
                .entry(attestation.data.index)
                .or_insert_with(|| Bitlist::with_len(attestation.aggregation_bits.len()));
            bits.union_assign(&attestation.aggregation_bits);
        }

        self.entries.insert(
            root,
            BlockVotes {
                parent_root,
                slot,
                votes,
            },
        );

        let horizon = slot.saturating_sub(PRIOR_VOTES_WINDOW);
        self.entries.retain(|_, entry| entry.slot >= horizon);
    }

    pub fn get(&self, root: &Hash256) -> Option<&BlockVotes> {
        self.entries.get(root)
    }

    pub fn contains(&self, root: &Hash256) -> bool {
        self.entries.contains_key(root)
    }

    /// Drop entries for blocks older than `slot` (finalization pruning).
    pub fn prune_below(&mut self, slot: Slot) {
        self.entries.retain(|_, entry| entry.slot >= slot);
    }

    /// Drop entries for blocks strictly after `slot` (re-org eviction).
    pub fn remove_after(&mut self, slot: Slot) {
        self.entries.retain(|_, entry| entry.slot <= slot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, root: Hash256, entry: BlockVotes) {
        self.entries.insert(root, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{AttestationData, SignatureBytes};

    fn root(byte: u8) -> Hash256 {
        Hash256::repeat_byte(byte)
    }

    fn attestation(slot: u64, index: u64, bits: &[usize]) -> Attestation {
        let mut aggregation_bits = Bitlist::with_len(128);
        for bit in bits {
            aggregation_bits.set(*bit, true);
        }
        Attestation {
            aggregation_bits,
            data: AttestationData {
                slot: Slot::new(slot),
                index,
                ..AttestationData::default()
            },
            signature: SignatureBytes::empty(),
        }
    }

    #[test]
    fn merges_votes_per_committee() {
        let mut prior = PriorBlockVotes::new();
        prior.observe_block(
            root(1),
            root(0),
            Slot::new(100),
            &[
                attestation(99, 0, &[0, 1]),
                attestation(99, 0, &[1, 2]),
                attestation(99, 1, &[7]),
            ],
        );

        let entry = prior.get(&root(1)).unwrap();
        let committee_zero = &entry.votes[&Slot::new(99)][&0];
        assert_eq!(committee_zero.num_set_bits(), 3);
        let committee_one = &entry.votes[&Slot::new(99)][&1];
        assert!(committee_one.get(7));
    }

    #[test]
    fn window_eviction() {
        let mut prior = PriorBlockVotes::new();
        prior.observe_block(root(1), root(0), Slot::new(10), &[]);
        prior.observe_block(root(2), root(1), Slot::new(50), &[]);
        assert_eq!(prior.len(), 2);

        // A block beyond the window evicts the oldest entry.
        prior.observe_block(root(3), root(2), Slot::new(10 + PRIOR_VOTES_WINDOW + 1), &[]);
        assert!(!prior.contains(&root(1)));
        assert!(prior.contains(&root(2)));
    }

    #[test]
    fn reorg_and_finality_pruning() {
        let mut prior = PriorBlockVotes::new();
        for (byte, slot) in [(1u8, 10u64), (2, 20), (3, 30)] {
            prior.observe_block(root(byte), root(byte - 1), Slot::new(slot), &[]);
        }

        prior.remove_after(Slot::new(20));
        assert!(!prior.contains(&root(3)));

        prior.prune_below(Slot::new(20));
        assert!(!prior.contains(&root(1)));
        assert!(prior.contains(&root(2)));
    }
}
