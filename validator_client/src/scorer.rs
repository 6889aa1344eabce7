//! Deterministic reward scoring for candidate block proposals.
//!
//! The score approximates the proposer reward a block will earn from the
//! attestations and sync aggregate it packs, using the consensus-layer
//! participation weights. Scoring is a pure function of its inputs: no I/O,
//! no failure. A proposal of an unknown fork scores zero.

use crate::prior_votes::{PriorBlockVotes, PRIOR_VOTES_WINDOW};
use std::collections::HashMap;
use types::{Bitlist, BlockProposal, ChainSpec, CommitteeIndex, Hash256, Slot};

/// Resolves a block root to its slot, without I/O.
pub trait SlotLookup {
    fn slot_of_root(&self, root: &Hash256) -> Option<Slot>;
}

impl SlotLookup for HashMap<Hash256, Slot> {
    fn slot_of_root(&self, root: &Hash256) -> Option<Slot> {
        self.get(root).copied()
    }
}

/// The participation weights the scorer applies, fixed by the chain spec with
/// a configurable scale on the sync component.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub source_weight: u64,
    pub target_weight: u64,
    pub head_weight: u64,
    pub sync_reward_weight: u64,
    pub weight_denominator: u64,
    pub sync_factor: f64,
    pub slots_per_epoch: u64,
    /// Maximum inclusion distance for a timely source vote.
    pub max_source_distance: u64,
}

impl ScoringWeights {
    pub fn from_spec(spec: &ChainSpec, sync_factor: f64) -> Self {
        Self {
            source_weight: spec.timely_source_weight,
            target_weight: spec.timely_target_weight,
            head_weight: spec.timely_head_weight,
            sync_reward_weight: spec.sync_reward_weight,
            weight_denominator: spec.weight_denominator,
            sync_factor,
            slots_per_epoch: spec.slots_per_epoch,
            max_source_distance: spec.timely_source_distance(),
        }
    }
}

struct ChainEntry {
    root: Hash256,
    slot: Slot,
}

/// The block root at the highest slot at or below `slot` on the walked chain,
/// or `None` if the walk did not reach back that far.
fn root_at_or_before(chain: &[ChainEntry], slot: Slot) -> Option<Hash256> {
    chain
        .iter()
        .find(|entry| entry.slot <= slot)
        .map(|entry| entry.root)
}

/// Score a candidate proposal against the chain rooted at its parent.
///
/// Votes already included by an ancestor block (per `prior_votes`), or by an
/// earlier attestation in the same body, earn nothing. Where the ancestor
/// chain cannot be walked far enough to judge a vote, the vote is given the
/// benefit of the doubt.
pub fn score_proposal(
    proposal: &BlockProposal,
    prior_votes: &PriorBlockVotes,
    roots: &dyn SlotLookup,
    weights: &ScoringWeights,
) -> f64 {
    let (slot, parent_root) = match (proposal.slot(), proposal.parent_root()) {
        (Some(slot), Some(parent_root)) => (slot, parent_root),
        // Unknown fork version.
        _ => return 0.0,
    };

    // Walk the ancestor chain, accumulating the votes each ancestor included.
    let mut chain: Vec<ChainEntry> = Vec::new();
    let mut seen: HashMap<(Slot, CommitteeIndex), Bitlist> = HashMap::new();
    let mut current = parent_root;
    for _ in 0..PRIOR_VOTES_WINDOW {
        match prior_votes.get(&current) {
            Some(entry) => {
                chain.push(ChainEntry {
                    root: current,
                    slot: entry.slot,
                });
                for (vote_slot, committees) in &entry.votes {
                    for (committee_index, bits) in committees {
                        seen.entry((*vote_slot, *committee_index))
                            .or_insert_with(|| Bitlist::with_len(bits.len()))
                            .union_assign(bits);
                    }
                }
                current = entry.parent_root;
            }
            None => {
                if let Some(cached_slot) = roots.slot_of_root(&current) {
                    chain.push(ChainEntry {
                        root: current,
                        slot: cached_slot,
                    });
                }
                break;
            }
        }
    }

    let mut score = 0.0;

    for attestation in proposal.attestations() {
        let data = &attestation.data;
        if data.slot >= slot {
            continue;
        }
        let distance = (slot - data.slot).as_u64();

        let head_correct = root_at_or_before(&chain, data.slot)
            .map_or(true, |root| root == data.beacon_block_root);
        let target_slot = data.target.epoch.start_slot(weights.slots_per_epoch);
        let target_correct =
            root_at_or_before(&chain, target_slot).map_or(true, |root| root == data.target.root);

        let mut numerator = 0;
        if distance <= weights.max_source_distance {
            numerator += weights.source_weight;
        }
        if target_correct && distance <= weights.slots_per_epoch {
            numerator += weights.target_weight;
        }
        if head_correct && distance == 1 {
            numerator += weights.head_weight;
        }
        let factor = numerator as f64 / weights.weight_denominator as f64;

        let key = (data.slot, data.index);
        let new_bits = match seen.get(&key) {
            Some(bits) => attestation.aggregation_bits.new_bits(bits),
            None => attestation.aggregation_bits.num_set_bits(),
        };
        score += new_bits as f64 * factor;

        seen.entry(key)
            .or_insert_with(|| Bitlist::with_len(attestation.aggregation_bits.len()))
            .union_assign(&attestation.aggregation_bits);
    }

    if let Some(sync_aggregate) = proposal.sync_aggregate() {
        let per_bit =
            weights.sync_reward_weight as f64 / weights.weight_denominator as f64;
        score += sync_aggregate.sync_committee_bits.num_set_bits() as f64
            * per_bit
            * weights.sync_factor;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior_votes::BlockVotes;
    use types::{
        Attestation, AttestationData, BlindedBeaconBlock, BlindedBeaconBlockBellatrix,
        BlindedBeaconBlockBodyBellatrix, Checkpoint, Epoch, ExecutionPayloadHeader, Graffiti,
        SignatureBytes, SyncAggregate,
    };

    fn root(byte: u8) -> Hash256 {
        Hash256::repeat_byte(byte)
    }

    fn bit_list(set: u64, total: usize) -> Bitlist {
        let mut bits = Bitlist::with_len(total);
        for i in 0..set {
            bits.set(i as usize, true);
        }
        bits
    }

    struct TestAttestation {
        slot: u64,
        bits: Bitlist,
        beacon_block_root: Hash256,
        target_epoch: u64,
        target_root: Hash256,
    }

    fn attestation(spec: TestAttestation) -> Attestation {
        Attestation {
            aggregation_bits: spec.bits,
            data: AttestationData {
                slot: Slot::new(spec.slot),
                index: 0,
                beacon_block_root: spec.beacon_block_root,
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: Epoch::new(spec.target_epoch),
                    root: spec.target_root,
                },
            },
            signature: SignatureBytes::empty(),
        }
    }

    fn proposal(slot: u64, parent_root: Hash256, attestations: Vec<Attestation>) -> BlockProposal {
        BlockProposal::Blinded(BlindedBeaconBlock::Bellatrix(BlindedBeaconBlockBellatrix {
            slot: Slot::new(slot),
            proposer_index: 1,
            parent_root,
            state_root: Hash256::zero(),
            body: BlindedBeaconBlockBodyBellatrix {
                randao_reveal: SignatureBytes::empty(),
                graffiti: Graffiti::default(),
                attestations,
                sync_aggregate: SyncAggregate::empty(512),
                execution_payload_header: ExecutionPayloadHeader::default(),
            },
        }))
    }

    fn weights() -> ScoringWeights {
        ScoringWeights::from_spec(&ChainSpec::mainnet(), 1.0)
    }

    /// The root→slot cache contents shared by the fixed scenarios.
    fn roots_cache() -> HashMap<Hash256, Slot> {
        let mut cache = HashMap::new();
        cache.insert(root(0x01), Slot::new(12344));
        cache.insert(root(0x02), Slot::new(12345));
        cache.insert(root(0x03), Slot::new(12346));
        cache.insert(root(0x04), Slot::new(12347));
        cache.insert(root(0x05), Slot::new(12348));
        cache
    }

    fn score(proposal: &BlockProposal, prior: &PriorBlockVotes) -> f64 {
        score_proposal(proposal, prior, &roots_cache(), &weights())
    }

    #[test]
    fn single_attestation_head_correct_distance_one() {
        let proposal = proposal(
            12346,
            root(0x02),
            vec![attestation(TestAttestation {
                slot: 12345,
                bits: bit_list(1, 128),
                beacon_block_root: root(0x02),
                target_epoch: 385,
                target_root: root(0x01),
            })],
        );
        assert_eq!(score(&proposal, &PriorBlockVotes::new()), 0.84375);
    }

    #[test]
    fn single_attestation_head_incorrect() {
        let proposal = proposal(
            12346,
            root(0x01),
            vec![attestation(TestAttestation {
                slot: 12345,
                bits: bit_list(1, 128),
                beacon_block_root: root(0x02),
                target_epoch: 385,
                target_root: root(0x01),
            })],
        );
        assert_eq!(score(&proposal, &PriorBlockVotes::new()), 0.625);
    }

    #[test]
    fn distant_attestation_earns_target_only() {
        let proposal = proposal(
            12350,
            root(0x01),
            vec![attestation(TestAttestation {
                slot: 12339,
                bits: bit_list(1, 128),
                beacon_block_root: Hash256::zero(),
                target_epoch: 385,
                target_root: root(0x07),
            })],
        );
        assert_eq!(score(&proposal, &PriorBlockVotes::new()), 0.40625);
    }

    #[test]
    fn overlapping_attestations_count_new_bits_once() {
        let make = |set| {
            attestation(TestAttestation {
                slot: 12343,
                bits: bit_list(set, 128),
                beacon_block_root: Hash256::zero(),
                target_epoch: 385,
                target_root: root(0x43),
            })
        };
        let proposal = proposal(12345, root(0x01), vec![make(1), make(2)]);
        assert_eq!(score(&proposal, &PriorBlockVotes::new()), 1.25);
    }

    /// Votes included by an ancestor earn nothing; votes included by an
    /// orphaned sibling still count.
    #[test]
    fn prior_votes_on_ancestors_are_discounted() {
        let mut prior = PriorBlockVotes::new();
        prior.insert_raw(
            root(0x41),
            BlockVotes {
                parent_root: root(0x40),
                slot: Slot::new(12341),
                votes: HashMap::new(),
            },
        );
        // Orphaned block; its votes must be ignored.
        prior.insert_raw(
            root(0x42),
            BlockVotes {
                parent_root: root(0x41),
                slot: Slot::new(12342),
                votes: HashMap::from([(
                    Slot::new(12342),
                    HashMap::from([(0u64, bit_list(5, 128))]),
                )]),
            },
        );
        // Ancestor; its votes are discounted.
        prior.insert_raw(
            root(0x43),
            BlockVotes {
                parent_root: root(0x41),
                slot: Slot::new(12343),
                votes: HashMap::from([(
                    Slot::new(12342),
                    HashMap::from([(0u64, bit_list(2, 128))]),
                )]),
            },
        );

        let proposal = proposal(
            12344,
            root(0x43),
            vec![attestation(TestAttestation {
                slot: 12342,
                bits: bit_list(5, 128),
                beacon_block_root: root(0x42),
                target_epoch: 385,
                target_root: root(0x42),
            })],
        );
        assert_eq!(score(&proposal, &prior), 1.875);
    }

    #[test]
    fn target_correctness_resolved_from_chain() {
        let mut prior = PriorBlockVotes::new();
        prior.insert_raw(
            root(0x44),
            BlockVotes {
                parent_root: root(0x20),
                slot: Slot::new(12344),
                votes: HashMap::new(),
            },
        );
        prior.insert_raw(
            root(0x20),
            BlockVotes {
                parent_root: root(0x19),
                slot: Slot::new(12320),
                votes: HashMap::new(),
            },
        );

        let correct = proposal(
            12345,
            root(0x44),
            vec![attestation(TestAttestation {
                slot: 12344,
                bits: bit_list(1, 128),
                beacon_block_root: root(0x44),
                target_epoch: 385,
                target_root: root(0x20),
            })],
        );
        assert_eq!(score(&correct, &prior), 0.84375);

        let incorrect = proposal(
            12345,
            root(0x44),
            vec![attestation(TestAttestation {
                slot: 12344,
                bits: bit_list(1, 128),
                beacon_block_root: root(0x44),
                target_epoch: 385,
                target_root: root(0x15),
            })],
        );
        assert_eq!(score(&incorrect, &prior), 0.4375);
    }

    #[test]
    fn unknown_fork_scores_zero() {
        let unsupported = BlockProposal::Unsupported {
            version: "electra".to_string(),
        };
        assert_eq!(score(&unsupported, &PriorBlockVotes::new()), 0.0);
    }

    #[test]
    fn sync_aggregate_reward() {
        let mut block = match proposal(12346, root(0x02), vec![]) {
            BlockProposal::Blinded(BlindedBeaconBlock::Bellatrix(block)) => block,
            _ => unreachable!(),
        };
        block.body.sync_aggregate.sync_committee_bits = bit_list(512, 512);
        let proposal = BlockProposal::Blinded(BlindedBeaconBlock::Bellatrix(block));
        // 512 participants at 2/64 each.
        assert_eq!(score(&proposal, &PriorBlockVotes::new()), 16.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let proposal = proposal(
            12346,
            root(0x02),
            vec![attestation(TestAttestation {
                slot: 12345,
                bits: bit_list(37, 128),
                beacon_block_root: root(0x02),
                target_epoch: 385,
                target_root: root(0x01),
            })],
        );
        let first = score(&proposal, &PriorBlockVotes::new());
        for _ in 0..10 {
            assert_eq!(score(&proposal, &PriorBlockVotes::new()), first);
        }
    }

    /// Adding a strictly-new aggregation bit never decreases the score.
    #[test]
    fn scoring_is_monotone_in_new_bits() {
        for set in 1..64 {
            let lesser = proposal(
                12346,
                root(0x02),
                vec![attestation(TestAttestation {
                    slot: 12345,
                    bits: bit_list(set, 128),
                    beacon_block_root: root(0x02),
                    target_epoch: 385,
                    target_root: root(0x01),
                })],
            );
            let greater = proposal(
                12346,
                root(0x02),
                vec![attestation(TestAttestation {
                    slot: 12345,
                    bits: bit_list(set + 1, 128),
                    beacon_block_root: root(0x02),
                    target_epoch: 385,
                    target_root: root(0x01),
                })],
            );
            assert!(
                score(&greater, &PriorBlockVotes::new())
                    >= score(&lesser, &PriorBlockVotes::new())
            );
        }
    }

    /// A bit already present in an ancestor earns exactly nothing.
    #[test]
    fn no_double_vote_credit() {
        let mut prior = PriorBlockVotes::new();
        prior.insert_raw(
            root(0x43),
            BlockVotes {
                parent_root: root(0x40),
                slot: Slot::new(12343),
                votes: HashMap::from([(
                    Slot::new(12342),
                    HashMap::from([(0u64, bit_list(3, 128))]),
                )]),
            },
        );

        let with_duplicate = proposal(
            12344,
            root(0x43),
            vec![attestation(TestAttestation {
                slot: 12342,
                bits: bit_list(3, 128),
                beacon_block_root: Hash256::zero(),
                target_epoch: 385,
                target_root: Hash256::zero(),
            })],
        );
        let mut fresh_bits = Bitlist::with_len(128);
        fresh_bits.set(100, true);
        let mut duplicate_and_fresh = bit_list(3, 128);
        duplicate_and_fresh.set(100, true);
        let with_fresh = proposal(
            12344,
            root(0x43),
            vec![attestation(TestAttestation {
                slot: 12342,
                bits: duplicate_and_fresh,
                beacon_block_root: Hash256::zero(),
                target_epoch: 385,
                target_root: Hash256::zero(),
            })],
        );
        let only_fresh = proposal(
            12344,
            root(0x43),
            vec![attestation(TestAttestation {
                slot: 12342,
                bits: fresh_bits,
                beacon_block_root: Hash256::zero(),
                target_epoch: 385,
                target_root: Hash256::zero(),
            })],
        );

        assert_eq!(score(&with_duplicate, &prior), 0.0);
        assert_eq!(score(&with_fresh, &prior), score(&only_fresh, &prior));
    }
}
