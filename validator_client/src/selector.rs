//! Best-proposal selection: fan out block production to every beacon node and
//! every relay, score what comes back before the deadline, and rank.
//!
//! Beacon nodes contribute full and blinded candidates directly. Relays
//! contribute bids; a bid is materialized by grafting its payload header onto
//! the best blinded candidate a beacon node supplied, so a usable relay bid
//! requires at least one blinded block. Responses arriving after the deadline
//! are dropped unobserved.

use crate::api::{BeaconNodeApi, RelayApi};
use crate::block_roots::BlockRootCache;
use crate::metrics;
use crate::prior_votes::PriorBlockVotes;
use crate::scorer::{score_proposal, ScoringWeights};
use crate::strategy::MultiEndpoint;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use slog::{debug, warn, Logger};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use types::{
    BlockProposal, Graffiti, Hash256, PublicKeyBytes, SignatureBytes, SignedBuilderBid, Slot,
    Uint256,
};

/// How blinded candidates with builder bids rank against everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidRanking {
    /// Rank by bid value, attestation score breaking near-ties.
    BidFirst,
    /// Ignore bid values entirely.
    ScoreOnly,
}

#[derive(Debug, Clone)]
pub struct ProposalCandidate {
    pub proposal: BlockProposal,
    /// The builder bid backing a blinded candidate, in wei.
    pub bid_wei: Option<Uint256>,
    pub score: f64,
    pub provider: String,
    pub weight: u64,
}

#[derive(Debug)]
pub enum SelectorError {
    /// No provider returned a usable candidate before the deadline.
    NoCandidates,
}

impl std::fmt::Display for SelectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SelectorError::NoCandidates => write!(f, "no proposal candidates"),
        }
    }
}

pub struct BestProposalSelector {
    beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    relays: Arc<MultiEndpoint<dyn RelayApi>>,
    prior_votes: Arc<RwLock<PriorBlockVotes>>,
    block_roots: Arc<BlockRootCache>,
    weights: ScoringWeights,
    ranking: BidRanking,
    bid_epsilon: Uint256,
    log: Logger,
}

enum RawResponse {
    Block(BlockProposal),
    Bid(SignedBuilderBid),
}

impl BestProposalSelector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        relays: Arc<MultiEndpoint<dyn RelayApi>>,
        prior_votes: Arc<RwLock<PriorBlockVotes>>,
        block_roots: Arc<BlockRootCache>,
        weights: ScoringWeights,
        ranking: BidRanking,
        bid_epsilon: Uint256,
        log: Logger,
    ) -> Self {
        Self {
            beacon_nodes,
            relays,
            prior_votes,
            block_roots,
            weights,
            ranking,
            bid_epsilon,
            log,
        }
    }

    /// Obtain and rank proposal candidates for `slot`.
    ///
    /// Returns candidates best-first; the tail serves as the fallback order
    /// if the winner cannot be used. Fails only if nothing usable arrived.
    #[allow(clippy::too_many_arguments)]
    pub async fn best(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Graffiti>,
        proposer_pubkey: PublicKeyBytes,
        execution_parent_hash: Option<Hash256>,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<Vec<ProposalCandidate>, SelectorError> {
        let mut requests: FuturesUnordered<
            BoxFuture<'static, (String, u64, &'static str, Result<RawResponse, crate::api::ApiError>)>,
        > = FuturesUnordered::new();

        for endpoint in self.beacon_nodes.endpoints() {
            let beacon_node = endpoint.inner().clone();
            let id = endpoint.id().to_string();
            let weight = endpoint.weight();
            requests.push(Box::pin(async move {
                let result = tokio::time::timeout(
                    timeout,
                    beacon_node.produce_block(slot, randao_reveal, graffiti),
                )
                .await
                .unwrap_or(Err(crate::api::ApiError::Timeout));
                (id, weight, "beacon_node", result.map(RawResponse::Block))
            }));

            let beacon_node = endpoint.inner().clone();
            let id = endpoint.id().to_string();
            requests.push(Box::pin(async move {
                let result = tokio::time::timeout(
                    timeout,
                    beacon_node.produce_blinded_block(slot, randao_reveal, graffiti),
                )
                .await
                .unwrap_or(Err(crate::api::ApiError::Timeout));
                (
                    id,
                    weight,
                    "beacon_node_blinded",
                    result.map(RawResponse::Block),
                )
            }));
        }

        if let Some(parent_hash) = execution_parent_hash {
            for endpoint in self.relays.endpoints() {
                let relay = endpoint.inner().clone();
                let id = endpoint.id().to_string();
                let weight = endpoint.weight();
                requests.push(Box::pin(async move {
                    let result = tokio::time::timeout(
                        timeout,
                        relay.get_header(slot, parent_hash, proposer_pubkey),
                    )
                    .await
                    .unwrap_or(Err(crate::api::ApiError::Timeout));
                    let result = match result {
                        Ok(Some(bid)) => Ok(RawResponse::Bid(bid)),
                        Ok(None) => Err(crate::api::ApiError::ServerMessage(
                            "relay has no bid".to_string(),
                        )),
                        Err(e) => Err(e),
                    };
                    (id, weight, "relay", result)
                }));
            }
        }

        // Collect until the deadline or until every provider has answered.
        let mut blocks: Vec<(String, u64, BlockProposal)> = Vec::new();
        let mut bids: Vec<(String, u64, SignedBuilderBid)> = Vec::new();
        let deadline_sleep = tokio::time::sleep_until(deadline);
        futures::pin_mut!(deadline_sleep);
        loop {
            tokio::select! {
                next = requests.next() => match next {
                    Some((provider, weight, provenance, result)) => match result {
                        Ok(RawResponse::Block(proposal)) => {
                            metrics::inc_counter_vec(&metrics::PROPOSAL_CANDIDATES, &[provenance]);
                            blocks.push((provider, weight, proposal));
                        }
                        Ok(RawResponse::Bid(bid)) => {
                            metrics::inc_counter_vec(&metrics::PROPOSAL_CANDIDATES, &[provenance]);
                            bids.push((provider, weight, bid));
                        }
                        Err(error) => {
                            debug!(
                                self.log,
                                "Proposal provider failed";
                                "provider" => %provider,
                                "error" => %error,
                            );
                        }
                    },
                    None => break,
                },
                _ = &mut deadline_sleep => {
                    debug!(self.log, "Proposal deadline reached"; "slot" => %slot);
                    break;
                }
            }
        }
        drop(requests);

        // Score the block candidates.
        let mut candidates: Vec<ProposalCandidate> = {
            let prior_votes = self.prior_votes.read();
            blocks
                .into_iter()
                .map(|(provider, weight, proposal)| {
                    let score = score_proposal(
                        &proposal,
                        &prior_votes,
                        self.block_roots.as_ref(),
                        &self.weights,
                    );
                    ProposalCandidate {
                        proposal,
                        bid_wei: None,
                        score,
                        provider,
                        weight,
                    }
                })
                .collect()
        };

        // Materialize relay bids onto the best blinded block we obtained.
        if !bids.is_empty() {
            let base = candidates
                .iter()
                .filter(|candidate| candidate.proposal.is_blinded())
                .max_by(|a, b| {
                    a.score
                        .partial_cmp(&b.score)
                        .unwrap_or(Ordering::Equal)
                        .then(a.weight.cmp(&b.weight))
                })
                .cloned();

            match base {
                Some(base) => {
                    for (provider, weight, bid) in bids {
                        let blinded = match &base.proposal {
                            BlockProposal::Blinded(block) => {
                                block.clone().with_payload_header(bid.message.header.clone())
                            }
                            _ => continue,
                        };
                        candidates.push(ProposalCandidate {
                            proposal: BlockProposal::Blinded(blinded),
                            bid_wei: Some(bid.message.value),
                            score: base.score,
                            provider,
                            weight,
                        });
                    }
                }
                None => {
                    warn!(
                        self.log,
                        "Relay bids received but no blinded block to carry them";
                        "slot" => %slot,
                        "bids" => bids.len(),
                    );
                }
            }
        }

        // Unknown forks score zero and carry no bid, so they can never win
        // over a usable candidate, but drop them outright for clarity.
        candidates.retain(|candidate| !matches!(
            candidate.proposal,
            BlockProposal::Unsupported { .. }
        ));

        if candidates.is_empty() {
            return Err(SelectorError::NoCandidates);
        }

        let ranking = self.ranking;
        let epsilon = self.bid_epsilon;
        candidates.sort_by(|a, b| rank(b, a, ranking, epsilon));

        if let Some(winner) = candidates.first() {
            metrics::observe(&metrics::PROPOSAL_SCORE, winner.score);
            debug!(
                self.log,
                "Selected proposal candidate";
                "slot" => %slot,
                "provider" => %winner.provider,
                "score" => winner.score,
                "bid_wei" => ?winner.bid_wei,
            );
        }

        Ok(candidates)
    }
}

/// Candidate ordering: lexicographic (bid, score) under `BidFirst` with the
/// score deciding bids closer than `epsilon`; pure score under `ScoreOnly`.
/// Endpoint weight breaks remaining ties.
fn rank(
    a: &ProposalCandidate,
    b: &ProposalCandidate,
    ranking: BidRanking,
    epsilon: Uint256,
) -> Ordering {
    let by_score = |a: &ProposalCandidate, b: &ProposalCandidate| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal)
            .then(a.weight.cmp(&b.weight))
    };

    match ranking {
        BidRanking::ScoreOnly => by_score(a, b),
        BidRanking::BidFirst => {
            let a_bid = a.bid_wei.unwrap_or_default();
            let b_bid = b.bid_wei.unwrap_or_default();
            let difference = if a_bid > b_bid {
                a_bid - b_bid
            } else {
                b_bid - a_bid
            };
            if difference <= epsilon {
                by_score(a, b)
            } else {
                a_bid.cmp(&b_bid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(bid_eth: Option<u64>, score: f64, weight: u64) -> ProposalCandidate {
        ProposalCandidate {
            proposal: BlockProposal::Unsupported {
                version: "test".to_string(),
            },
            bid_wei: bid_eth.map(|eth| Uint256::from(eth) * Uint256::exp10(18)),
            score,
            provider: format!("provider_{weight}"),
            weight,
        }
    }

    #[test]
    fn bid_first_prefers_higher_bid() {
        let low = candidate(Some(1), 5.0, 1);
        let high = candidate(Some(2), 1.0, 1);
        assert_eq!(
            rank(&high, &low, BidRanking::BidFirst, Uint256::zero()),
            Ordering::Greater
        );
    }

    #[test]
    fn near_tied_bids_fall_back_to_score() {
        let epsilon = Uint256::exp10(13);
        let slightly_less = candidate(Some(2), 9.0, 1);
        let slightly_more = candidate(Some(2), 1.0, 1);
        assert_eq!(
            rank(&slightly_less, &slightly_more, BidRanking::BidFirst, epsilon),
            Ordering::Greater
        );
    }

    #[test]
    fn score_only_ignores_bids() {
        let bid = candidate(Some(100), 1.0, 1);
        let no_bid = candidate(None, 2.0, 1);
        assert_eq!(
            rank(&no_bid, &bid, BidRanking::ScoreOnly, Uint256::zero()),
            Ordering::Greater
        );
    }

    #[test]
    fn weight_breaks_exact_ties() {
        let light = candidate(Some(2), 1.0, 1);
        let heavy = candidate(Some(2), 1.0, 9);
        assert_eq!(
            rank(&heavy, &light, BidRanking::BidFirst, Uint256::zero()),
            Ordering::Greater
        );
    }
}
