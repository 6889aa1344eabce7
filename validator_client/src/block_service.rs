//! The proposer duty handler.
//!
//! At the start of a duty slot: sign the RANDAO reveal, run the best-proposal
//! selection, verify the proposer safety conditions, sign exactly one block
//! and broadcast it. A blinded winner has its bid re-verified against the
//! originating relay before anything is signed; if the relay has gone away or
//! changed its mind, the best non-blinded candidate is used instead.

use crate::api::{BeaconNodeApi, RelayApi, Signer, SignerError};
use crate::attested::AttestedSet;
use crate::config::{Delays, Timeouts};
use crate::duties_service::DutiesService;
use crate::head_tracker::HeadTracker;
use crate::metrics;
use crate::selector::{BestProposalSelector, ProposalCandidate, SelectorError};
use crate::strategy::MultiEndpoint;
use chain_time::ChainTime;
use slog::{debug, info, warn, Logger};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use types::{
    BlockProposal, Graffiti, PublicKeyBytes, SignedBeaconBlock, SignedBlindedBeaconBlock, Slot,
};

const DEADLINE_FLOOR: Duration = Duration::from_millis(500);

pub struct BlockService<T: ChainTime + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: ChainTime> Clone for BlockService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ChainTime> Deref for BlockService<T> {
    type Target = Inner<T>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

pub struct Inner<T: ChainTime> {
    duties_service: Arc<DutiesService<T>>,
    beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    relays: Arc<MultiEndpoint<dyn RelayApi>>,
    signer: Arc<dyn Signer>,
    chain_time: Arc<T>,
    selector: BestProposalSelector,
    head_tracker: Arc<HeadTracker>,
    proposed: AttestedSet<Slot>,
    graffiti: Option<Graffiti>,
    builder_enabled: bool,
    timeouts: Timeouts,
    delays: Delays,
    signing_permits: Arc<Semaphore>,
    log: Logger,
}

impl<T: ChainTime + 'static> BlockService<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        relays: Arc<MultiEndpoint<dyn RelayApi>>,
        signer: Arc<dyn Signer>,
        chain_time: Arc<T>,
        selector: BestProposalSelector,
        head_tracker: Arc<HeadTracker>,
        graffiti: Option<Graffiti>,
        builder_enabled: bool,
        timeouts: Timeouts,
        delays: Delays,
        signing_permits: Arc<Semaphore>,
        log: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                beacon_nodes,
                relays,
                signer,
                chain_time,
                selector,
                head_tracker,
                proposed: AttestedSet::new(),
                graffiti,
                builder_enabled,
                timeouts,
                delays,
                signing_permits,
                log,
            }),
        }
    }

    /// Produce, sign and broadcast the block for `slot`, if one of our
    /// validators is the proposer.
    pub async fn propose(&self, slot: Slot) {
        let _timer = metrics::start_timer_vec(&metrics::DUTY_LATENCY, &["proposal"]);
        let inner = &self.inner;

        let duty = match inner.duties_service.proposer_at(slot) {
            Some(duty) => duty,
            None => return,
        };

        inner
            .proposed
            .prune_below(slot.saturating_sub(inner.chain_time.slots_per_epoch() * 2));
        if !inner.proposed.try_claim(slot, duty.validator_index) {
            warn!(
                inner.log,
                "Validator already proposed at this slot";
                "slot" => %slot,
                "validator_index" => duty.validator_index,
            );
            return;
        }
        let abort = || {
            inner.proposed.retract(slot, duty.validator_index);
            metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["proposal", "failed"]);
        };

        let epoch = slot.epoch(inner.chain_time.slots_per_epoch());
        let randao_reveal = match inner.signer.sign_randao_reveal(duty.pubkey, epoch).await {
            Ok(signature) => signature,
            Err(SignerError::Refused { .. }) => {
                debug!(inner.log, "RANDAO reveal refused"; "slot" => %slot);
                abort();
                return;
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to sign RANDAO reveal";
                    "slot" => %slot,
                    "error" => %error,
                );
                abort();
                return;
            }
        };

        let head = inner.head_tracker.current();
        let execution_parent_hash = if inner.builder_enabled {
            head.and_then(|head| head.execution_hash)
        } else {
            None
        };

        let deadline = inner.deadline_at(slot, inner.delays.max_proposal_delay());
        let candidates = match inner
            .selector
            .best(
                slot,
                randao_reveal,
                inner.graffiti,
                duty.pubkey,
                execution_parent_hash,
                inner.timeouts.proposal(),
                deadline,
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(SelectorError::NoCandidates) => {
                warn!(inner.log, "No proposal candidates"; "slot" => %slot);
                abort();
                return;
            }
        };

        let candidate = match inner.choose_usable_candidate(slot, duty.pubkey, candidates).await {
            Some(candidate) => candidate,
            None => {
                warn!(inner.log, "No usable proposal candidate"; "slot" => %slot);
                abort();
                return;
            }
        };

        // Proposer safety, at the moment of signing.
        if let Some(head) = inner.head_tracker.current() {
            if slot != head.slot + 1 {
                warn!(
                    inner.log,
                    "Head slot does not precede proposal slot; refusing to sign";
                    "slot" => %slot,
                    "head_slot" => %head.slot,
                );
                abort();
                return;
            }
            if candidate.proposal.parent_root() != Some(head.root) {
                warn!(
                    inner.log,
                    "Candidate parent disagrees with chain head; refusing to sign";
                    "slot" => %slot,
                    "head_root" => %head.root,
                );
                abort();
                return;
            }
        }

        let signature = {
            let _permit = inner.signing_permits.acquire().await.ok();
            match inner.signer.sign_block(duty.pubkey, &candidate.proposal).await {
                Ok(signature) => signature,
                Err(SignerError::Refused { already_signed }) => {
                    metrics::inc_counter(&metrics::SIGNER_REFUSALS);
                    if !already_signed {
                        inner.proposed.retract(slot, duty.validator_index);
                    }
                    return;
                }
                Err(error) => {
                    warn!(
                        inner.log,
                        "Unable to sign block";
                        "slot" => %slot,
                        "error" => %error,
                    );
                    abort();
                    return;
                }
            }
        };

        let submitted = match candidate.proposal {
            BlockProposal::Blinded(block) => {
                let signed = SignedBlindedBeaconBlock {
                    message: block,
                    signature,
                };
                inner
                    .beacon_nodes
                    .first_success(inner.timeouts.submission(), None, |bn| {
                        bn.submit_blinded_block(&signed)
                    })
                    .await
                    .map(|selected| selected.provider)
            }
            BlockProposal::Full(block) => {
                let signed = SignedBeaconBlock {
                    message: block,
                    signature,
                };
                inner
                    .beacon_nodes
                    .first_success(inner.timeouts.submission(), None, |bn| {
                        bn.submit_block(&signed)
                    })
                    .await
                    .map(|selected| selected.provider)
            }
            BlockProposal::Unsupported { .. } => unreachable!("filtered by the selector"),
        };

        match submitted {
            Ok(provider) => {
                info!(
                    inner.log,
                    "Submitted block proposal";
                    "slot" => %slot,
                    "provider" => %provider,
                    "bid_wei" => ?candidate.bid_wei,
                    "score" => candidate.score,
                );
                metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["proposal", "succeeded"]);
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to submit block proposal";
                    "slot" => %slot,
                    "error" => %error,
                );
                metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["proposal", "failed"]);
            }
        }
    }
}

impl<T: ChainTime> Inner<T> {
    /// Take candidates best-first and return the first that is safe to sign.
    ///
    /// A bid-backed winner must round-trip a header re-query to its
    /// originating relay first; if that fails, selection falls back to the
    /// best candidate without a bid, per the configured safety rule.
    async fn choose_usable_candidate(
        &self,
        slot: Slot,
        pubkey: PublicKeyBytes,
        candidates: Vec<ProposalCandidate>,
    ) -> Option<ProposalCandidate> {
        let mut bid_failed = false;
        for candidate in candidates {
            if !candidate.proposal.is_blinded() {
                return Some(candidate);
            }
            // A blinded block is only signable when its originating relay
            // still serves the bid. Blinded candidates with no bid at all
            // have no relay to answer for them and are never signed.
            if candidate.bid_wei.is_some() && !bid_failed {
                if self.verify_bid(slot, pubkey, &candidate).await {
                    return Some(candidate);
                }
                bid_failed = true;
                debug!(
                    self.log,
                    "Relay bid failed re-verification; falling back to non-blinded candidates";
                    "slot" => %slot,
                    "relay" => %candidate.provider,
                );
            }
        }
        None
    }

    async fn verify_bid(
        &self,
        slot: Slot,
        pubkey: PublicKeyBytes,
        candidate: &ProposalCandidate,
    ) -> bool {
        let block_hash = match &candidate.proposal {
            BlockProposal::Blinded(block) => block.execution_payload_header().block_hash,
            _ => return false,
        };
        let parent_hash = match &candidate.proposal {
            BlockProposal::Blinded(block) => block.execution_payload_header().parent_hash,
            _ => return false,
        };

        let relay = self
            .relays
            .endpoints()
            .iter()
            .find(|endpoint| endpoint.id() == candidate.provider);
        let relay = match relay {
            Some(endpoint) => endpoint.inner().clone(),
            None => return false,
        };

        match tokio::time::timeout(
            self.timeouts.proposal(),
            relay.get_header(slot, parent_hash, pubkey),
        )
        .await
        {
            Ok(Ok(Some(bid))) => bid.message.header.block_hash == block_hash,
            _ => false,
        }
    }

    fn deadline_at(&self, slot: Slot, offset: Duration) -> Instant {
        let target = self.chain_time.start_of_slot(slot) + offset;
        let now = self.chain_time.now_duration().unwrap_or(target);
        let remaining = target.saturating_sub(now).max(DEADLINE_FLOOR);
        Instant::now() + remaining
    }
}
