//! The sync-committee duty handler: per-slot head-root messages and, later in
//! the slot, contribution aggregation for elected subcommittee aggregators.

use crate::api::{BeaconNodeApi, Signer, SignerError, SyncDuty};
use crate::attested::AttestedSet;
use crate::config::{Delays, StrategyKind, Timeouts};
use crate::duties_service::{is_aggregator, DutiesService};
use crate::metrics;
use crate::strategy::MultiEndpoint;
use chain_time::ChainTime;
use slog::{debug, info, warn, Logger};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use types::{
    ChainSpec, ContributionAndProof, Hash256, SignedContributionAndProof, Slot,
    SyncCommitteeMessage,
};

const DEADLINE_FLOOR: Duration = Duration::from_millis(500);

pub struct SyncCommitteeService<T: ChainTime + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: ChainTime> Clone for SyncCommitteeService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ChainTime> Deref for SyncCommitteeService<T> {
    type Target = Inner<T>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

pub struct Inner<T: ChainTime> {
    duties_service: Arc<DutiesService<T>>,
    beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    signer: Arc<dyn Signer>,
    chain_time: Arc<T>,
    messaged: AttestedSet<Slot>,
    aggregated: AttestedSet<Slot>,
    root_strategy: StrategyKind,
    timeouts: Timeouts,
    delays: Delays,
    signing_permits: Arc<Semaphore>,
    spec: ChainSpec,
    log: Logger,
}

impl<T: ChainTime + 'static> SyncCommitteeService<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        signer: Arc<dyn Signer>,
        chain_time: Arc<T>,
        root_strategy: StrategyKind,
        timeouts: Timeouts,
        delays: Delays,
        signing_permits: Arc<Semaphore>,
        spec: ChainSpec,
        log: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                beacon_nodes,
                signer,
                chain_time,
                messaged: AttestedSet::new(),
                aggregated: AttestedSet::new(),
                root_strategy,
                timeouts,
                delays,
                signing_permits,
                spec,
                log,
            }),
        }
    }

    /// Sign and submit the head-root message for `slot` for every sync
    /// committee member we manage.
    pub async fn message(&self, slot: Slot) {
        let _timer = metrics::start_timer_vec(&metrics::DUTY_LATENCY, &["sync_message"]);
        let inner = &self.inner;

        let epoch = slot.epoch(inner.chain_time.slots_per_epoch());
        let duties = inner.duties_service.sync_duties_for(epoch);
        if duties.is_empty() {
            return;
        }

        inner
            .messaged
            .prune_below(slot.saturating_sub(inner.chain_time.slots_per_epoch()));

        let duties: Vec<SyncDuty> = duties
            .into_iter()
            .filter(|duty| inner.messaged.try_claim(slot, duty.validator_index))
            .collect();
        if duties.is_empty() {
            return;
        }
        let retract_all = |duties: &[SyncDuty]| {
            for duty in duties {
                inner.messaged.retract(slot, duty.validator_index);
            }
        };

        let beacon_block_root = match inner.fetch_head_root(slot).await {
            Some(root) => root,
            None => {
                warn!(inner.log, "Unable to obtain head root"; "slot" => %slot);
                retract_all(&duties);
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["sync_message", "failed"],
                );
                return;
            }
        };

        let mut messages = Vec::with_capacity(duties.len());
        {
            let _permit = inner.signing_permits.acquire().await.ok();
            for duty in &duties {
                match inner
                    .signer
                    .sign_sync_committee_message(duty.pubkey, slot, beacon_block_root)
                    .await
                {
                    Ok(signature) => messages.push(SyncCommitteeMessage {
                        slot,
                        beacon_block_root,
                        validator_index: duty.validator_index,
                        signature,
                    }),
                    Err(SignerError::Refused { already_signed }) => {
                        metrics::inc_counter(&metrics::SIGNER_REFUSALS);
                        if !already_signed {
                            inner.messaged.retract(slot, duty.validator_index);
                        }
                    }
                    Err(error) => {
                        warn!(
                            inner.log,
                            "Unable to sign sync committee message";
                            "validator_index" => duty.validator_index,
                            "error" => %error,
                        );
                        inner.messaged.retract(slot, duty.validator_index);
                    }
                }
            }
        }

        if messages.is_empty() {
            return;
        }

        match inner
            .beacon_nodes
            .first_success(inner.timeouts.submission(), None, |bn| {
                bn.submit_sync_committee_messages(&messages)
            })
            .await
        {
            Ok(_) => {
                info!(
                    inner.log,
                    "Submitted sync committee messages";
                    "slot" => %slot,
                    "count" => messages.len(),
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["sync_message", "succeeded"],
                );
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to submit sync committee messages";
                    "slot" => %slot,
                    "error" => %error,
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["sync_message", "failed"],
                );
            }
        }
    }

    /// Aggregate subcommittee contributions for `slot`.
    pub async fn aggregate(&self, slot: Slot) {
        let _timer = metrics::start_timer_vec(&metrics::DUTY_LATENCY, &["sync_aggregation"]);
        let inner = &self.inner;

        let epoch = slot.epoch(inner.chain_time.slots_per_epoch());
        let duties = inner.duties_service.sync_duties_for(epoch);
        if duties.is_empty() {
            return;
        }

        inner
            .aggregated
            .prune_below(slot.saturating_sub(inner.chain_time.slots_per_epoch()));

        let beacon_block_root = match inner.fetch_head_root(slot).await {
            Some(root) => root,
            None => {
                debug!(inner.log, "No head root to aggregate against"; "slot" => %slot);
                return;
            }
        };

        let subcommittee_size =
            inner.spec.sync_committee_size / inner.spec.sync_committee_subnet_count;
        let mut signed = Vec::new();

        for duty in duties {
            if !inner.aggregated.try_claim(slot, duty.validator_index) {
                continue;
            }
            let mut acted = false;

            let subcommittees: std::collections::HashSet<u64> = duty
                .validator_sync_committee_indices
                .iter()
                .map(|index| index / subcommittee_size)
                .collect();

            for subcommittee_index in subcommittees {
                let proof = match inner
                    .signer
                    .sign_sync_selection(duty.pubkey, slot, subcommittee_index)
                    .await
                {
                    Ok(proof) => proof,
                    Err(error) => {
                        debug!(
                            inner.log,
                            "No sync selection proof";
                            "validator_index" => duty.validator_index,
                            "error" => %error,
                        );
                        continue;
                    }
                };
                if !is_aggregator(
                    subcommittee_size,
                    inner.spec.target_aggregators_per_sync_subcommittee,
                    &proof,
                ) {
                    continue;
                }

                let contribution = match inner
                    .beacon_nodes
                    .first_success(inner.timeouts.attestation_data(), None, |bn| {
                        bn.sync_committee_contribution(
                            slot,
                            subcommittee_index,
                            beacon_block_root,
                        )
                    })
                    .await
                {
                    Ok(selected) => match selected.value {
                        Some(contribution) => contribution,
                        None => continue,
                    },
                    Err(error) => {
                        debug!(
                            inner.log,
                            "No sync contribution available";
                            "slot" => %slot,
                            "subcommittee" => subcommittee_index,
                            "error" => %error,
                        );
                        continue;
                    }
                };

                let message = ContributionAndProof {
                    aggregator_index: duty.validator_index,
                    contribution,
                    selection_proof: proof,
                };
                let _permit = inner.signing_permits.acquire().await.ok();
                match inner
                    .signer
                    .sign_contribution_and_proof(duty.pubkey, &message)
                    .await
                {
                    Ok(signature) => {
                        acted = true;
                        signed.push(SignedContributionAndProof { message, signature });
                    }
                    Err(error) => {
                        debug!(
                            inner.log,
                            "Contribution not signed";
                            "validator_index" => duty.validator_index,
                            "error" => %error,
                        );
                    }
                }
            }

            if !acted {
                inner.aggregated.retract(slot, duty.validator_index);
            }
        }

        if signed.is_empty() {
            return;
        }

        match inner
            .beacon_nodes
            .first_success(inner.timeouts.submission(), None, |bn| {
                bn.submit_contribution_and_proofs(&signed)
            })
            .await
        {
            Ok(_) => {
                info!(
                    inner.log,
                    "Submitted sync contributions";
                    "slot" => %slot,
                    "count" => signed.len(),
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["sync_aggregation", "succeeded"],
                );
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to submit sync contributions";
                    "slot" => %slot,
                    "error" => %error,
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["sync_aggregation", "failed"],
                );
            }
        }
    }
}

impl<T: ChainTime> Inner<T> {
    /// The canonical head root for the slot's message, via the configured
    /// strategy.
    async fn fetch_head_root(&self, slot: Slot) -> Option<Hash256> {
        let deadline = {
            let target =
                self.chain_time.start_of_slot(slot) + self.delays.max_sync_committee_message_delay();
            let now = self.chain_time.now_duration().unwrap_or(target);
            Instant::now() + target.saturating_sub(now).max(DEADLINE_FLOOR)
        };
        let timeout = self.timeouts.attestation_data();

        let result = match self.root_strategy {
            StrategyKind::Majority => self
                .beacon_nodes
                .majority(timeout, deadline, |bn| bn.block_header_at_slot(slot))
                .await,
            // `best` has no meaningful score for a root; treat as first.
            StrategyKind::First | StrategyKind::Best => self
                .beacon_nodes
                .first_success(timeout, Some(deadline), |bn| bn.block_header_at_slot(slot))
                .await,
        };

        match result {
            Ok(selected) => selected.value.map(|header| header.root),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, harness, sync_duty};
    use types::Hash256;

    #[tokio::test]
    async fn messages_for_every_member() {
        let harness = harness(vec![account(1), account(2)]).await;
        harness.beacon_node.set_sync_duties(vec![sync_duty(1, &[0]), sync_duty(2, &[130])]);
        harness
            .beacon_node
            .set_head_header(64, Hash256::repeat_byte(0x11));
        harness.refresh_duties().await;

        harness.sync_service.message(Slot::new(64)).await;
        let messages = harness.beacon_node.submitted_sync_messages.lock();
        assert_eq!(messages.len(), 2);
        assert!(messages
            .iter()
            .all(|message| message.beacon_block_root == Hash256::repeat_byte(0x11)));
    }

    #[tokio::test]
    async fn one_message_per_validator_per_slot() {
        let harness = harness(vec![account(1)]).await;
        harness.beacon_node.set_sync_duties(vec![sync_duty(1, &[0])]);
        harness
            .beacon_node
            .set_head_header(64, Hash256::repeat_byte(0x11));
        harness.refresh_duties().await;

        harness.sync_service.message(Slot::new(64)).await;
        harness.sync_service.message(Slot::new(64)).await;
        assert_eq!(harness.beacon_node.submitted_sync_messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn missing_head_root_retracts_claims() {
        let harness = harness(vec![account(1)]).await;
        harness.beacon_node.set_sync_duties(vec![sync_duty(1, &[0])]);
        harness.refresh_duties().await;

        // No header available; the claim must be released for a later retry.
        harness.sync_service.message(Slot::new(64)).await;
        assert!(harness.beacon_node.submitted_sync_messages.lock().is_empty());

        harness
            .beacon_node
            .set_head_header(64, Hash256::repeat_byte(0x11));
        harness.sync_service.message(Slot::new(64)).await;
        assert_eq!(harness.beacon_node.submitted_sync_messages.lock().len(), 1);
    }
}
