//! The attester duty handler.
//!
//! For each slot with duties: claim the single-action interlock, fetch
//! attestation data through the configured strategy, validate it against
//! chain time, sign for every claimed validator, and broadcast. Aggregation
//! runs later in the slot for validators whose selection proof elected them.

use crate::api::{BeaconNodeApi, SignOutcome, Signer};
use crate::attested::AttestedSet;
use crate::config::{Delays, StrategyKind, Timeouts};
use crate::duties_service::{DutiesService, DutyAndProof};
use crate::metrics;
use crate::strategy::{MultiEndpoint, StrategyError};
use chain_time::ChainTime;
use parking_lot::Mutex;
use slog::{debug, info, warn, Logger};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use types::{AggregateAndProof, Attestation, AttestationData, Epoch, Slot};

/// Smallest useful window for a fan-out whose slot deadline has in practice
/// already passed.
const DEADLINE_FLOOR: Duration = Duration::from_millis(500);

pub struct AttestationService<T: ChainTime + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: ChainTime> Clone for AttestationService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ChainTime> Deref for AttestationService<T> {
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
    attested: AttestedSet<Epoch>,
    aggregated: AttestedSet<Slot>,
    /// Attestation data by slot, kept for the aggregation pass.
    stored_attestation_data: Mutex<HashMap<Slot, AttestationData>>,
    strategy: StrategyKind,
    aggregate_strategy: StrategyKind,
    timeouts: Timeouts,
    delays: Delays,
    signing_permits: Arc<Semaphore>,
    log: Logger,
}

impl<T: ChainTime + 'static> AttestationService<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        signer: Arc<dyn Signer>,
        chain_time: Arc<T>,
        strategy: StrategyKind,
        aggregate_strategy: StrategyKind,
        timeouts: Timeouts,
        delays: Delays,
        signing_permits: Arc<Semaphore>,
        log: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                beacon_nodes,
                signer,
                chain_time,
                attested: AttestedSet::new(),
                aggregated: AttestedSet::new(),
                stored_attestation_data: Mutex::new(HashMap::new()),
                strategy,
                aggregate_strategy,
                timeouts,
                delays,
                signing_permits,
                log,
            }),
        }
    }

    /// Produce and submit attestations for `slot`.
    pub async fn attest(&self, slot: Slot) {
        let _timer = metrics::start_timer_vec(&metrics::DUTY_LATENCY, &["attestation"]);
        let inner = &self.inner;

        let duties = inner.duties_service.attesters_at(slot);
        if duties.is_empty() {
            return;
        }

        let epoch = slot.epoch(inner.chain_time.slots_per_epoch());
        inner.attested.prune_below(epoch.saturating_sub(1u64));

        // The interlock is claimed before anything can be signed; aborts
        // below must retract.
        let mut claimed: Vec<DutyAndProof> = Vec::new();
        for duty in duties {
            if inner.attested.try_claim(epoch, duty.duty.validator_index) {
                claimed.push(duty);
            } else {
                warn!(
                    inner.log,
                    "Validator already attested this epoch; not attesting again";
                    "slot" => %slot,
                    "validator_index" => duty.duty.validator_index,
                );
            }
        }
        if claimed.is_empty() {
            return;
        }
        let retract_all = |claimed: &[DutyAndProof]| {
            for duty in claimed {
                inner.attested.retract(epoch, duty.duty.validator_index);
            }
        };

        let data = match inner
            .fetch_attestation_data(slot, claimed[0].duty.committee_index)
            .await
        {
            Ok(data) => data,
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to obtain attestation data";
                    "slot" => %slot,
                    "error" => %error,
                );
                retract_all(&claimed);
                metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["attestation", "failed"]);
                return;
            }
        };

        // Chain-time invariants; a mismatch is fatal for this slot.
        if data.slot != slot
            || data.source.epoch > data.target.epoch
            || data.target.epoch > epoch
        {
            warn!(
                inner.log,
                "Attestation data violates chain-time invariants";
                "slot" => %slot,
                "data_slot" => %data.slot,
                "source_epoch" => %data.source.epoch,
                "target_epoch" => %data.target.epoch,
            );
            metrics::inc_counter_vec(&metrics::INVARIANT_VIOLATIONS, &["attestation"]);
            retract_all(&claimed);
            return;
        }

        {
            let mut stored = inner.stored_attestation_data.lock();
            stored.insert(slot, data.clone());
            let horizon = slot.saturating_sub(inner.chain_time.slots_per_epoch());
            stored.retain(|stored_slot, _| *stored_slot >= horizon);
        }

        let pubkeys: Vec<_> = claimed.iter().map(|duty| duty.duty.pubkey).collect();
        let outcomes = {
            let _permit = inner.signing_permits.acquire().await.ok();
            match inner.signer.sign_attestations(&data, &pubkeys).await {
                Ok(outcomes) => outcomes,
                Err(error) => {
                    warn!(
                        inner.log,
                        "Attestation signing failed";
                        "slot" => %slot,
                        "error" => %error,
                    );
                    retract_all(&claimed);
                    metrics::inc_counter_vec(
                        &metrics::DUTIES_COMPLETED,
                        &["attestation", "failed"],
                    );
                    return;
                }
            }
        };

        let mut attestations = Vec::with_capacity(claimed.len());
        for (duty, outcome) in claimed.iter().zip(outcomes) {
            match outcome {
                SignOutcome::Signature(signature) => {
                    let mut data = data.clone();
                    data.index = duty.duty.committee_index;
                    attestations.push(Attestation::single(
                        duty.duty.committee_length as usize,
                        duty.duty.validator_committee_index as usize,
                        data,
                        signature,
                    ));
                }
                SignOutcome::Refused { already_signed } => {
                    metrics::inc_counter(&metrics::SIGNER_REFUSALS);
                    if !already_signed {
                        inner.attested.retract(epoch, duty.duty.validator_index);
                    }
                }
                SignOutcome::Failed(reason) => {
                    warn!(
                        inner.log,
                        "No signature for validator";
                        "validator_index" => duty.duty.validator_index,
                        "reason" => %reason,
                    );
                    inner.attested.retract(epoch, duty.duty.validator_index);
                }
            }
        }

        if attestations.is_empty() {
            debug!(inner.log, "No signed attestations; not submitting"; "slot" => %slot);
            return;
        }

        match inner
            .beacon_nodes
            .first_success(inner.timeouts.submission(), None, |bn| {
                bn.submit_attestations(&attestations)
            })
            .await
        {
            Ok(selected) => {
                info!(
                    inner.log,
                    "Submitted attestations";
                    "slot" => %slot,
                    "count" => attestations.len(),
                    "provider" => %selected.provider,
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["attestation", "succeeded"],
                );
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to submit attestations";
                    "slot" => %slot,
                    "error" => %error,
                );
                metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["attestation", "failed"]);
            }
        }
    }

    /// Produce and submit aggregate attestations for `slot`.
    pub async fn aggregate(&self, slot: Slot) {
        let _timer = metrics::start_timer_vec(&metrics::DUTY_LATENCY, &["aggregation"]);
        let inner = &self.inner;

        inner
            .aggregated
            .prune_below(slot.saturating_sub(inner.chain_time.slots_per_epoch() * 2));

        let aggregators: Vec<DutyAndProof> = inner
            .duties_service
            .attesters_at(slot)
            .into_iter()
            .filter(|duty| duty.is_aggregator && duty.selection_proof.is_some())
            .filter(|duty| inner.aggregated.try_claim(slot, duty.duty.validator_index))
            .collect();
        if aggregators.is_empty() {
            return;
        }

        let data = match inner.stored_attestation_data.lock().get(&slot).cloned() {
            Some(data) => data,
            None => {
                debug!(
                    inner.log,
                    "No stored attestation data to aggregate";
                    "slot" => %slot,
                );
                for duty in &aggregators {
                    inner.aggregated.retract(slot, duty.duty.validator_index);
                }
                return;
            }
        };

        let deadline = inner.deadline_at_slot_end(slot);
        let aggregate = match inner.aggregate_strategy {
            StrategyKind::First => inner
                .beacon_nodes
                .first_success(inner.timeouts.attestation_data(), Some(deadline), |bn| {
                    bn.aggregate_attestation(slot, &data)
                })
                .await
                .map(|selected| selected.value),
            StrategyKind::Best => inner
                .beacon_nodes
                .best_of(
                    inner.timeouts.attestation_data(),
                    deadline,
                    |bn| bn.aggregate_attestation(slot, &data),
                    |aggregate| {
                        aggregate
                            .as_ref()
                            .map_or(0.0, |a| a.aggregation_bits.num_set_bits() as f64)
                    },
                )
                .await
                .map(|selected| selected.value),
            StrategyKind::Majority => inner
                .beacon_nodes
                .majority(inner.timeouts.attestation_data(), deadline, |bn| {
                    bn.aggregate_attestation(slot, &data)
                })
                .await
                .map(|selected| selected.value),
        };

        let aggregate = match aggregate {
            Ok(Some(aggregate)) => aggregate,
            Ok(None) => {
                debug!(inner.log, "No aggregate available"; "slot" => %slot);
                for duty in &aggregators {
                    inner.aggregated.retract(slot, duty.duty.validator_index);
                }
                return;
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to obtain aggregate attestation";
                    "slot" => %slot,
                    "error" => %error,
                );
                for duty in &aggregators {
                    inner.aggregated.retract(slot, duty.duty.validator_index);
                }
                return;
            }
        };

        let mut signed = Vec::with_capacity(aggregators.len());
        {
            let _permit = inner.signing_permits.acquire().await.ok();
            for duty in &aggregators {
                let message = AggregateAndProof {
                    aggregator_index: duty.duty.validator_index,
                    aggregate: aggregate.clone(),
                    selection_proof: duty
                        .selection_proof
                        .expect("aggregators are filtered to have proofs"),
                };
                match inner
                    .signer
                    .sign_aggregate_and_proof(duty.duty.pubkey, &message)
                    .await
                {
                    Ok(signature) => signed.push(types::SignedAggregateAndProof {
                        message,
                        signature,
                    }),
                    Err(error) => {
                        debug!(
                            inner.log,
                            "Aggregate not signed";
                            "validator_index" => duty.duty.validator_index,
                            "error" => %error,
                        );
                        inner.aggregated.retract(slot, duty.duty.validator_index);
                    }
                }
            }
        }

        if signed.is_empty() {
            return;
        }

        match inner
            .beacon_nodes
            .first_success(inner.timeouts.submission(), None, |bn| {
                bn.submit_aggregate_and_proofs(&signed)
            })
            .await
        {
            Ok(_) => {
                info!(
                    inner.log,
                    "Submitted aggregate attestations";
                    "slot" => %slot,
                    "count" => signed.len(),
                );
                metrics::inc_counter_vec(
                    &metrics::DUTIES_COMPLETED,
                    &["aggregation", "succeeded"],
                );
            }
            Err(error) => {
                warn!(
                    inner.log,
                    "Unable to submit aggregate attestations";
                    "slot" => %slot,
                    "error" => %error,
                );
                metrics::inc_counter_vec(&metrics::DUTIES_COMPLETED, &["aggregation", "failed"]);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn attested_set(&self) -> &AttestedSet<Epoch> {
        &self.inner.attested
    }
}

impl<T: ChainTime> Inner<T> {
    async fn fetch_attestation_data(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<AttestationData, StrategyError> {
        let deadline = self.deadline_at(slot, self.delays.max_attestation_delay());
        let timeout = self.timeouts.attestation_data();
        let slots_per_epoch = self.chain_time.slots_per_epoch();

        match self.strategy {
            StrategyKind::First => self
                .beacon_nodes
                .first_success(timeout, Some(deadline), |bn| {
                    bn.attestation_data(slot, committee_index)
                })
                .await
                .map(|selected| selected.value),
            StrategyKind::Best => self
                .beacon_nodes
                .best_of(
                    timeout,
                    deadline,
                    |bn| bn.attestation_data(slot, committee_index),
                    |data| score_attestation_data(data, slots_per_epoch),
                )
                .await
                .map(|selected| selected.value),
            StrategyKind::Majority => self
                .beacon_nodes
                .majority(timeout, deadline, |bn| {
                    bn.attestation_data(slot, committee_index)
                })
                .await
                .map(|selected| selected.value),
        }
    }

    /// Wall-clock deadline at `offset` past the start of `slot`, with a small
    /// grace floor if that moment has already passed.
    fn deadline_at(&self, slot: Slot, offset: Duration) -> Instant {
        let target = self.chain_time.start_of_slot(slot) + offset;
        let now = self.chain_time.now_duration().unwrap_or(target);
        let remaining = target.saturating_sub(now).max(DEADLINE_FLOOR);
        Instant::now() + remaining
    }

    fn deadline_at_slot_end(&self, slot: Slot) -> Instant {
        self.deadline_at(slot, self.chain_time.slot_duration())
    }
}

/// Attestation data with later checkpoints represents a better-synced view.
fn score_attestation_data(data: &AttestationData, slots_per_epoch: u64) -> f64 {
    (data.target.epoch.as_u64() * slots_per_epoch + data.source.epoch.as_u64()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, attester_duty, harness, Harness};
    use types::Checkpoint;

    fn valid_data(slot: u64, epoch: u64) -> AttestationData {
        AttestationData {
            slot: Slot::new(slot),
            index: 0,
            beacon_block_root: types::Hash256::repeat_byte(1),
            source: Checkpoint {
                epoch: types::Epoch::new(epoch.saturating_sub(1)),
                root: types::Hash256::repeat_byte(2),
            },
            target: Checkpoint {
                epoch: types::Epoch::new(epoch),
                root: types::Hash256::repeat_byte(3),
            },
        }
    }

    async fn attest_once(harness: &Harness) -> usize {
        harness.attestation_service.attest(Slot::new(64)).await;
        harness.beacon_node.submitted_attestations.lock().len()
    }

    #[tokio::test]
    async fn attests_for_every_duty() {
        let harness = harness(vec![account(1), account(2)]).await;
        harness.beacon_node.set_attestation_data(valid_data(64, 2));
        harness
            .duties
            .set_attesters(vec![attester_duty(1, 64, 0), attester_duty(2, 64, 1)]);
        harness.refresh_duties().await;

        assert_eq!(attest_once(&harness).await, 2);
    }

    #[tokio::test]
    async fn second_invocation_is_inert() {
        let harness = harness(vec![account(1)]).await;
        harness.beacon_node.set_attestation_data(valid_data(64, 2));
        harness.duties.set_attesters(vec![attester_duty(1, 64, 0)]);
        harness.refresh_duties().await;

        assert_eq!(attest_once(&harness).await, 1);
        // The epoch interlock holds across repeat invocations.
        assert_eq!(attest_once(&harness).await, 1);
    }

    #[tokio::test]
    async fn slot_mismatch_aborts_without_claiming() {
        let harness = harness(vec![account(1)]).await;
        harness.beacon_node.set_attestation_data(valid_data(63, 2));
        harness.duties.set_attesters(vec![attester_duty(1, 64, 0)]);
        harness.refresh_duties().await;

        assert_eq!(attest_once(&harness).await, 0);
        // The validator was not recorded as having attested.
        assert!(!harness
            .attestation_service
            .attested_set()
            .contains(types::Epoch::new(2), 1));
    }

    #[tokio::test]
    async fn source_after_target_aborts() {
        let harness = harness(vec![account(1)]).await;
        let mut data = valid_data(64, 2);
        data.source.epoch = types::Epoch::new(5);
        harness.beacon_node.set_attestation_data(data);
        harness.duties.set_attesters(vec![attester_duty(1, 64, 0)]);
        harness.refresh_duties().await;

        assert_eq!(attest_once(&harness).await, 0);
    }

    #[tokio::test]
    async fn refusal_skips_quietly() {
        let harness = harness(vec![account(1), account(2)]).await;
        harness.beacon_node.set_attestation_data(valid_data(64, 2));
        harness.signer.refuse_validator(2, false);
        harness
            .duties
            .set_attesters(vec![attester_duty(1, 64, 0), attester_duty(2, 64, 1)]);
        harness.refresh_duties().await;

        assert_eq!(attest_once(&harness).await, 1);
        // A non-idempotent refusal leaves the validator free to act later.
        assert!(!harness
            .attestation_service
            .attested_set()
            .contains(types::Epoch::new(2), 2));
    }

    #[tokio::test]
    async fn aggregates_for_elected_validators() {
        let harness = harness(vec![account(1)]).await;
        harness.beacon_node.set_attestation_data(valid_data(64, 2));
        harness
            .duties
            .set_attesters(vec![crate::testing::aggregator_duty(1, 64, 0)]);
        harness.refresh_duties().await;

        harness.attestation_service.attest(Slot::new(64)).await;

        let mut aggregate_bits = types::Bitlist::with_len(8);
        aggregate_bits.set(0, true);
        aggregate_bits.set(3, true);
        harness.beacon_node.set_aggregate(Attestation {
            aggregation_bits: aggregate_bits,
            data: valid_data(64, 2),
            signature: types::SignatureBytes::empty(),
        });

        harness.attestation_service.aggregate(Slot::new(64)).await;
        let aggregates = harness.beacon_node.submitted_aggregates.lock();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].message.aggregator_index, 1);

        // The per-slot interlock makes a second pass inert.
        drop(aggregates);
        harness.attestation_service.aggregate(Slot::new(64)).await;
        assert_eq!(harness.beacon_node.submitted_aggregates.lock().len(), 1);
    }

    #[test]
    fn later_checkpoints_score_higher() {
        let early = valid_data(64, 2);
        let late = valid_data(64, 3);
        assert!(
            score_attestation_data(&late, 32) > score_attestation_data(&early, 32)
        );
    }
}
