//! Epoch-aligned duty discovery.
//!
//! At each epoch boundary (and at startup) the controller asks this service
//! to refresh the attester, proposer and sync-committee duties for the
//! validators it manages. Attestation selection proofs are produced eagerly
//! at refresh time so the aggregation path never waits on the signer.

use crate::api::{
    AccountProvider, AttesterDuty, BeaconNodeApi, ProposerDuty, Signer, SignerError, SyncDuty,
    ValidatingAccount,
};
use crate::strategy::MultiEndpoint;
use chain_time::ChainTime;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use slog::{debug, info, warn, Logger};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use types::{ChainSpec, Epoch, SignatureBytes, Slot, ValidatorIndex};

/// Only retain duties within this many epochs of the current one.
pub const HISTORICAL_DUTIES_EPOCHS: u64 = 2;

/// An attester duty joined with its locally produced selection proof.
#[derive(Debug, Clone)]
pub struct DutyAndProof {
    pub duty: AttesterDuty,
    pub selection_proof: Option<SignatureBytes>,
    pub is_aggregator: bool,
}

pub struct DutiesService<T: ChainTime> {
    attesters: RwLock<HashMap<Epoch, HashMap<Slot, Vec<DutyAndProof>>>>,
    proposers: RwLock<HashMap<Epoch, Vec<ProposerDuty>>>,
    sync_duties: RwLock<HashMap<Epoch, Vec<SyncDuty>>>,
    accounts: RwLock<HashMap<Epoch, Vec<ValidatingAccount>>>,
    beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    account_provider: Arc<dyn AccountProvider>,
    signer: Arc<dyn Signer>,
    chain_time: Arc<T>,
    spec: ChainSpec,
    timeout: Duration,
    log: Logger,
}

impl<T: ChainTime> DutiesService<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        account_provider: Arc<dyn AccountProvider>,
        signer: Arc<dyn Signer>,
        chain_time: Arc<T>,
        spec: ChainSpec,
        timeout: Duration,
        log: Logger,
    ) -> Self {
        Self {
            attesters: RwLock::new(HashMap::new()),
            proposers: RwLock::new(HashMap::new()),
            sync_duties: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            beacon_nodes,
            account_provider,
            signer,
            chain_time,
            spec,
            timeout,
            log,
        }
    }

    /// Fetch and store every duty for `epoch`, replacing whatever was held.
    pub async fn refresh(&self, epoch: Epoch) -> Result<(), String> {
        let accounts = self
            .account_provider
            .validating_accounts(epoch)
            .await
            .map_err(|e| format!("unable to obtain validating accounts: {e}"))?;
        if accounts.is_empty() {
            debug!(self.log, "No validating accounts"; "epoch" => %epoch);
            return Ok(());
        }
        let indices: Vec<ValidatorIndex> = accounts.iter().map(|account| account.index).collect();
        let own_indices: HashSet<ValidatorIndex> = indices.iter().copied().collect();

        let attester_duties = self
            .beacon_nodes
            .first_success(self.timeout, None, |bn| {
                bn.attester_duties(epoch, &indices)
            })
            .await
            .map_err(|e| format!("unable to obtain attester duties: {e}"))?
            .value;

        let mut attesters: HashMap<Slot, Vec<DutyAndProof>> = HashMap::new();
        for duty in attester_duties {
            if !own_indices.contains(&duty.validator_index) {
                continue;
            }
            let duty_and_proof = self.attach_selection_proof(duty).await;
            attesters
                .entry(duty_and_proof.duty.slot)
                .or_default()
                .push(duty_and_proof);
        }

        let proposer_duties = self
            .beacon_nodes
            .first_success(self.timeout, None, |bn| bn.proposer_duties(epoch))
            .await
            .map_err(|e| format!("unable to obtain proposer duties: {e}"))?
            .value
            .into_iter()
            .filter(|duty| own_indices.contains(&duty.validator_index))
            .collect::<Vec<_>>();

        let sync_duties = self
            .beacon_nodes
            .first_success(self.timeout, None, |bn| bn.sync_duties(epoch, &indices))
            .await
            .map_err(|e| format!("unable to obtain sync duties: {e}"))?
            .value;

        info!(
            self.log,
            "Duties refreshed";
            "epoch" => %epoch,
            "attesters" => attesters.values().map(Vec::len).sum::<usize>(),
            "proposers" => proposer_duties.len(),
            "sync_members" => sync_duties.len(),
        );

        self.attesters.write().insert(epoch, attesters);
        self.proposers.write().insert(epoch, proposer_duties);
        self.sync_duties.write().insert(epoch, sync_duties);
        self.accounts.write().insert(epoch, accounts);

        self.prune(epoch);
        Ok(())
    }

    async fn attach_selection_proof(&self, duty: AttesterDuty) -> DutyAndProof {
        match self.signer.sign_slot(duty.pubkey, duty.slot).await {
            Ok(proof) => {
                let is_aggregator = is_aggregator(
                    duty.committee_length,
                    self.spec.target_aggregators_per_committee,
                    &proof,
                );
                DutyAndProof {
                    duty,
                    selection_proof: Some(proof),
                    is_aggregator,
                }
            }
            Err(SignerError::Refused { .. }) => DutyAndProof {
                duty,
                selection_proof: None,
                is_aggregator: false,
            },
            Err(e) => {
                warn!(
                    self.log,
                    "Unable to produce selection proof";
                    "validator_index" => duty.validator_index,
                    "error" => %e,
                );
                DutyAndProof {
                    duty,
                    selection_proof: None,
                    is_aggregator: false,
                }
            }
        }
    }

    fn prune(&self, current: Epoch) {
        let horizon = current.saturating_sub(HISTORICAL_DUTIES_EPOCHS);
        self.attesters.write().retain(|epoch, _| *epoch >= horizon);
        self.proposers.write().retain(|epoch, _| *epoch >= horizon);
        self.sync_duties.write().retain(|epoch, _| *epoch >= horizon);
        self.accounts.write().retain(|epoch, _| *epoch >= horizon);
    }

    pub fn has_duties_for(&self, epoch: Epoch) -> bool {
        self.attesters.read().contains_key(&epoch)
    }

    pub fn attesters_at(&self, slot: Slot) -> Vec<DutyAndProof> {
        let epoch = slot.epoch(self.chain_time.slots_per_epoch());
        self.attesters
            .read()
            .get(&epoch)
            .and_then(|by_slot| by_slot.get(&slot))
            .cloned()
            .unwrap_or_default()
    }

    pub fn proposer_at(&self, slot: Slot) -> Option<ProposerDuty> {
        let epoch = slot.epoch(self.chain_time.slots_per_epoch());
        self.proposers
            .read()
            .get(&epoch)?
            .iter()
            .find(|duty| duty.slot == slot)
            .cloned()
    }

    pub fn sync_duties_for(&self, epoch: Epoch) -> Vec<SyncDuty> {
        self.sync_duties
            .read()
            .get(&epoch)
            .cloned()
            .unwrap_or_default()
    }

    pub fn accounts_for(&self, epoch: Epoch) -> Vec<ValidatingAccount> {
        self.accounts
            .read()
            .get(&epoch)
            .cloned()
            .unwrap_or_default()
    }
}

/// The aggregator selection rule: the first eight bytes of the hashed
/// selection proof, little-endian, against the committee's modulo.
pub fn is_aggregator(
    committee_length: u64,
    target_aggregators: u64,
    selection_proof: &SignatureBytes,
) -> bool {
    let modulo = std::cmp::max(1, committee_length / target_aggregators.max(1));
    let digest = Sha256::digest(selection_proof.as_ref());
    let value = u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes"));
    value % modulo == 0
}
