//! In-memory provider implementations and a wired-up service harness for
//! tests.

use crate::api::{
    AccountProvider, ApiError, AttesterDuty, BeaconNodeApi, BlockHeaderInfo, EventStream,
    EventTopic, ProposerDuty, RelayApi, SignOutcome, Signer, SignerError, SyncDuty,
    ValidatingAccount,
};
use crate::attestation_service::AttestationService;
use crate::block_roots::BlockRootCache;
use crate::block_service::BlockService;
use crate::config::{Delays, StrategyKind, Timeouts};
use crate::controller::Controller;
use crate::duties_service::DutiesService;
use crate::head_tracker::HeadTracker;
use crate::preparation_service::PreparationService;
use crate::prior_votes::PriorBlockVotes;
use crate::scheduler::JobScheduler;
use crate::scorer::ScoringWeights;
use crate::selector::{BestProposalSelector, BidRanking};
use crate::strategy::{Endpoint, MultiEndpoint};
use crate::sync_committee_service::SyncCommitteeService;
use async_trait::async_trait;
use chain_time::{ChainTime, ManualChainTime, TimeDelay};
use parking_lot::{Mutex, RwLock};
use slog::Logger;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tokio::sync::Semaphore;
use types::{
    Address, Attestation, AttestationData, BeaconBlock, BeaconBlockBellatrix,
    BeaconBlockBodyBellatrix, BlindedBeaconBlock, BlindedBeaconBlockBellatrix,
    BlindedBeaconBlockBodyBellatrix, BlockProposal, BuilderBid, ChainSpec, ContributionAndProof,
    Epoch, ExecutionPayload, ExecutionPayloadHeader, Graffiti, Hash256, PublicKeyBytes,
    AggregateAndProof, SignatureBytes, SignedAggregateAndProof, SignedBeaconBlock,
    SignedBlindedBeaconBlock, SignedBuilderBid, SignedContributionAndProof,
    SignedValidatorRegistration, Slot, SyncAggregate, SyncCommitteeContribution,
    SyncCommitteeMessage, Uint256, ValidatorIndex, ValidatorRegistration,
};

pub fn null_log() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

pub fn pk(index: u64) -> PublicKeyBytes {
    let mut bytes = [0u8; 48];
    bytes[0] = index as u8;
    PublicKeyBytes(bytes)
}

pub fn account(index: u64) -> ValidatingAccount {
    ValidatingAccount {
        pubkey: pk(index),
        index,
    }
}

pub fn attester_duty(index: u64, slot: u64, committee_position: u64) -> AttesterDuty {
    AttesterDuty {
        pubkey: pk(index),
        validator_index: index,
        committee_index: 0,
        committee_length: 128,
        committees_at_slot: 1,
        validator_committee_index: committee_position,
        slot: Slot::new(slot),
    }
}

/// A duty in a committee small enough that its validator always aggregates.
pub fn aggregator_duty(index: u64, slot: u64, committee_position: u64) -> AttesterDuty {
    AttesterDuty {
        committee_length: 8,
        ..attester_duty(index, slot, committee_position)
    }
}

pub fn proposer_duty(index: u64, slot: u64) -> ProposerDuty {
    ProposerDuty {
        pubkey: pk(index),
        validator_index: index,
        slot: Slot::new(slot),
    }
}

pub fn sync_duty(index: u64, committee_indices: &[u64]) -> SyncDuty {
    SyncDuty {
        pubkey: pk(index),
        validator_index: index,
        validator_sync_committee_indices: committee_indices.to_vec(),
    }
}

pub fn bellatrix_block(slot: u64, parent_root: Hash256) -> BlockProposal {
    BlockProposal::Full(BeaconBlock::Bellatrix(BeaconBlockBellatrix {
        slot: Slot::new(slot),
        proposer_index: 1,
        parent_root,
        state_root: Hash256::zero(),
        body: BeaconBlockBodyBellatrix {
            randao_reveal: SignatureBytes::empty(),
            graffiti: Graffiti::default(),
            attestations: vec![],
            sync_aggregate: SyncAggregate::empty(512),
            execution_payload: ExecutionPayload::default(),
        },
    }))
}

pub fn blinded_bellatrix_block(
    slot: u64,
    parent_root: Hash256,
    execution_parent_hash: Hash256,
) -> BlockProposal {
    BlockProposal::Blinded(BlindedBeaconBlock::Bellatrix(BlindedBeaconBlockBellatrix {
        slot: Slot::new(slot),
        proposer_index: 1,
        parent_root,
        state_root: Hash256::zero(),
        body: BlindedBeaconBlockBodyBellatrix {
            randao_reveal: SignatureBytes::empty(),
            graffiti: Graffiti::default(),
            attestations: vec![],
            sync_aggregate: SyncAggregate::empty(512),
            execution_payload_header: ExecutionPayloadHeader {
                parent_hash: execution_parent_hash,
                ..ExecutionPayloadHeader::default()
            },
        },
    }))
}

pub fn signed_bid(value: Uint256, parent_hash: Hash256, block_hash_byte: u8) -> SignedBuilderBid {
    SignedBuilderBid {
        message: BuilderBid {
            header: ExecutionPayloadHeader {
                parent_hash,
                block_hash: Hash256::repeat_byte(block_hash_byte),
                ..ExecutionPayloadHeader::default()
            },
            value,
            pubkey: PublicKeyBytes::empty(),
        },
        signature: SignatureBytes::empty(),
    }
}

// -------- mock beacon node --------

#[derive(Default)]
pub struct MockBeaconNode {
    attestation_data: Mutex<Option<AttestationData>>,
    full_proposal: Mutex<Option<BlockProposal>>,
    blinded_proposal: Mutex<Option<BlockProposal>>,
    attester_duties: Mutex<Vec<AttesterDuty>>,
    proposer_duties: Mutex<Vec<ProposerDuty>>,
    sync_duties: Mutex<Vec<SyncDuty>>,
    headers_by_slot: Mutex<HashMap<Slot, BlockHeaderInfo>>,
    signed_blocks: Mutex<HashMap<Hash256, SignedBeaconBlock>>,
    aggregate: Mutex<Option<Attestation>>,
    contribution: Mutex<Option<SyncCommitteeContribution>>,
    block_fetches: AtomicUsize,

    pub submitted_attestations: Mutex<Vec<Attestation>>,
    pub submitted_blocks: Mutex<Vec<SignedBeaconBlock>>,
    pub submitted_blinded_blocks: Mutex<Vec<SignedBlindedBeaconBlock>>,
    pub submitted_aggregates: Mutex<Vec<SignedAggregateAndProof>>,
    pub submitted_sync_messages: Mutex<Vec<SyncCommitteeMessage>>,
    pub submitted_contributions: Mutex<Vec<SignedContributionAndProof>>,
}

impl MockBeaconNode {
    pub fn set_attestation_data(&self, data: AttestationData) {
        *self.attestation_data.lock() = Some(data);
    }

    pub fn set_attesters(&self, duties: Vec<AttesterDuty>) {
        *self.attester_duties.lock() = duties;
    }

    pub fn set_proposers(&self, duties: Vec<ProposerDuty>) {
        *self.proposer_duties.lock() = duties;
    }

    pub fn set_sync_duties(&self, duties: Vec<SyncDuty>) {
        *self.sync_duties.lock() = duties;
    }

    pub fn set_full_proposal(&self, proposal: BlockProposal) {
        *self.full_proposal.lock() = Some(proposal);
    }

    pub fn set_blinded_proposal(&self, proposal: BlockProposal) {
        *self.blinded_proposal.lock() = Some(proposal);
    }

    pub fn set_head_header(&self, slot: u64, root: Hash256) {
        self.headers_by_slot.lock().insert(
            Slot::new(slot),
            BlockHeaderInfo {
                root,
                slot: Slot::new(slot),
                parent_root: Hash256::zero(),
            },
        );
    }

    pub fn set_signed_block(&self, root: Hash256, block: SignedBeaconBlock) {
        self.signed_blocks.lock().insert(root, block);
    }

    pub fn set_aggregate(&self, aggregate: Attestation) {
        *self.aggregate.lock() = Some(aggregate);
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BeaconNodeApi for MockBeaconNode {
    async fn spec(&self) -> Result<ChainSpec, ApiError> {
        Ok(ChainSpec::mainnet())
    }

    async fn genesis_time(&self) -> Result<Duration, ApiError> {
        Ok(Duration::ZERO)
    }

    async fn attestation_data(
        &self,
        _slot: Slot,
        _committee_index: u64,
    ) -> Result<AttestationData, ApiError> {
        self.attestation_data
            .lock()
            .clone()
            .ok_or_else(|| ApiError::Unavailable("no attestation data".into()))
    }

    async fn produce_block(
        &self,
        _slot: Slot,
        _randao_reveal: SignatureBytes,
        _graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError> {
        self.full_proposal
            .lock()
            .clone()
            .ok_or_else(|| ApiError::Unavailable("no block".into()))
    }

    async fn produce_blinded_block(
        &self,
        _slot: Slot,
        _randao_reveal: SignatureBytes,
        _graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError> {
        self.blinded_proposal
            .lock()
            .clone()
            .ok_or_else(|| ApiError::Unavailable("no blinded block".into()))
    }

    async fn submit_attestations(&self, attestations: &[Attestation]) -> Result<(), ApiError> {
        self.submitted_attestations
            .lock()
            .extend_from_slice(attestations);
        Ok(())
    }

    async fn submit_block(&self, block: &SignedBeaconBlock) -> Result<(), ApiError> {
        self.submitted_blocks.lock().push(block.clone());
        Ok(())
    }

    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<(), ApiError> {
        self.submitted_blinded_blocks.lock().push(block.clone());
        Ok(())
    }

    async fn block_header_by_root(
        &self,
        root: Hash256,
    ) -> Result<Option<BlockHeaderInfo>, ApiError> {
        Ok(self
            .signed_blocks
            .lock()
            .get(&root)
            .map(|signed| BlockHeaderInfo {
                root,
                slot: signed.message.slot(),
                parent_root: signed.message.parent_root(),
            }))
    }

    async fn block_header_at_slot(
        &self,
        slot: Slot,
    ) -> Result<Option<BlockHeaderInfo>, ApiError> {
        Ok(self.headers_by_slot.lock().get(&slot).cloned())
    }

    async fn signed_beacon_block(
        &self,
        root: Hash256,
    ) -> Result<Option<SignedBeaconBlock>, ApiError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.signed_blocks.lock().get(&root).cloned())
    }

    async fn attester_duties(
        &self,
        _epoch: Epoch,
        _indices: &[ValidatorIndex],
    ) -> Result<Vec<AttesterDuty>, ApiError> {
        Ok(self.attester_duties.lock().clone())
    }

    async fn proposer_duties(&self, _epoch: Epoch) -> Result<Vec<ProposerDuty>, ApiError> {
        Ok(self.proposer_duties.lock().clone())
    }

    async fn sync_duties(
        &self,
        _epoch: Epoch,
        _indices: &[ValidatorIndex],
    ) -> Result<Vec<SyncDuty>, ApiError> {
        Ok(self.sync_duties.lock().clone())
    }

    async fn validator_indices(
        &self,
        _pubkeys: &[PublicKeyBytes],
    ) -> Result<HashMap<PublicKeyBytes, ValidatorIndex>, ApiError> {
        Ok(HashMap::new())
    }

    async fn aggregate_attestation(
        &self,
        _slot: Slot,
        _data: &AttestationData,
    ) -> Result<Option<Attestation>, ApiError> {
        Ok(self.aggregate.lock().clone())
    }

    async fn submit_aggregate_and_proofs(
        &self,
        aggregates: &[SignedAggregateAndProof],
    ) -> Result<(), ApiError> {
        self.submitted_aggregates.lock().extend_from_slice(aggregates);
        Ok(())
    }

    async fn submit_sync_committee_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> Result<(), ApiError> {
        self.submitted_sync_messages.lock().extend_from_slice(messages);
        Ok(())
    }

    async fn sync_committee_contribution(
        &self,
        _slot: Slot,
        _subcommittee_index: u64,
        _beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, ApiError> {
        Ok(self.contribution.lock().clone())
    }

    async fn submit_contribution_and_proofs(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), ApiError> {
        self.submitted_contributions
            .lock()
            .extend_from_slice(contributions);
        Ok(())
    }

    async fn subscribe_events(&self, _topics: &[EventTopic]) -> Result<EventStream, ApiError> {
        Err(ApiError::Unavailable("no event stream in tests".into()))
    }
}

// -------- mock relay --------

pub struct RelaySpec {
    pub id: String,
    pub weight: u64,
    pub bid: SignedBuilderBid,
    pub failing: bool,
}

impl RelaySpec {
    pub fn new(id: &str, weight: u64, bid: SignedBuilderBid) -> Self {
        Self {
            id: id.to_string(),
            weight,
            bid,
            failing: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[derive(Default)]
pub struct MockRelay {
    bid: Mutex<Option<SignedBuilderBid>>,
    failing: Mutex<bool>,
    header_calls: AtomicUsize,
    vanish_after: Mutex<Option<usize>>,
    pub registrations: Mutex<Vec<SignedValidatorRegistration>>,
    pub unblinded: Mutex<Vec<SignedBlindedBeaconBlock>>,
}

impl MockRelay {
    pub fn with_bid(bid: SignedBuilderBid, failing: bool) -> Self {
        Self {
            bid: Mutex::new(Some(bid)),
            failing: Mutex::new(failing),
            ..Self::default()
        }
    }

    /// Serve the bid for the first `calls` header queries, then stop.
    pub fn vanish_after(&self, calls: usize) {
        *self.vanish_after.lock() = Some(calls);
        self.header_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> Result<(), ApiError> {
        if *self.failing.lock() {
            return Err(ApiError::Unavailable("relay down".into()));
        }
        self.registrations.lock().extend_from_slice(registrations);
        Ok(())
    }

    async fn get_header(
        &self,
        _slot: Slot,
        _parent_hash: Hash256,
        _pubkey: PublicKeyBytes,
    ) -> Result<Option<SignedBuilderBid>, ApiError> {
        if *self.failing.lock() {
            return Err(ApiError::Unavailable("relay down".into()));
        }
        let calls = self.header_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.vanish_after.lock() {
            if calls >= limit {
                return Ok(None);
            }
        }
        Ok(self.bid.lock().clone())
    }

    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<ExecutionPayload, ApiError> {
        self.unblinded.lock().push(block.clone());
        Ok(ExecutionPayload::default())
    }
}

// -------- mock signer --------

fn test_signature(pubkey: PublicKeyBytes, domain: u8) -> SignatureBytes {
    let mut bytes = [0u8; 96];
    bytes[0] = pubkey.0[0];
    bytes[1] = domain;
    bytes[2] = 1;
    SignatureBytes(bytes)
}

#[derive(Default)]
pub struct MockSigner {
    /// Validators (by pubkey marker byte) whose requests are refused, with
    /// the idempotency flag.
    refusals: Mutex<HashMap<u8, bool>>,
    refuse_blocks: Mutex<bool>,
    signed_blocks: AtomicUsize,
}

impl MockSigner {
    pub fn refuse_validator(&self, index: u64, already_signed: bool) {
        self.refusals.lock().insert(index as u8, already_signed);
    }

    pub fn refuse_blocks(&self) {
        *self.refuse_blocks.lock() = true;
    }

    pub fn signed_blocks(&self) -> usize {
        self.signed_blocks.load(Ordering::SeqCst)
    }

    fn refusal_for(&self, pubkey: &PublicKeyBytes) -> Option<bool> {
        self.refusals.lock().get(&pubkey.0[0]).copied()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn sign_attestations(
        &self,
        _data: &AttestationData,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<Vec<SignOutcome>, SignerError> {
        Ok(pubkeys
            .iter()
            .map(|pubkey| match self.refusal_for(pubkey) {
                Some(already_signed) => SignOutcome::Refused { already_signed },
                None => SignOutcome::Signature(test_signature(*pubkey, 1)),
            })
            .collect())
    }

    async fn sign_block(
        &self,
        pubkey: PublicKeyBytes,
        _block: &BlockProposal,
    ) -> Result<SignatureBytes, SignerError> {
        if *self.refuse_blocks.lock() {
            return Err(SignerError::Refused {
                already_signed: false,
            });
        }
        if let Some(already_signed) = self.refusal_for(&pubkey) {
            return Err(SignerError::Refused { already_signed });
        }
        self.signed_blocks.fetch_add(1, Ordering::SeqCst);
        Ok(test_signature(pubkey, 2))
    }

    async fn sign_randao_reveal(
        &self,
        pubkey: PublicKeyBytes,
        _epoch: Epoch,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 3))
    }

    async fn sign_sync_committee_message(
        &self,
        pubkey: PublicKeyBytes,
        _slot: Slot,
        _beacon_block_root: Hash256,
    ) -> Result<SignatureBytes, SignerError> {
        match self.refusal_for(&pubkey) {
            Some(already_signed) => Err(SignerError::Refused { already_signed }),
            None => Ok(test_signature(pubkey, 4)),
        }
    }

    async fn sign_contribution_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        _message: &ContributionAndProof,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 5))
    }

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        _message: &AggregateAndProof,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 6))
    }

    async fn sign_slot(
        &self,
        pubkey: PublicKeyBytes,
        _slot: Slot,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 7))
    }

    async fn sign_sync_selection(
        &self,
        pubkey: PublicKeyBytes,
        _slot: Slot,
        _subcommittee_index: u64,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 8))
    }

    async fn sign_validator_registration(
        &self,
        pubkey: PublicKeyBytes,
        _registration: &ValidatorRegistration,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(test_signature(pubkey, 9))
    }
}

// -------- mock accounts --------

pub struct MockAccountProvider {
    accounts: Vec<ValidatingAccount>,
}

#[async_trait]
impl AccountProvider for MockAccountProvider {
    async fn validating_accounts(
        &self,
        _epoch: Epoch,
    ) -> Result<Vec<ValidatingAccount>, ApiError> {
        Ok(self.accounts.clone())
    }
}

// -------- harness --------

pub struct Harness {
    pub beacon_node: Arc<MockBeaconNode>,
    /// Alias of `beacon_node`, for tests that read as duty manipulation.
    pub duties: Arc<MockBeaconNode>,
    pub relays: Vec<Arc<MockRelay>>,
    pub signer: Arc<MockSigner>,
    pub chain_time: Arc<ManualChainTime>,
    pub duties_service: Arc<DutiesService<ManualChainTime>>,
    pub attestation_service: AttestationService<ManualChainTime>,
    pub block_service: BlockService<ManualChainTime>,
    pub sync_service: SyncCommitteeService<ManualChainTime>,
    pub preparation_service: PreparationService<ManualChainTime>,
    pub controller: Arc<Controller<ManualChainTime>>,
    pub prior_votes: Arc<RwLock<PriorBlockVotes>>,
    pub block_roots: Arc<BlockRootCache>,
    pub head_tracker: Arc<HeadTracker>,
    _shutdown: task_executor::Signal,
}

impl Harness {
    pub async fn refresh_duties(&self) {
        self.duties_service
            .refresh(Epoch::new(2))
            .await
            .expect("duty refresh succeeds in tests");
    }
}

pub async fn harness(accounts: Vec<ValidatingAccount>) -> Harness {
    harness_with_relays(accounts, vec![]).await
}

pub async fn harness_with_relays(
    accounts: Vec<ValidatingAccount>,
    relay_specs: Vec<RelaySpec>,
) -> Harness {
    let log = null_log();
    let spec = ChainSpec::mainnet();

    let chain_time = Arc::new(ManualChainTime::new(
        Duration::ZERO,
        Duration::from_secs(12),
        spec.slots_per_epoch,
    ));
    chain_time.set_slot(64);

    let beacon_node = Arc::new(MockBeaconNode::default());
    let beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>> = Arc::new(MultiEndpoint::new(
        vec![Endpoint::new(
            "mock_bn",
            1,
            beacon_node.clone() as Arc<dyn BeaconNodeApi>,
        )],
        log.clone(),
    ));

    let relays: Vec<Arc<MockRelay>> = relay_specs
        .iter()
        .map(|spec| Arc::new(MockRelay::with_bid(spec.bid.clone(), spec.failing)))
        .collect();
    let relay_endpoints: Vec<Endpoint<dyn RelayApi>> = relay_specs
        .iter()
        .zip(relays.iter())
        .map(|(spec, relay)| {
            Endpoint::new(
                spec.id.clone(),
                spec.weight,
                relay.clone() as Arc<dyn RelayApi>,
            )
        })
        .collect();
    let relay_multi: Arc<MultiEndpoint<dyn RelayApi>> =
        Arc::new(MultiEndpoint::new(relay_endpoints, log.clone()));

    let signer = Arc::new(MockSigner::default());
    let account_provider = Arc::new(MockAccountProvider { accounts });

    let duties_service = Arc::new(DutiesService::new(
        beacon_nodes.clone(),
        account_provider.clone() as Arc<dyn AccountProvider>,
        signer.clone() as Arc<dyn Signer>,
        chain_time.clone(),
        spec.clone(),
        Duration::from_secs(2),
        log.clone(),
    ));

    let prior_votes = Arc::new(RwLock::new(PriorBlockVotes::new()));
    let block_roots = Arc::new(BlockRootCache::new());
    let head_tracker = Arc::new(HeadTracker::new());
    let signing_permits = Arc::new(Semaphore::new(6));

    let selector = BestProposalSelector::new(
        beacon_nodes.clone(),
        relay_multi.clone(),
        prior_votes.clone(),
        block_roots.clone(),
        ScoringWeights::from_spec(&spec, 1.0),
        BidRanking::BidFirst,
        Uint256::from(10_000_000_000_000u64),
        log.clone(),
    );

    let attestation_service = AttestationService::new(
        duties_service.clone(),
        beacon_nodes.clone(),
        signer.clone() as Arc<dyn Signer>,
        chain_time.clone(),
        StrategyKind::First,
        StrategyKind::First,
        Timeouts::default(),
        Delays::default(),
        signing_permits.clone(),
        log.clone(),
    );

    let block_service = BlockService::new(
        duties_service.clone(),
        beacon_nodes.clone(),
        relay_multi.clone(),
        signer.clone() as Arc<dyn Signer>,
        chain_time.clone(),
        selector,
        head_tracker.clone(),
        None,
        true,
        Timeouts::default(),
        Delays::default(),
        signing_permits.clone(),
        log.clone(),
    );

    let sync_service = SyncCommitteeService::new(
        duties_service.clone(),
        beacon_nodes.clone(),
        signer.clone() as Arc<dyn Signer>,
        chain_time.clone(),
        StrategyKind::First,
        Timeouts::default(),
        Delays::default(),
        signing_permits,
        spec.clone(),
        log.clone(),
    );

    let preparation_service = PreparationService::new(
        duties_service.clone(),
        relay_multi.clone(),
        signer.clone() as Arc<dyn Signer>,
        Some(Address::repeat_byte(0x99)),
        30_000_000,
        log.clone(),
    );

    let (shutdown, exit) = task_executor::signal();
    let executor = TaskExecutor::new(tokio::runtime::Handle::current(), exit, log.clone());
    let scheduler = JobScheduler::new(executor.clone(), Duration::ZERO, log.clone());

    let controller = Arc::new(Controller {
        chain_time: chain_time.clone(),
        time_delay: Arc::new(TimeDelay::new(None, log.clone())),
        beacon_nodes,
        scheduler,
        duties_service: duties_service.clone(),
        attestation_service: attestation_service.clone(),
        block_service: block_service.clone(),
        sync_service: sync_service.clone(),
        preparation_service: preparation_service.clone(),
        prior_votes: prior_votes.clone(),
        block_roots: block_roots.clone(),
        head_tracker: head_tracker.clone(),
        delays: Delays::default(),
        reorg_awareness: true,
        executor,
        log,
    });

    Harness {
        duties: beacon_node.clone(),
        beacon_node,
        relays,
        signer,
        chain_time,
        duties_service,
        attestation_service,
        block_service,
        sync_service,
        preparation_service,
        controller,
        prior_votes,
        block_roots,
        head_tracker,
        _shutdown: shutdown,
    }
}
