use super::{decode_error, transport_error, unwrap_versioned};
use crate::api::{
    ApiError, AttesterDuty, BeaconNodeApi, BlockHeaderInfo, EventStream, EventTopic, ProposerDuty,
    SyncDuty,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use types::{
    Attestation, AttestationData, BeaconBlock, BlindedBeaconBlock, BlockProposal, ChainSpec,
    CommitteeIndex, Epoch, ForkName, Graffiti, Hash256, PublicKeyBytes, SignatureBytes,
    SignedAggregateAndProof, SignedBeaconBlock, SignedBlindedBeaconBlock,
    SignedContributionAndProof, Slot, SyncCommitteeContribution, SyncCommitteeMessage,
    ValidatorIndex,
};

/// A beacon node behind the standard REST API.
pub struct BeaconNodeHttp {
    client: reqwest::Client,
    server: String,
}

impl BeaconNodeHttp {
    pub fn new(server: &str, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("unable to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server)
    }

    async fn get_data(&self, path: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(body.get("data").cloned().unwrap_or(body))
    }

    /// As `get_data`, with 404 mapped to `None`.
    async fn get_optional(&self, path: &str) -> Result<Option<Value>, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::NO_CONTENT
        {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(Some(body.get("data").cloned().unwrap_or(body)))
    }

    /// GET returning the whole `{version, data}` envelope.
    async fn get_versioned(&self, path: &str) -> Result<(Option<String>, Value), ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(unwrap_versioned(body))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::ServerMessage(format!(
                "{path} returned {status}: {message}"
            )));
        }
        Ok(())
    }

    async fn post_for_data(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(body.get("data").cloned().unwrap_or(body))
    }

    fn decode<T: DeserializeOwned>(context: &str, value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|e| decode_error(context, e))
    }
}

fn parse_full_block(version: Option<String>, data: Value) -> Result<BlockProposal, ApiError> {
    let version = version.unwrap_or_default();
    let fork = match version.parse::<ForkName>() {
        Ok(fork) => fork,
        Err(_) => return Ok(BlockProposal::Unsupported { version }),
    };
    let block = match fork {
        ForkName::Base => BeaconBlock::Base(BeaconNodeHttp::decode("phase0 block", data)?),
        ForkName::Altair => BeaconBlock::Altair(BeaconNodeHttp::decode("altair block", data)?),
        ForkName::Bellatrix => {
            BeaconBlock::Bellatrix(BeaconNodeHttp::decode("bellatrix block", data)?)
        }
        ForkName::Capella => BeaconBlock::Capella(BeaconNodeHttp::decode("capella block", data)?),
        ForkName::Deneb => BeaconBlock::Deneb(BeaconNodeHttp::decode("deneb block", data)?),
    };
    Ok(BlockProposal::Full(block))
}

fn parse_blinded_block(version: Option<String>, data: Value) -> Result<BlockProposal, ApiError> {
    let version = version.unwrap_or_default();
    let fork = match version.parse::<ForkName>() {
        Ok(fork) => fork,
        Err(_) => return Ok(BlockProposal::Unsupported { version }),
    };
    let block = match fork {
        ForkName::Bellatrix => {
            BlindedBeaconBlock::Bellatrix(BeaconNodeHttp::decode("bellatrix blinded block", data)?)
        }
        ForkName::Capella => {
            BlindedBeaconBlock::Capella(BeaconNodeHttp::decode("capella blinded block", data)?)
        }
        ForkName::Deneb => {
            BlindedBeaconBlock::Deneb(BeaconNodeHttp::decode("deneb blinded block", data)?)
        }
        // Blinded blocks do not exist before the merge.
        ForkName::Base | ForkName::Altair => {
            return Ok(BlockProposal::Unsupported { version })
        }
    };
    Ok(BlockProposal::Blinded(block))
}

/// SSZ hash-tree-root of `AttestationData`, as the aggregate endpoint keys
/// aggregates.
pub(crate) fn attestation_data_root(data: &AttestationData) -> Hash256 {
    fn leaf_u64(value: u64) -> [u8; 32] {
        let mut leaf = [0u8; 32];
        leaf[..8].copy_from_slice(&value.to_le_bytes());
        leaf
    }

    fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(right);
        hasher.finalize().into()
    }

    fn checkpoint_root(epoch: Epoch, root: Hash256) -> [u8; 32] {
        hash_pair(&leaf_u64(epoch.as_u64()), root.as_fixed_bytes())
    }

    let zero = [0u8; 32];
    let leaves = [
        leaf_u64(data.slot.as_u64()),
        leaf_u64(data.index),
        *data.beacon_block_root.as_fixed_bytes(),
        checkpoint_root(data.source.epoch, data.source.root),
        checkpoint_root(data.target.epoch, data.target.root),
        zero,
        zero,
        zero,
    ];

    let level_one: Vec<[u8; 32]> = leaves
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect();
    let left = hash_pair(&level_one[0], &level_one[1]);
    let right = hash_pair(&level_one[2], &level_one[3]);
    Hash256::from(hash_pair(&left, &right))
}

#[async_trait]
impl BeaconNodeApi for BeaconNodeHttp {
    async fn spec(&self) -> Result<ChainSpec, ApiError> {
        let data = self.get_data("/eth/v1/config/spec").await?;
        let mut spec = ChainSpec::mainnet();

        let get_u64 = |key: &str| {
            data.get(key)
                .and_then(|value| value.as_str())
                .and_then(|value| value.parse::<u64>().ok())
        };
        if let Some(value) = get_u64("SLOTS_PER_EPOCH") {
            spec.slots_per_epoch = value;
        }
        if let Some(value) = get_u64("SECONDS_PER_SLOT") {
            spec.seconds_per_slot = value;
        }
        if let Some(value) = get_u64("SYNC_COMMITTEE_SIZE") {
            spec.sync_committee_size = value;
        }
        if let Some(value) = get_u64("TARGET_AGGREGATORS_PER_COMMITTEE") {
            spec.target_aggregators_per_committee = value;
        }
        spec.altair_fork_epoch = get_u64("ALTAIR_FORK_EPOCH").map(Epoch::new);
        spec.bellatrix_fork_epoch = get_u64("BELLATRIX_FORK_EPOCH").map(Epoch::new);
        spec.capella_fork_epoch = get_u64("CAPELLA_FORK_EPOCH").map(Epoch::new);
        spec.deneb_fork_epoch = get_u64("DENEB_FORK_EPOCH").map(Epoch::new);
        Ok(spec)
    }

    async fn genesis_time(&self) -> Result<Duration, ApiError> {
        let data = self.get_data("/eth/v1/beacon/genesis").await?;
        let genesis_time = data
            .get("genesis_time")
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| decode_error("genesis", "missing genesis_time"))?;
        Ok(Duration::from_secs(genesis_time))
    }

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<AttestationData, ApiError> {
        let data = self
            .get_data(&format!(
                "/eth/v1/validator/attestation_data?slot={slot}&committee_index={committee_index}"
            ))
            .await?;
        Self::decode("attestation data", data)
    }

    async fn produce_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError> {
        let mut path = format!("/eth/v2/validator/blocks/{slot}?randao_reveal={randao_reveal}");
        if let Some(graffiti) = graffiti {
            path.push_str(&format!("&graffiti={}", types::serde_hex::encode(graffiti.0)));
        }
        let (version, data) = self.get_versioned(&path).await?;
        parse_full_block(version, data)
    }

    async fn produce_blinded_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Graffiti>,
    ) -> Result<BlockProposal, ApiError> {
        let mut path =
            format!("/eth/v1/validator/blinded_blocks/{slot}?randao_reveal={randao_reveal}");
        if let Some(graffiti) = graffiti {
            path.push_str(&format!("&graffiti={}", types::serde_hex::encode(graffiti.0)));
        }
        let (version, data) = self.get_versioned(&path).await?;
        parse_blinded_block(version, data)
    }

    async fn submit_attestations(&self, attestations: &[Attestation]) -> Result<(), ApiError> {
        let body = serde_json::to_value(attestations)
            .map_err(|e| decode_error("attestations", e))?;
        self.post("/eth/v1/beacon/pool/attestations", &body).await
    }

    async fn submit_block(&self, block: &SignedBeaconBlock) -> Result<(), ApiError> {
        let (_, message) = unwrap_versioned(
            serde_json::to_value(&block.message).map_err(|e| decode_error("block", e))?,
        );
        let body = json!({ "message": message, "signature": block.signature });
        self.post("/eth/v1/beacon/blocks", &body).await
    }

    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<(), ApiError> {
        let (_, message) = unwrap_versioned(
            serde_json::to_value(&block.message).map_err(|e| decode_error("blinded block", e))?,
        );
        let body = json!({ "message": message, "signature": block.signature });
        self.post("/eth/v1/beacon/blinded_blocks", &body).await
    }

    async fn block_header_by_root(
        &self,
        root: Hash256,
    ) -> Result<Option<BlockHeaderInfo>, ApiError> {
        let data = self
            .get_optional(&format!("/eth/v1/beacon/headers/{root:?}"))
            .await?;
        data.map(decode_header).transpose()
    }

    async fn block_header_at_slot(
        &self,
        slot: Slot,
    ) -> Result<Option<BlockHeaderInfo>, ApiError> {
        let data = self
            .get_optional(&format!("/eth/v1/beacon/headers?slot={slot}"))
            .await?;
        let first = match data {
            Some(Value::Array(mut headers)) if !headers.is_empty() => headers.remove(0),
            _ => return Ok(None),
        };
        decode_header(first).map(Some)
    }

    async fn signed_beacon_block(
        &self,
        root: Hash256,
    ) -> Result<Option<SignedBeaconBlock>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/eth/v2/beacon/blocks/{root:?}")))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "blocks/{root:?} returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        let (version, data) = unwrap_versioned(body);
        let signature: SignatureBytes = Self::decode(
            "block signature",
            data.get("signature").cloned().unwrap_or(Value::Null),
        )?;
        let message = data.get("message").cloned().unwrap_or(Value::Null);
        match parse_full_block(version, message)? {
            BlockProposal::Full(message) => Ok(Some(SignedBeaconBlock { message, signature })),
            // A block of an unknown fork cannot be indexed for scoring.
            _ => Ok(None),
        }
    }

    async fn attester_duties(
        &self,
        epoch: Epoch,
        indices: &[ValidatorIndex],
    ) -> Result<Vec<AttesterDuty>, ApiError> {
        let body = Value::Array(
            indices
                .iter()
                .map(|index| Value::String(index.to_string()))
                .collect(),
        );
        let data = self
            .post_for_data(&format!("/eth/v1/validator/duties/attester/{epoch}"), &body)
            .await?;
        Self::decode("attester duties", data)
    }

    async fn proposer_duties(&self, epoch: Epoch) -> Result<Vec<ProposerDuty>, ApiError> {
        let data = self
            .get_data(&format!("/eth/v1/validator/duties/proposer/{epoch}"))
            .await?;
        Self::decode("proposer duties", data)
    }

    async fn sync_duties(
        &self,
        epoch: Epoch,
        indices: &[ValidatorIndex],
    ) -> Result<Vec<SyncDuty>, ApiError> {
        let body = Value::Array(
            indices
                .iter()
                .map(|index| Value::String(index.to_string()))
                .collect(),
        );
        let data = self
            .post_for_data(&format!("/eth/v1/validator/duties/sync/{epoch}"), &body)
            .await?;
        Self::decode("sync duties", data)
    }

    async fn validator_indices(
        &self,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<HashMap<PublicKeyBytes, ValidatorIndex>, ApiError> {
        let mut indices = HashMap::new();
        // Keep the query string bounded.
        for chunk in pubkeys.chunks(64) {
            let ids = chunk
                .iter()
                .map(|pubkey| pubkey.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let data = self
                .get_data(&format!("/eth/v1/beacon/states/head/validators?id={ids}"))
                .await?;
            let entries = match data {
                Value::Array(entries) => entries,
                _ => return Err(decode_error("validators", "expected an array")),
            };
            for entry in entries {
                let index = entry
                    .get("index")
                    .and_then(|value| value.as_str())
                    .and_then(|value| value.parse::<u64>().ok());
                let pubkey = entry
                    .get("validator")
                    .and_then(|validator| validator.get("pubkey"))
                    .and_then(|value| value.as_str())
                    .and_then(|value| PublicKeyBytes::from_hex(value).ok());
                if let (Some(index), Some(pubkey)) = (index, pubkey) {
                    indices.insert(pubkey, index);
                }
            }
        }
        Ok(indices)
    }

    async fn aggregate_attestation(
        &self,
        slot: Slot,
        data: &AttestationData,
    ) -> Result<Option<Attestation>, ApiError> {
        let root = attestation_data_root(data);
        let value = self
            .get_optional(&format!(
                "/eth/v1/validator/aggregate_attestation?slot={slot}&attestation_data_root={root:?}"
            ))
            .await?;
        value
            .map(|value| Self::decode("aggregate attestation", value))
            .transpose()
    }

    async fn submit_aggregate_and_proofs(
        &self,
        aggregates: &[SignedAggregateAndProof],
    ) -> Result<(), ApiError> {
        let body =
            serde_json::to_value(aggregates).map_err(|e| decode_error("aggregates", e))?;
        self.post("/eth/v1/validator/aggregate_and_proofs", &body)
            .await
    }

    async fn submit_sync_committee_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> Result<(), ApiError> {
        let body =
            serde_json::to_value(messages).map_err(|e| decode_error("sync messages", e))?;
        self.post("/eth/v1/beacon/pool/sync_committees", &body).await
    }

    async fn sync_committee_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, ApiError> {
        let value = self
            .get_optional(&format!(
                "/eth/v1/validator/sync_committee_contribution?slot={slot}&subcommittee_index={subcommittee_index}&beacon_block_root={beacon_block_root:?}"
            ))
            .await?;
        value
            .map(|value| Self::decode("sync contribution", value))
            .transpose()
    }

    async fn submit_contribution_and_proofs(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(contributions)
            .map_err(|e| decode_error("contributions", e))?;
        self.post("/eth/v1/validator/contribution_and_proofs", &body)
            .await
    }

    async fn subscribe_events(&self, topics: &[EventTopic]) -> Result<EventStream, ApiError> {
        let topic_list = topics
            .iter()
            .map(|topic| topic.to_string())
            .collect::<Vec<_>>()
            .join(",");
        // The events request must outlive the client-wide timeout.
        let response = self
            .client
            .get(self.url(&format!("/eth/v1/events?topics={topic_list}")))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(Duration::from_secs(86_400))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "events returned {}",
                response.status()
            )));
        }
        Ok(super::sse::event_stream(response))
    }
}

fn decode_header(value: Value) -> Result<BlockHeaderInfo, ApiError> {
    let root = value
        .get("root")
        .and_then(|root| root.as_str())
        .and_then(super::parse_root)
        .ok_or_else(|| decode_error("header", "missing root"))?;
    let message = value
        .get("header")
        .and_then(|header| header.get("message"))
        .ok_or_else(|| decode_error("header", "missing message"))?;
    let slot = message
        .get("slot")
        .and_then(|slot| slot.as_str())
        .and_then(|slot| slot.parse::<u64>().ok())
        .map(Slot::new)
        .ok_or_else(|| decode_error("header", "missing slot"))?;
    let parent_root = message
        .get("parent_root")
        .and_then(|root| root.as_str())
        .and_then(super::parse_root)
        .ok_or_else(|| decode_error("header", "missing parent root"))?;
    Ok(BlockHeaderInfo {
        root,
        slot,
        parent_root,
    })
}
