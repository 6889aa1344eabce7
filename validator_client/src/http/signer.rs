use super::transport_error;
use crate::api::{ApiError, SignOutcome, Signer, SignerError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use types::{
    AggregateAndProof, AttestationData, BlockProposal, ContributionAndProof, Epoch, Hash256,
    PublicKeyBytes, SignatureBytes, Slot, ValidatorRegistration,
};

/// A remote signing service speaking the web3signer-style JSON API.
///
/// The signer owns slashing protection: HTTP 412 means the request was
/// declined, and a response body mentioning a previous identical signature
/// marks the refusal as idempotent.
pub struct RemoteSigner {
    client: reqwest::Client,
    server: String,
}

impl RemoteSigner {
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

    async fn sign(
        &self,
        pubkey: PublicKeyBytes,
        body: Value,
    ) -> Result<SignatureBytes, SignerError> {
        let response = self
            .client
            .post(format!("{}/api/v1/eth2/sign/{pubkey}", self.server))
            .json(&body)
            .send()
            .await
            .map_err(|e| match transport_error(e) {
                ApiError::Timeout => SignerError::Unavailable("timed out".to_string()),
                other => SignerError::Unavailable(other.to_string()),
            })?;

        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            let message = response.text().await.unwrap_or_default();
            let already_signed = message.contains("already signed");
            return Err(SignerError::Refused { already_signed });
        }
        if !response.status().is_success() {
            return Err(SignerError::Failed(format!(
                "signer returned {}",
                response.status()
            )));
        }

        // Either bare hex or {"signature": "0x…"}.
        let text = response
            .text()
            .await
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        let hex = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map
                .get("signature")
                .and_then(|signature| signature.as_str())
                .map(str::to_string)
                .ok_or_else(|| SignerError::Failed("response missing signature".to_string()))?,
            Ok(Value::String(hex)) => hex,
            _ => text.trim().to_string(),
        };
        SignatureBytes::from_hex(&hex).map_err(SignerError::Failed)
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn sign_attestations(
        &self,
        data: &AttestationData,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<Vec<SignOutcome>, SignerError> {
        let mut outcomes = Vec::with_capacity(pubkeys.len());
        for pubkey in pubkeys {
            let body = json!({ "type": "ATTESTATION", "attestation": data });
            let outcome = match self.sign(*pubkey, body).await {
                Ok(signature) => SignOutcome::Signature(signature),
                Err(SignerError::Refused { already_signed }) => {
                    SignOutcome::Refused { already_signed }
                }
                Err(error) => SignOutcome::Failed(error.to_string()),
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn sign_block(
        &self,
        pubkey: PublicKeyBytes,
        block: &BlockProposal,
    ) -> Result<SignatureBytes, SignerError> {
        let block = serde_json::to_value(block)
            .map_err(|e| SignerError::Failed(format!("unable to encode block: {e}")))?;
        self.sign(pubkey, json!({ "type": "BLOCK_V2", "beacon_block": block }))
            .await
    }

    async fn sign_randao_reveal(
        &self,
        pubkey: PublicKeyBytes,
        epoch: Epoch,
    ) -> Result<SignatureBytes, SignerError> {
        self.sign(
            pubkey,
            json!({ "type": "RANDAO_REVEAL", "randao_reveal": { "epoch": epoch } }),
        )
        .await
    }

    async fn sign_sync_committee_message(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
        beacon_block_root: Hash256,
    ) -> Result<SignatureBytes, SignerError> {
        self.sign(
            pubkey,
            json!({
                "type": "SYNC_COMMITTEE_MESSAGE",
                "sync_committee_message": {
                    "slot": slot,
                    "beacon_block_root": beacon_block_root,
                },
            }),
        )
        .await
    }

    async fn sign_contribution_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        message: &ContributionAndProof,
    ) -> Result<SignatureBytes, SignerError> {
        let message = serde_json::to_value(message)
            .map_err(|e| SignerError::Failed(format!("unable to encode contribution: {e}")))?;
        self.sign(
            pubkey,
            json!({
                "type": "SYNC_COMMITTEE_CONTRIBUTION_AND_PROOF",
                "contribution_and_proof": message,
            }),
        )
        .await
    }

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: PublicKeyBytes,
        message: &AggregateAndProof,
    ) -> Result<SignatureBytes, SignerError> {
        let message = serde_json::to_value(message)
            .map_err(|e| SignerError::Failed(format!("unable to encode aggregate: {e}")))?;
        self.sign(
            pubkey,
            json!({ "type": "AGGREGATE_AND_PROOF", "aggregate_and_proof": message }),
        )
        .await
    }

    async fn sign_slot(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
    ) -> Result<SignatureBytes, SignerError> {
        self.sign(
            pubkey,
            json!({ "type": "AGGREGATION_SLOT", "aggregation_slot": { "slot": slot } }),
        )
        .await
    }

    async fn sign_sync_selection(
        &self,
        pubkey: PublicKeyBytes,
        slot: Slot,
        subcommittee_index: u64,
    ) -> Result<SignatureBytes, SignerError> {
        self.sign(
            pubkey,
            json!({
                "type": "SYNC_COMMITTEE_SELECTION_PROOF",
                "sync_aggregator_selection_data": {
                    "slot": slot,
                    "subcommittee_index": subcommittee_index.to_string(),
                },
            }),
        )
        .await
    }

    async fn sign_validator_registration(
        &self,
        pubkey: PublicKeyBytes,
        registration: &ValidatorRegistration,
    ) -> Result<SignatureBytes, SignerError> {
        let registration = serde_json::to_value(registration)
            .map_err(|e| SignerError::Failed(format!("unable to encode registration: {e}")))?;
        self.sign(
            pubkey,
            json!({ "type": "VALIDATOR_REGISTRATION", "validator_registration": registration }),
        )
        .await
    }
}
