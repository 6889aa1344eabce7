use super::{decode_error, transport_error, unwrap_versioned};
use crate::api::{ApiError, RelayApi};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use types::{
    ExecutionPayload, Hash256, PublicKeyBytes, SignedBlindedBeaconBlock, SignedBuilderBid,
    SignedValidatorRegistration, Slot,
};

/// A builder relay behind the standard builder API.
pub struct RelayHttp {
    client: reqwest::Client,
    server: String,
}

impl RelayHttp {
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
}

#[async_trait]
impl RelayApi for RelayHttp {
    async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/eth/v1/builder/validators"))
            .json(registrations)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "validators returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_header(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
    ) -> Result<Option<SignedBuilderBid>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!(
                "/eth/v1/builder/header/{slot}/{parent_hash:?}/{pubkey}"
            )))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NO_CONTENT
            || response.status() == reqwest::StatusCode::NOT_FOUND
        {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "header returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        let (_, data) = unwrap_versioned(body);
        serde_json::from_value(data)
            .map(Some)
            .map_err(|e| decode_error("builder bid", e))
    }

    async fn submit_blinded_block(
        &self,
        block: &SignedBlindedBeaconBlock,
    ) -> Result<ExecutionPayload, ApiError> {
        let (_, message) = unwrap_versioned(
            serde_json::to_value(&block.message).map_err(|e| decode_error("blinded block", e))?,
        );
        let body = json!({ "message": message, "signature": block.signature });
        let response = self
            .client
            .post(self.url("/eth/v1/builder/blinded_blocks"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ServerMessage(format!(
                "blinded_blocks returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport_error)?;
        let (_, data) = unwrap_versioned(body);
        serde_json::from_value(data).map_err(|e| decode_error("execution payload", e))
    }
}
