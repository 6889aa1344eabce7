//! Production implementations of the provider traits over the standard HTTP
//! APIs: the beacon-node REST API, the builder-relay API and a remote-signer
//! API.
//!
//! Everything above this module is written against `crate::api`; nothing here
//! leaks out except the constructors.

mod accounts;
mod beacon;
mod relay;
mod signer;
mod sse;

pub use accounts::ConfiguredAccounts;
pub use beacon::BeaconNodeHttp;
pub use relay::RelayHttp;
pub use signer::RemoteSigner;

use crate::api::ApiError;
use types::Hash256;

/// Parse a 0x-prefixed 32-byte root.
fn parse_root(string: &str) -> Option<Hash256> {
    let bytes = types::serde_hex::decode(string).ok()?;
    (bytes.len() == 32).then(|| Hash256::from_slice(&bytes))
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else if error.is_connect() {
        ApiError::Unavailable(error.to_string())
    } else {
        ApiError::ServerMessage(error.to_string())
    }
}

fn decode_error(context: &str, error: impl std::fmt::Display) -> ApiError {
    ApiError::InvalidResponse(format!("{context}: {error}"))
}

/// Strip the `{version, data}` envelope that our fork-versioned types
/// serialize with, leaving the bare payload object the REST API expects.
fn unwrap_versioned(value: serde_json::Value) -> (Option<String>, serde_json::Value) {
    match value {
        serde_json::Value::Object(mut map) => {
            let version = map
                .get("version")
                .and_then(|version| version.as_str())
                .map(str::to_string);
            match (version, map.remove("data")) {
                (Some(version), Some(data)) => (Some(version), data),
                (version, data) => (version, data.unwrap_or(serde_json::Value::Object(map))),
            }
        }
        other => (None, other),
    }
}
