//! The interfaces this client consumes, as traits.
//!
//! Beacon nodes, builder relays, the signer and the account source are
//! external collaborators. Everything above this module is written against
//! these traits; the `crate::http` module provides the production
//! implementations and tests provide in-memory ones.

mod accounts;
mod beacon;
mod relay;
mod signer;

pub use accounts::{AccountProvider, ValidatingAccount};
pub use beacon::{
    AttesterDuty, BeaconNodeApi, BlockHeaderInfo, ChainReorgEvent, EventKind, EventStream,
    EventTopic, FinalizedCheckpointEvent, HeadEvent, ProposerDuty, SyncDuty,
};
pub use relay::RelayApi;
pub use signer::{SignOutcome, Signer, SignerError};

use std::fmt;

/// An error from a provider endpoint.
///
/// Providers are interchangeable; the strategy runner only distinguishes
/// "this one did not answer usefully" from "this one timed out", so the
/// taxonomy stays shallow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The endpoint could not be reached or returned a transport-level error.
    Unavailable(String),
    /// The endpoint answered with something this client cannot use.
    InvalidResponse(String),
    /// The endpoint rejected the request.
    ServerMessage(String),
    /// The per-request timeout elapsed.
    Timeout,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::Unavailable(msg) => write!(f, "endpoint unavailable: {msg}"),
            ApiError::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            ApiError::ServerMessage(msg) => write!(f, "server error: {msg}"),
            ApiError::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for ApiError {}
