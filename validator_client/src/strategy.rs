//! Fan-out of one logical request to N provider endpoints under a selection
//! policy and a deadline.
//!
//! Every policy issues the request to all endpoints concurrently. The
//! per-request timeout and the outer deadline are independent bounds; the
//! shorter one governs any individual call. Cancellation is by drop: when a
//! policy returns, in-flight requests are dropped and late results are
//! discarded without reaching the caller.

use crate::api::ApiError;
use crate::metrics;
use futures::stream::{FuturesUnordered, StreamExt};
use slog::{debug, Logger};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A provider endpoint with a preference weight. Higher weights win ties.
pub struct Endpoint<T: ?Sized> {
    id: String,
    weight: u64,
    inner: Arc<T>,
}

impl<T: ?Sized> Endpoint<T> {
    pub fn new(id: impl Into<String>, weight: u64, inner: Arc<T>) -> Self {
        Self {
            id: id.into(),
            weight,
            inner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

/// A successful response attributed to the endpoint that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selected<O> {
    pub value: O,
    pub provider: String,
}

#[derive(Debug)]
pub enum StrategyError {
    NoEndpoints,
    /// Every endpoint answered with an error.
    AllFailed(Vec<(String, ApiError)>),
    /// The outer deadline elapsed without a sufficient answer.
    DeadlineExpired,
    /// No value reached the majority threshold.
    NoMajority,
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StrategyError::NoEndpoints => write!(f, "no endpoints configured"),
            StrategyError::AllFailed(errors) => {
                write!(f, "all endpoints failed:")?;
                for (id, error) in errors {
                    write!(f, " {id} => {error};")?;
                }
                Ok(())
            }
            StrategyError::DeadlineExpired => write!(f, "deadline expired"),
            StrategyError::NoMajority => write!(f, "no majority among responses"),
        }
    }
}

/// A set of interchangeable endpoints behind the selection policies.
pub struct MultiEndpoint<T: ?Sized> {
    endpoints: Vec<Endpoint<T>>,
    log: Logger,
}

impl<T: ?Sized> MultiEndpoint<T> {
    /// Endpoints are kept in descending preference order.
    pub fn new(mut endpoints: Vec<Endpoint<T>>, log: Logger) -> Self {
        endpoints.sort_by(|a, b| b.weight.cmp(&a.weight));
        Self { endpoints, log }
    }

    pub fn endpoints(&self) -> &[Endpoint<T>] {
        &self.endpoints
    }

    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// Collect responses as they arrive, bounded by the per-request timeout
    /// and an optional outer deadline.
    ///
    /// `on_response` inspects each response and may finish the whole call
    /// early by returning `Some(output)`; in-flight requests are then
    /// dropped. Returning from this function is the only way a response
    /// escapes, so nothing arriving after the deadline is observable.
    async fn drive<'a, F, R, O, Out, H>(
        &'a self,
        timeout: Duration,
        deadline: Option<Instant>,
        func: F,
        mut on_response: H,
    ) -> Result<Out, DriveEnd>
    where
        F: Fn(&'a T) -> R,
        R: Future<Output = Result<O, ApiError>> + Send,
        H: FnMut(&'a Endpoint<T>, Result<O, ApiError>) -> Option<Out>,
    {
        let mut requests: FuturesUnordered<_> = self
            .endpoints
            .iter()
            .map(|endpoint| {
                let request = func(endpoint.inner.as_ref());
                async move {
                    metrics::inc_counter_vec(&metrics::ENDPOINT_REQUESTS, &[endpoint.id()]);
                    let result = match tokio::time::timeout(timeout, request).await {
                        Ok(result) => result,
                        Err(_) => Err(ApiError::Timeout),
                    };
                    (endpoint, result)
                }
            })
            .collect();

        let deadline_sleep = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => futures::future::pending().await,
            }
        };
        futures::pin_mut!(deadline_sleep);

        loop {
            tokio::select! {
                next = requests.next() => match next {
                    Some((endpoint, result)) => {
                        if result.is_err() {
                            metrics::inc_counter_vec(&metrics::ENDPOINT_ERRORS, &[endpoint.id()]);
                        }
                        if let Some(output) = on_response(endpoint, result) {
                            return Ok(output);
                        }
                    }
                    None => return Err(DriveEnd::Exhausted),
                },
                _ = &mut deadline_sleep => return Err(DriveEnd::Deadline),
            }
        }
    }

    /// Return the first non-error response, cancelling the rest.
    pub async fn first_success<'a, F, R, O>(
        &'a self,
        timeout: Duration,
        deadline: Option<Instant>,
        func: F,
    ) -> Result<Selected<O>, StrategyError>
    where
        F: Fn(&'a T) -> R,
        R: Future<Output = Result<O, ApiError>> + Send,
    {
        if self.endpoints.is_empty() {
            return Err(StrategyError::NoEndpoints);
        }

        let mut errors = Vec::new();
        let outcome = self
            .drive(timeout, deadline, func, |endpoint, result| match result {
                Ok(value) => Some(Selected {
                    value,
                    provider: endpoint.id().to_string(),
                }),
                Err(error) => {
                    errors.push((endpoint.id().to_string(), error));
                    None
                }
            })
            .await;

        match outcome {
            Ok(selected) => Ok(selected),
            Err(DriveEnd::Exhausted) => Err(StrategyError::AllFailed(errors)),
            Err(DriveEnd::Deadline) => Err(StrategyError::DeadlineExpired),
        }
    }

    /// Wait for the deadline (or every endpoint) and return the response with
    /// the highest score, preferring better-weighted endpoints on ties.
    pub async fn best_of<'a, F, R, O, S>(
        &'a self,
        timeout: Duration,
        deadline: Instant,
        func: F,
        score: S,
    ) -> Result<Selected<O>, StrategyError>
    where
        F: Fn(&'a T) -> R,
        R: Future<Output = Result<O, ApiError>> + Send,
        S: Fn(&O) -> f64,
    {
        if self.endpoints.is_empty() {
            return Err(StrategyError::NoEndpoints);
        }

        let mut errors = Vec::new();
        let mut best: Option<(f64, u64, Selected<O>)> = None;

        let outcome = self
            .drive(
                timeout,
                Some(deadline),
                func,
                |endpoint, result| -> Option<()> {
                    match result {
                        Ok(value) => {
                            let value_score = score(&value);
                            debug!(
                                self.log,
                                "Scored response";
                                "provider" => endpoint.id(),
                                "score" => value_score,
                            );
                            let better = best.as_ref().map_or(true, |(s, w, _)| {
                                value_score > *s || (value_score == *s && endpoint.weight() > *w)
                            });
                            if better {
                                best = Some((
                                    value_score,
                                    endpoint.weight(),
                                    Selected {
                                        value,
                                        provider: endpoint.id().to_string(),
                                    },
                                ));
                            }
                            None
                        }
                        Err(error) => {
                            errors.push((endpoint.id().to_string(), error));
                            None
                        }
                    }
                },
            )
            .await;

        debug_assert!(outcome.is_err(), "best_of never finishes early");
        match best {
            Some((_, _, selected)) => Ok(selected),
            None if errors.is_empty() => Err(StrategyError::DeadlineExpired),
            None => Err(StrategyError::AllFailed(errors)),
        }
    }

    /// Return the value reported by a strict majority of the configured
    /// endpoints, cancelling outstanding requests once the threshold is
    /// reached.
    pub async fn majority<'a, F, R, O>(
        &'a self,
        timeout: Duration,
        deadline: Instant,
        func: F,
    ) -> Result<Selected<O>, StrategyError>
    where
        F: Fn(&'a T) -> R,
        R: Future<Output = Result<O, ApiError>> + Send,
        O: PartialEq,
    {
        if self.endpoints.is_empty() {
            return Err(StrategyError::NoEndpoints);
        }
        let threshold = self.endpoints.len() / 2 + 1;

        let mut errors = Vec::new();
        // (value, count, best weight, first provider)
        let mut tallies: Vec<(O, usize, u64, String)> = Vec::new();

        let outcome = self
            .drive(timeout, Some(deadline), func, |endpoint, result| {
                match result {
                    Ok(value) => {
                        match tallies.iter_mut().find(|(seen, ..)| *seen == value) {
                            Some((_, count, weight, provider)) => {
                                *count += 1;
                                if endpoint.weight() > *weight {
                                    *weight = endpoint.weight();
                                    *provider = endpoint.id().to_string();
                                }
                                if *count >= threshold {
                                    return Some(());
                                }
                            }
                            None => {
                                let reached = threshold <= 1;
                                tallies.push((
                                    value,
                                    1,
                                    endpoint.weight(),
                                    endpoint.id().to_string(),
                                ));
                                if reached {
                                    return Some(());
                                }
                            }
                        }
                        None
                    }
                    Err(error) => {
                        errors.push((endpoint.id().to_string(), error));
                        None
                    }
                }
            })
            .await;

        let reached_threshold = outcome.is_ok();
        let winner = tallies
            .into_iter()
            .filter(|(_, count, ..)| reached_threshold || *count >= threshold)
            .max_by_key(|(_, count, weight, _)| (*count, *weight));

        match winner {
            Some((value, count, _, provider)) if count >= threshold => {
                Ok(Selected { value, provider })
            }
            _ if errors.len() == self.endpoints.len() => Err(StrategyError::AllFailed(errors)),
            _ => Err(StrategyError::NoMajority),
        }
    }

    /// Collect every non-error response until the deadline.
    pub async fn all<'a, F, R, O>(
        &'a self,
        timeout: Duration,
        deadline: Instant,
        func: F,
    ) -> Result<Vec<Selected<O>>, StrategyError>
    where
        F: Fn(&'a T) -> R,
        R: Future<Output = Result<O, ApiError>> + Send,
    {
        if self.endpoints.is_empty() {
            return Err(StrategyError::NoEndpoints);
        }

        let mut responses = Vec::new();
        let mut errors = Vec::new();

        let outcome = self
            .drive(
                timeout,
                Some(deadline),
                func,
                |endpoint, result| -> Option<()> {
                    match result {
                        Ok(value) => responses.push(Selected {
                            value,
                            provider: endpoint.id().to_string(),
                        }),
                        Err(error) => errors.push((endpoint.id().to_string(), error)),
                    }
                    None
                },
            )
            .await;

        debug_assert!(outcome.is_err(), "all never finishes early");
        if responses.is_empty() && !errors.is_empty() {
            return Err(StrategyError::AllFailed(errors));
        }
        Ok(responses)
    }
}

enum DriveEnd {
    /// Every endpoint responded or failed.
    Exhausted,
    /// The outer deadline fired.
    Deadline,
}
