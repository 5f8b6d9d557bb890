//! Reliability policies for downstream calls.
//!
//! The critical dependency goes through [`ResiliencePolicy`]: a bounded retry
//! loop where every attempt must pass the circuit breaker, all of it under a
//! single wall-clock timeout. Optional dependencies go through [`fail_open`],
//! which turns any failure into an empty result.

pub mod breaker;

use crate::config::ResilienceConfig;
use crate::errors::{CompositeError, Result};
use crate::metrics_defs::{CRITICAL_ATTEMPTS, OPTIONAL_FETCH_FAILED};
use crate::types::ResourceKind;
use breaker::{BreakerState, CircuitBreaker, Outcome};
use shared::counter;
use std::future::Future;
use std::time::Duration;

#[derive(Debug)]
pub struct ResiliencePolicy {
    name: &'static str,
    breaker: CircuitBreaker,
    retry_attempts: u32,
    retry_wait: Duration,
    timeout: Duration,
}

impl ResiliencePolicy {
    pub fn new(name: &'static str, config: &ResilienceConfig) -> Self {
        Self {
            name,
            breaker: CircuitBreaker::new(
                name,
                config.breaker_failure_threshold,
                config.breaker_cooldown(),
            ),
            retry_attempts: config.retry_attempts.max(1),
            retry_wait: config.retry_wait(),
            timeout: config.critical_timeout(),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Runs `op` under the policy.
    ///
    /// Only `DependencyUnavailable` is retried. A rejection by the open
    /// breaker fails immediately. `NotFound` and `InvalidInput` mean the
    /// dependency answered and count as successes for the breaker. If the
    /// whole sequence exceeds the timeout, the in-flight attempt is dropped
    /// and `Timeout` is returned.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, self.call_with_retry(op)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(dependency = self.name, timeout = ?self.timeout, "Critical call timed out");
                Err(CompositeError::Timeout(self.timeout))
            }
        }
    }

    async fn call_with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let permit = self.breaker.try_acquire().map_err(|_| {
                CompositeError::DependencyUnavailable(format!(
                    "Circuit breaker for {} is open",
                    self.name
                ))
            })?;

            counter!(CRITICAL_ATTEMPTS, "dependency" => self.name).increment(1);
            let result = op().await;
            permit.record(match &result {
                Err(e) if e.is_dependency_failure() => Outcome::Failure,
                _ => Outcome::Success,
            });

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    tracing::debug!(
                        dependency = self.name,
                        attempt,
                        error = %e,
                        "Critical call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_wait).await;
                }
                result => return result,
            }
        }
    }
}

/// Awaits an optional read, substituting an empty list for any failure.
pub async fn fail_open<T, Fut>(resource: ResourceKind, fetch: Fut) -> Vec<T>
where
    Fut: Future<Output = Result<Vec<T>>>,
{
    match fetch.await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(%resource, error = %e, "Optional read failed, continuing without it");
            counter!(OPTIONAL_FETCH_FAILED, "resource" => resource.as_str()).increment(1);
            Vec::new()
        }
    }
}
