//! Consecutive-failure circuit breaker.
//!
//! ```text
//!            N consecutive failures
//!   Closed ─────────────────────────▶ Open
//!     ▲                                 │ cooldown elapsed,
//!     │ probe succeeds                  │ next caller becomes the probe
//!     │                                 ▼
//!     └──────────────────────────── HalfOpen ──probe fails──▶ Open
//! ```
//!
//! All state lives behind one mutex, so concurrent callers always observe and
//! update a consistent failure count.

use crate::metrics_defs::BREAKER_TRANSITIONS;
use parking_lot::Mutex;
use shared::counter;
use std::fmt;
use tokio::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug)]
enum Inner {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    // A single probe call is in flight
    HalfOpen,
}

/// Returned when the breaker refuses a call.
#[derive(Debug, PartialEq, Eq)]
pub struct BreakerOpen;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Current state as seen by the next caller. An open breaker whose
    /// cooldown has elapsed reports `HalfOpen`.
    pub fn state(&self) -> BreakerState {
        match *self.inner.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { until } if Instant::now() >= until => BreakerState::HalfOpen,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Asks for permission to call the dependency. The permit must be
    /// resolved with [`Permit::record`]; dropping it counts as a failure.
    pub fn try_acquire(&self) -> Result<Permit<'_>, BreakerOpen> {
        let mut inner = self.inner.lock();
        let probe = match *inner {
            Inner::Closed { .. } => false,
            Inner::Open { until } if Instant::now() >= until => {
                *inner = Inner::HalfOpen;
                self.transitioned(BreakerState::HalfOpen);
                true
            }
            Inner::Open { .. } | Inner::HalfOpen => return Err(BreakerOpen),
        };

        Ok(Permit {
            breaker: self,
            probe,
            recorded: false,
        })
    }

    fn on_outcome(&self, probe: bool, outcome: Outcome) {
        let mut inner = self.inner.lock();
        let next = match (&mut *inner, outcome) {
            (Inner::Closed { consecutive_failures }, Outcome::Success) => {
                *consecutive_failures = 0;
                None
            }
            (Inner::Closed { consecutive_failures }, Outcome::Failure) => {
                *consecutive_failures += 1;
                if *consecutive_failures < self.failure_threshold {
                    return;
                }
                tracing::warn!(
                    breaker = self.name,
                    failures = *consecutive_failures,
                    cooldown = ?self.cooldown,
                    "Opening circuit breaker"
                );
                Some(BreakerState::Open)
            }
            (Inner::HalfOpen, Outcome::Success) if probe => {
                tracing::info!(breaker = self.name, "Probe succeeded, closing circuit breaker");
                Some(BreakerState::Closed)
            }
            (Inner::HalfOpen, Outcome::Failure) if probe => {
                tracing::warn!(breaker = self.name, "Probe failed, reopening circuit breaker");
                Some(BreakerState::Open)
            }
            // Late results from calls admitted before the breaker opened do
            // not affect an open or probing breaker.
            _ => None,
        };

        if let Some(state) = next {
            *inner = match state {
                BreakerState::Closed => Inner::Closed {
                    consecutive_failures: 0,
                },
                BreakerState::Open => Inner::Open {
                    until: Instant::now() + self.cooldown,
                },
                BreakerState::HalfOpen => Inner::HalfOpen,
            };
            self.transitioned(state);
        }
    }

    fn transitioned(&self, state: BreakerState) {
        counter!(BREAKER_TRANSITIONS, "breaker" => self.name, "state" => state.to_string())
            .increment(1);
    }
}

/// Permission for a single call through the breaker.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    recorded: bool,
}

impl Permit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.on_outcome(self.probe, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // The call was abandoned, most likely by a timeout
        if !self.recorded {
            self.breaker.on_outcome(self.probe, Outcome::Failure);
        }
    }
}
