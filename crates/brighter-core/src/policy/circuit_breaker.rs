//! Circuit breaker.
//!
//! Three states: `Closed` (calls pass), `Open` (calls fail fast until the
//! break duration elapses) and `HalfOpen` (a few trial calls decide whether to
//! close again). Deferrals and configuration or mapping errors say nothing
//! about the health of the downstream and are not counted.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{duration_ms, BrighterError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before trial calls are allowed.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Successful trial calls needed to close again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error(transparent)]
    OperationFailed(BrighterError),
}

impl From<CircuitBreakerError> for BrighterError {
    fn from(error: CircuitBreakerError) -> Self {
        match error {
            CircuitBreakerError::CircuitOpen { component } => {
                BrighterError::CircuitOpen { name: component }
            }
            CircuitBreakerError::OperationFailed(e) => e,
        }
    }
}

#[derive(Debug, Default)]
struct Bookkeeping {
    consecutive_failures: u32,
    half_open_calls: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    total_calls: u64,
    failure_count: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    books: Mutex<Bookkeeping>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "circuit breaker initialized"
        );
        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            books: Mutex::new(Bookkeeping::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BrighterError>>,
    {
        if !self.allow_call() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) if counts_as_failure(e) => self.record_failure(),
            Err(_) => self.release_trial(),
        }
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn allow_call(&self) -> bool {
        let mut books = self.books.lock();
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = books
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut books, CircuitState::HalfOpen);
                    books.half_open_calls = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if books.half_open_calls < self.config.success_threshold {
                    books.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut books = self.books.lock();
        books.total_calls += 1;
        match self.state() {
            CircuitState::HalfOpen => {
                books.half_open_successes += 1;
                if books.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut books, CircuitState::Closed);
                }
            }
            CircuitState::Closed => books.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut books = self.books.lock();
        books.total_calls += 1;
        books.failure_count += 1;
        match self.state() {
            CircuitState::Closed => {
                books.consecutive_failures += 1;
                if books.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut books, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut books, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// A trial call ended with an error that says nothing about health; free its slot.
    fn release_trial(&self) {
        let mut books = self.books.lock();
        if self.state() == CircuitState::HalfOpen {
            books.half_open_calls = books.half_open_calls.saturating_sub(1);
        }
    }

    fn transition(&self, books: &mut Bookkeeping, to: CircuitState) {
        self.state.store(to as u8, Ordering::Release);
        books.half_open_calls = 0;
        books.half_open_successes = 0;
        match to {
            CircuitState::Open => {
                books.opened_at = Some(Instant::now());
                warn!(
                    component = %self.name,
                    consecutive_failures = books.consecutive_failures,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                info!(component = %self.name, "circuit breaker half-open");
            }
            CircuitState::Closed => {
                books.consecutive_failures = 0;
                books.opened_at = None;
                info!(
                    component = %self.name,
                    total_calls = books.total_calls,
                    "circuit breaker closed"
                );
            }
        }
    }

    /// Force the circuit open, e.g. during a known outage.
    pub fn isolate(&self) {
        let mut books = self.books.lock();
        self.transition(&mut books, CircuitState::Open);
    }

    pub fn reset(&self) {
        let mut books = self.books.lock();
        self.transition(&mut books, CircuitState::Closed);
    }
}

fn counts_as_failure(error: &BrighterError) -> bool {
    matches!(error.kind(), ErrorKind::Transient | ErrorKind::Permanent)
}
