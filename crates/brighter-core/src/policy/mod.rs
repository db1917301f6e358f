//! Named resilience policies.
//!
//! Handlers and the outbox clear path refer to policies by name. Looking up a
//! name that was never registered is a configuration error; nothing ever runs
//! unprotected by accident.

pub mod circuit_breaker;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::domain::BrighterError;

pub use self::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use self::retry::RetryPolicy;

/// Retry policy the outbox clear path sends through.
pub const RETRY_POLICY: &str = "RETRYPOLICY";

/// Circuit breaker the outbox clear path sends through.
pub const CIRCUIT_BREAKER: &str = "CIRCUITBREAKER";

#[derive(Debug, Clone)]
pub enum Policy {
    Retry(RetryPolicy),
    CircuitBreaker(Arc<CircuitBreaker>),
    Timeout(Duration),
}

impl Policy {
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, BrighterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrighterError>>,
    {
        match self {
            Policy::Retry(retry) => retry.execute(operation).await,
            Policy::CircuitBreaker(breaker) => breaker.call(operation).await.map_err(Into::into),
            Policy::Timeout(after) => tokio::time::timeout(*after, operation())
                .await
                .map_err(|_| BrighterError::Timeout { after: *after })?,
        }
    }
}

/// Action run under a stack of policies.
pub type PolicyAction<'a, T> =
    dyn Fn() -> BoxFuture<'a, Result<T, BrighterError>> + Send + Sync + 'a;

/// Run `action` wrapped by `policies`, the first policy outermost.
pub fn execute_all<'a, T: Send + 'a>(
    policies: &'a [Arc<Policy>],
    action: &'a PolicyAction<'a, T>,
) -> BoxFuture<'a, Result<T, BrighterError>> {
    match policies.split_first() {
        None => action(),
        Some((first, rest)) => Box::pin(first.execute(move || execute_all(rest, action))),
    }
}

/// Policies by name.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<Policy>>,
}

impl PolicyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding a default `RETRY_POLICY` and `CIRCUIT_BREAKER`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add(RETRY_POLICY, Policy::Retry(RetryPolicy::default()));
        registry.add(
            CIRCUIT_BREAKER,
            Policy::CircuitBreaker(Arc::new(CircuitBreaker::new(
                CIRCUIT_BREAKER,
                CircuitBreakerConfig::default(),
            ))),
        );
        registry
    }

    /// Add or replace a policy.
    pub fn add(&mut self, name: impl Into<String>, policy: Policy) {
        self.policies.insert(name.into(), Arc::new(policy));
    }

    pub fn get(&self, name: &str) -> Result<Arc<Policy>, BrighterError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| BrighterError::configuration(format!("no policy registered as {name}")))
    }

    /// Resolve every name, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<Policy>>, BrighterError> {
        names.iter().map(|name| self.get(name)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn missing_policy_is_a_configuration_error() {
        let registry = PolicyRegistry::with_defaults();
        assert!(registry.contains(RETRY_POLICY));
        assert!(registry.contains(CIRCUIT_BREAKER));

        let err = registry.get("nope").unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_policy_cuts_slow_operations() {
        let policy = Policy::Timeout(Duration::from_millis(20));
        let result: Result<(), _> = policy
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(BrighterError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stacked_policies_run_the_action_under_each() {
        let mut registry = PolicyRegistry::new();
        registry.add("retry", Policy::Retry(RetryPolicy::new(3, Duration::from_millis(5))));
        registry.add("timeout", Policy::Timeout(Duration::from_secs(1)));
        let policies = registry
            .resolve(&["retry".to_string(), "timeout".to_string()])
            .unwrap();

        let calls = AtomicU32::new(0);
        let action: &PolicyAction<'_, u32> = &|| {
            Box::pin(async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(BrighterError::transient("first try fails"))
                } else {
                    Ok(n)
                }
            })
        };

        let result = execute_all(&policies, action).await.unwrap();
        assert_eq!(result, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
