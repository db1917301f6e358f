//! Service activator configuration.
//!
//! Everything a host needs to wire a dispatcher from a file: subscriptions,
//! publications, the default policies and the outbox sweeper. Durations are
//! given in milliseconds (`*_ms`); every section may be left out.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::SweeperConfig;
use crate::domain::{BrighterError, Publication, Subscription, SubscriptionName};
use crate::policy::{
    CIRCUIT_BREAKER, CircuitBreaker, CircuitBreakerConfig, Policy, PolicyRegistry, RETRY_POLICY,
    RetryPolicy,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceActivatorConfig {
    pub subscriptions: Vec<Subscription>,
    pub publications: Vec<Publication>,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub sweeper: SweeperConfig,
}

impl ServiceActivatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BrighterError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BrighterError::configuration(format!("invalid configuration: {e}")))?;
        config
            .retry
            .validate()
            .map_err(|e| BrighterError::configuration(format!("invalid configuration: {e}")))?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BrighterError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            BrighterError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn subscription(&self, name: &SubscriptionName) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| &s.name == name)
    }

    /// `RETRY_POLICY` and `CIRCUIT_BREAKER` built from this configuration.
    pub fn policy_registry(&self) -> PolicyRegistry {
        let mut registry = PolicyRegistry::new();
        registry.add(RETRY_POLICY, Policy::Retry(self.retry.clone()));
        registry.add(
            CIRCUIT_BREAKER,
            Policy::CircuitBreaker(std::sync::Arc::new(CircuitBreaker::new(
                CIRCUIT_BREAKER,
                self.circuit_breaker.clone(),
            ))),
        );
        registry
    }
}
