use std::sync::Arc;

use async_trait::async_trait;

use super::chain::{Decorator, Next};
use crate::domain::{BrighterError, Request};
use crate::policy::{execute_all, Policy, PolicyAction};

/// Runs the remainder of the chain under a stack of policies.
pub struct PolicyHandler {
    policies: Vec<Arc<Policy>>,
}

impl PolicyHandler {
    pub fn new(policies: Vec<Arc<Policy>>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl<R: Request> Decorator<R> for PolicyHandler {
    async fn handle(&self, request: R, next: Next<'_, R>) -> Result<R, BrighterError> {
        let action: &PolicyAction<'_, R> = &|| next.run(request.clone());
        execute_all(&self.policies, action).await
    }
}
