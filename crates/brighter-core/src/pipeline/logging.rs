use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::chain::{Decorator, Next};
use super::decoration::Timing;
use crate::domain::{BrighterError, Request};

/// Logs each request passing through, with timing.
pub struct RequestLoggingHandler {
    handler: String,
    timing: Timing,
}

impl RequestLoggingHandler {
    pub fn new(handler: impl Into<String>, timing: Timing) -> Self {
        Self {
            handler: handler.into(),
            timing,
        }
    }
}

#[async_trait]
impl<R: Request> Decorator<R> for RequestLoggingHandler {
    async fn handle(&self, request: R, next: Next<'_, R>) -> Result<R, BrighterError> {
        let request_id = request.id();
        let started = Instant::now();
        info!(
            request_type = R::TYPE,
            request_id = %request_id,
            handler = %self.handler,
            timing = ?self.timing,
            "handling request"
        );

        let result = next.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                request_type = R::TYPE,
                request_id = %request_id,
                handler = %self.handler,
                elapsed_ms,
                "request handled"
            ),
            Err(error) if error.is_defer() => debug!(
                request_type = R::TYPE,
                request_id = %request_id,
                handler = %self.handler,
                elapsed_ms,
                "request deferred"
            ),
            Err(error) => warn!(
                request_type = R::TYPE,
                request_id = %request_id,
                handler = %self.handler,
                elapsed_ms,
                error = %error,
                "request failed"
            ),
        }
        result
    }
}
