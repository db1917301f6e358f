//! What happened to one received message.
//!
//! The pump computes a `Disposition` for every message and then applies it to
//! the channel. Keeping the decision separate from the side effect makes the
//! per-message state machine testable without a transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a message was sent to the dead-letter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Could not be read or mapped to a request.
    Unacceptable,
    /// A handler failed and the subscription does not retry.
    DeliveryError,
    /// Deferred more often than the subscription allows.
    RequeueLimitExceeded,
}

/// Channel action for a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled; acknowledge.
    Acknowledge,
    /// Leave for redelivery after `delay`.
    Requeue { delay: Duration },
    /// Dead-letter.
    Reject(RejectionReason),
}

/// What the receive loop does after applying a disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// Stop on request; performer ends `Shut`.
    Quit,
    /// Stop on a fault; performer ends `Closed`.
    Close,
}
