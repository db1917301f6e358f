//! Runtime states of performers and the dispatcher.

use serde::{Deserialize, Serialize};

/// State of one performer.
///
/// - `Open`: receive loop running.
/// - `Shut`: stopped on request (stop signal or quit message).
/// - `Closed`: stopped on its own (crash, unacceptable limit, configuration error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    Open,
    Closed,
    Shut,
}

impl ConsumerState {
    pub fn is_running(self) -> bool {
        self == ConsumerState::Open
    }
}

/// Lifecycle of a dispatcher.
///
/// `NotReady` until it has at least one subscription, `Awaiting` until
/// `receive`, `Running` until `end`, then `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatcherState {
    NotReady,
    Awaiting,
    Running,
    Stopped,
}
