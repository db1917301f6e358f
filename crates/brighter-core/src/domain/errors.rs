//! Error taxonomy.
//!
//! `BrighterError` is the one error type that crosses the pipeline, the
//! command processor and the message pump. `ErrorKind` classifies it so that
//! policies and the pump can react without matching on every variant:
//!
//! - `Configuration`: programmer error (missing handler, mapper, producer or
//!   policy). Fails fast, never retried.
//! - `Defer`: a handler asked for the message to be redelivered later. Not a
//!   failure; the pump requeues.
//! - `Mapping`: a message could not be turned into a request (or back).
//! - `Transient`: worth retrying (transport, storage, open circuit, timeout).
//! - `Permanent`: retrying will not help.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::ids::{MessageId, RequestId};

/// Operational classification of a [`BrighterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Defer,
    Mapping,
    Transient,
    Permanent,
}

#[derive(Debug, Error)]
pub enum BrighterError {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Leave the message on the channel and redeliver it later.
    #[error(
        "message deferred{}",
        .delay.map(|d| format!(" for {}ms", d.as_millis())).unwrap_or_default()
    )]
    Defer { delay: Option<Duration> },

    #[error("message mapping failed: {0}")]
    Mapping(String),

    #[error("handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request {request_id} already handled in context {context_key}")]
    OnceOnly {
        request_id: RequestId,
        context_key: String,
    },

    #[error("{} of {attempted} event handler(s) failed: {}", .failures.len(), join(.failures))]
    Publish {
        attempted: usize,
        failures: Vec<HandlerFailure>,
    },

    /// `cleared` counts the messages that were sent before or after the failures.
    #[error(
        "failed to clear {} outbox message(s), {cleared} sent: {}",
        .failures.len(),
        join(.failures)
    )]
    ClearOutbox {
        cleared: usize,
        failures: Vec<ClearFailure>,
    },

    #[error("producer failed to send: {0}")]
    Producer(String),

    #[error("channel failure: {0}")]
    ChannelFailure(String),

    #[error("channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("circuit {name} is open")]
    CircuitOpen { name: String },

    #[error("operation timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BrighterError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Ask for immediate redelivery.
    pub fn defer() -> Self {
        Self::Defer { delay: None }
    }

    /// Ask for redelivery after `delay`, if the transport can delay.
    pub fn defer_for(delay: Duration) -> Self {
        Self::Defer { delay: Some(delay) }
    }

    pub fn handler(handler: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Defer { .. } => ErrorKind::Defer,
            Self::Mapping(_) | Self::Json(_) => ErrorKind::Mapping,
            Self::Transient(_)
            | Self::Producer(_)
            | Self::ChannelFailure(_)
            | Self::Storage(_)
            | Self::CircuitOpen { .. }
            | Self::Timeout { .. }
            | Self::ClearOutbox { .. } => ErrorKind::Transient,
            Self::Handler { .. }
            | Self::OnceOnly { .. }
            | Self::Publish { .. }
            | Self::ConnectionLost(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_defer(&self) -> bool {
        self.kind() == ErrorKind::Defer
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// One failed subscriber inside a `publish` fan-out.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: BrighterError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.handler, self.error)
    }
}

/// One outbox entry that could not be sent.
#[derive(Debug)]
pub struct ClearFailure {
    pub message_id: MessageId,
    pub error: BrighterError,
}

impl fmt::Display for ClearFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.message_id, self.error)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
