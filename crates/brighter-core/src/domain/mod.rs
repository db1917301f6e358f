//! Domain model: identifiers, requests, messages, routing metadata, states, errors.

pub mod duration_ms;
pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod publication;
pub mod request;
pub mod state;
pub mod subscription;

pub use self::errors::{BrighterError, ClearFailure, ErrorKind, HandlerFailure};
pub use self::ids::{CorrelationId, Id, IdMarker, MessageId, RequestId};
pub use self::message::{Message, MessageBody, MessageHeader, MessageType, RoutingKey};
pub use self::outcome::{Disposition, LoopControl, RejectionReason};
pub use self::publication::Publication;
pub use self::request::{Request, RequestKind};
pub use self::state::{ConsumerState, DispatcherState};
pub use self::subscription::{
    ChannelName, HandlerErrorPolicy, MessagePumpType, Subscription, SubscriptionName,
};

/// Crate-wide result alias.
pub type Result<T, E = BrighterError> = std::result::Result<T, E>;
