//! Ports: the contracts the core depends on.
//!
//! Each trait stands in for an external collaborator (a broker, an outbox or
//! inbox store, a DI container). The core only ever talks to these traits;
//! `impls` has in-memory versions of all of them.

pub mod channel;
pub mod clock;
pub mod handler_factory;
pub mod id_generator;
pub mod inbox;
pub mod mapper;
pub mod outbox;
pub mod producer;

pub use self::channel::{Channel, ChannelFactory};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::handler_factory::HandlerFactory;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::inbox::{Inbox, InboxRecord};
pub use self::mapper::{AsyncMessageMapper, MessageMapper, MessageMapperRegistry};
pub use self::outbox::{BoxTransaction, Outbox, OutboxEntry};
pub use self::producer::{MessageProducer, ProducerRegistry};
