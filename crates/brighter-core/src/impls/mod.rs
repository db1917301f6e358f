//! In-memory implementations of the ports.
//!
//! Used by the tests and the demo binary. Durable outboxes, inboxes and
//! broker transports belong in their own crates.

pub mod inmem_bus;
pub mod inmem_inbox;
pub mod inmem_outbox;
pub mod json_mapper;
pub mod transaction;

pub use self::inmem_bus::{DeadLetter, InMemoryBus, InMemoryChannel, InMemoryProducer};
pub use self::inmem_inbox::InMemoryInbox;
pub use self::inmem_outbox::InMemoryOutbox;
pub use self::json_mapper::JsonMessageMapper;
pub use self::transaction::InMemoryTransaction;
