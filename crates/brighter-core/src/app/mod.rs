//! App: the runtime assembled from pipelines, policies and ports.
//!
//! # Components
//! - **CommandProcessorBuilder**: wiring and startup validation
//! - **CommandProcessor**: send / publish / deposit / clear / post
//! - **OutboxSweeper**: re-sends outbox messages nobody cleared
//! - **Dispatcher**: subscriptions, performer pools, scaling
//! - **MessagePump / Performer**: the per-channel receive loop and its task
//! - **HealthCheck**: dispatcher status summarized

pub mod builder;
pub mod command_processor;
pub mod dispatcher;
pub mod message_pump;
pub mod performer;
pub mod status;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{BuildError, CommandProcessorBuilder};
pub use self::command_processor::CommandProcessor;
pub use self::dispatcher::{Dispatcher, DispatcherBuilder};
pub use self::message_pump::MessagePump;
pub use self::performer::{Performer, PumpRun};
pub use self::status::{DispatcherStateItem, HealthCheck, HealthStatus, PerformerInformation};
pub use self::sweeper::{OutboxSweeper, SweepReport, SweeperConfig, SweeperHandle};
