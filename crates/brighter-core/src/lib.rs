//! brighter-core
//!
//! Command and event dispatch for services: an in-process mediator with
//! decorator pipelines, a transactional outbox and a once-only inbox, and a
//! consumer runtime that pumps messages from broker channels into handlers.
//!
//! # Modules
//! - **domain**: ids, requests, messages, publications, subscriptions, states, errors
//! - **ports**: contracts for brokers, stores, mappers and clocks
//! - **pipeline**: handler traits, decorators, registry and the pipeline builder
//! - **policy**: retry, circuit breaker and timeout, looked up by name
//! - **app**: command processor, outbox sweeper, dispatcher, message pump, health
//! - **impls**: in-memory implementations of every port
//! - **config**: service activator configuration loaded from JSON

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod pipeline;
pub mod policy;
pub mod ports;

pub use self::app::{
    CommandProcessor, CommandProcessorBuilder, Dispatcher, DispatcherBuilder, HealthCheck,
    HealthStatus, OutboxSweeper,
};
pub use self::config::ServiceActivatorConfig;
pub use self::domain::{BrighterError, Request, RequestKind};
