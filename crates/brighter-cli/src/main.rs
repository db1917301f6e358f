//! brighter CLI: a smoke harness for brighter-core.
//!
//! Wires an in-memory bus, outbox and inbox into a command processor, a
//! dispatcher and an outbox sweeper, posts a few greetings and prints the
//! dispatcher status as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use brighter_core::app::{
    CommandProcessorBuilder, DispatcherBuilder, HealthCheck, OutboxSweeper,
};
use brighter_core::domain::{
    BrighterError, Publication, Request, RequestId, RequestKind, Subscription,
};
use brighter_core::impls::{
    InMemoryBus, InMemoryInbox, InMemoryOutbox, InMemoryProducer, JsonMessageMapper,
};
use brighter_core::pipeline::{
    Decoration, Flow, HandlerRegistration, OnceOnlyAction, RequestHandler, Timing,
};
use brighter_core::ports::SystemClock;
use brighter_core::ServiceActivatorConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "brighter")]
#[command(about = "Post greetings through an in-memory outbox and consume them", long_about = None)]
struct Args {
    /// Service activator configuration (JSON). Built-in defaults when absent.
    #[arg(long, env = "BRIGHTER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of greetings to post
    #[arg(long, default_value_t = 3)]
    count: usize,

    /// Stop after this many milliseconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddGreeting {
    id: RequestId,
    name: String,
    greeting: String,
}

impl Request for AddGreeting {
    const TYPE: &'static str = "greetings.add_greeting";
    const KIND: RequestKind = RequestKind::Command;

    fn id(&self) -> RequestId {
        self.id
    }
}

struct AddGreetingHandler {
    greeted: Arc<AtomicUsize>,
}

#[async_trait]
impl RequestHandler<AddGreeting> for AddGreetingHandler {
    async fn handle(&self, request: AddGreeting) -> Result<Flow<AddGreeting>, BrighterError> {
        let n = self.greeted.fetch_add(1, Ordering::SeqCst) + 1;
        info!(greeted = n, "{}, {}!", request.greeting, request.name);
        Ok(Flow::Continue(request))
    }
}

fn init_tracing() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(fmt::layer())
        .try_init();
}

fn default_config() -> ServiceActivatorConfig {
    ServiceActivatorConfig {
        subscriptions: vec![
            Subscription::new("greetings", "greetings.queue", "greetings", AddGreeting::TYPE)
                .with_no_of_performers(2)
                .with_timeout(Duration::from_millis(200)),
        ],
        publications: vec![Publication::new("greetings", AddGreeting::TYPE)],
        ..ServiceActivatorConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServiceActivatorConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => default_config(),
    };

    let bus = InMemoryBus::default();
    let outbox = Arc::new(InMemoryOutbox::new(Arc::new(SystemClock)));
    let greeted = Arc::new(AtomicUsize::new(0));

    let mut builder = CommandProcessorBuilder::new()
        .policies(config.policy_registry())
        .handle(
            HandlerRegistration::<AddGreeting>::of({
                let greeted = Arc::clone(&greeted);
                move || AddGreetingHandler {
                    greeted: Arc::clone(&greeted),
                }
            })
            .named("AddGreetingHandler")
            .decorate(Decoration::logging(1, Timing::Before))
            .decorate(Decoration::use_inbox(2, "greetings", true, OnceOnlyAction::Warn)),
        )?
        .mapper::<AddGreeting, _>(JsonMessageMapper::<AddGreeting>::new())
        .outbox(outbox.clone())
        .inbox(Arc::new(InMemoryInbox::new()))
        .expect_requests(&[AddGreeting::TYPE]);
    for publication in &config.publications {
        builder = builder
            .producer(
                publication.topic.clone(),
                Arc::new(InMemoryProducer::new(bus.clone())),
            )
            .publication(publication.clone());
    }
    let processor = Arc::new(builder.build()?);

    let mut dispatcher = DispatcherBuilder::new(Arc::clone(&processor), Arc::new(bus.clone()));
    for subscription in &config.subscriptions {
        if subscription.request_type != AddGreeting::TYPE {
            warn!(
                subscription = %subscription.name,
                request_type = %subscription.request_type,
                "no handler for subscription, skipping"
            );
            continue;
        }
        dispatcher = dispatcher.consumer::<AddGreeting>(subscription.clone());
    }
    let dispatcher = dispatcher.build()?;

    let sweeper = OutboxSweeper::new(Arc::clone(&processor), config.sweeper.clone()).spawn();
    dispatcher.receive().await?;

    for i in 0..args.count {
        let greeting = AddGreeting {
            id: RequestId::generate(),
            name: format!("guest {}", i + 1),
            greeting: "Hello".to_string(),
        };
        match processor.post(&greeting).await {
            Ok(id) => info!(message_id = %id, "greeting posted"),
            Err(e) if e.is_transient() => warn!(error = %e, "greeting left for the sweeper"),
            Err(e) => return Err(e.into()),
        }
    }

    match args.run_for_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => {
            info!("running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    let status = dispatcher.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!("{}", serde_json::to_string_pretty(&HealthCheck::evaluate(&status))?);
    let outstanding = processor.outstanding(Duration::ZERO, usize::MAX).await?;
    info!(
        greeted = greeted.load(Ordering::SeqCst),
        stored = outbox.len(),
        outstanding = outstanding.len(),
        "shutting down"
    );

    dispatcher.end().await?;
    sweeper.shutdown_and_join().await;
    Ok(())
}
