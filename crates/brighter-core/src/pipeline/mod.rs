//! Handler pipelines.
//!
//! A pipeline is the ordered chain of decorators around one handler. Shapes
//! are declared at registration time (see [`Decoration`]), computed once per
//! request type and direction by the [`PipelineBuilder`], and instantiated per
//! dispatch.

pub mod builder;
pub mod chain;
pub mod decoration;
pub mod handler;
pub mod inbox;
pub mod logging;
pub mod policy_handler;
pub mod registry;

use std::sync::Arc;

use crate::policy::PolicyRegistry;
use crate::ports::{Clock, Inbox, SystemClock};

pub use self::builder::{ChainDescriptor, Pipeline, PipelineBuilder};
pub use self::chain::{Decorator, Next};
pub use self::decoration::{Decoration, DecoratorContext, Timing};
pub use self::handler::{Flow, RequestHandler, SyncRequestHandler};
pub use self::inbox::{OnceOnlyAction, OnceOnlyGate, UseInboxHandler};
pub use self::logging::RequestLoggingHandler;
pub use self::policy_handler::PolicyHandler;
pub use self::registry::{HandlerRegistration, PipelineDirection, RegistryError, SubscriberRegistry};

/// Shared collaborators decorators are built from.
#[derive(Clone)]
pub struct PipelineServices {
    pub policies: Arc<PolicyRegistry>,
    pub inbox: Option<Arc<dyn Inbox>>,
    pub once_only: Arc<OnceOnlyGate>,
    pub clock: Arc<dyn Clock>,
}

impl PipelineServices {
    pub fn new(policies: Arc<PolicyRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies,
            inbox: None,
            once_only: Arc::new(OnceOnlyGate::new()),
            clock,
        }
    }

    pub fn with_inbox(mut self, inbox: Arc<dyn Inbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }
}

impl Default for PipelineServices {
    fn default() -> Self {
        Self::new(Arc::new(PolicyRegistry::with_defaults()), Arc::new(SystemClock))
    }
}
