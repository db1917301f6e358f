//! Message mapper port.
//!
//! A mapper turns a request into a wire message for a publication and back
//! again. Mappers come in a blocking and an async flavour; the registry stores
//! both behind [`AsyncMessageMapper`], wrapping blocking ones.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{BrighterError, Message, Publication, Request};

pub trait MessageMapper<R: Request>: Send + Sync {
    fn map_to_message(
        &self,
        request: &R,
        publication: &Publication,
    ) -> Result<Message, BrighterError>;

    fn map_to_request(&self, message: &Message) -> Result<R, BrighterError>;
}

#[async_trait]
pub trait AsyncMessageMapper<R: Request>: Send + Sync {
    async fn map_to_message(
        &self,
        request: &R,
        publication: &Publication,
    ) -> Result<Message, BrighterError>;

    async fn map_to_request(&self, message: &Message) -> Result<R, BrighterError>;
}

/// Runs a blocking mapper inline.
struct BlockingMapper<M>(M);

#[async_trait]
impl<R: Request, M: MessageMapper<R>> AsyncMessageMapper<R> for BlockingMapper<M> {
    async fn map_to_message(
        &self,
        request: &R,
        publication: &Publication,
    ) -> Result<Message, BrighterError> {
        self.0.map_to_message(request, publication)
    }

    async fn map_to_request(&self, message: &Message) -> Result<R, BrighterError> {
        self.0.map_to_request(message)
    }
}

/// Mappers keyed by `Request::TYPE`.
#[derive(Default)]
pub struct MessageMapperRegistry {
    mappers: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl MessageMapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: Request, M: MessageMapper<R> + 'static>(&mut self, mapper: M) {
        self.register_async::<R, _>(BlockingMapper(mapper));
    }

    pub fn register_async<R: Request, M: AsyncMessageMapper<R> + 'static>(&mut self, mapper: M) {
        let mapper: Arc<dyn AsyncMessageMapper<R>> = Arc::new(mapper);
        self.mappers.insert(R::TYPE, Box::new(mapper));
    }

    pub fn get<R: Request>(&self) -> Result<Arc<dyn AsyncMessageMapper<R>>, BrighterError> {
        self.mappers
            .get(R::TYPE)
            .and_then(|m| m.downcast_ref::<Arc<dyn AsyncMessageMapper<R>>>())
            .cloned()
            .ok_or_else(|| {
                BrighterError::configuration(format!(
                    "no message mapper registered for {}",
                    R::TYPE
                ))
            })
    }

    pub fn contains(&self, request_type: &str) -> bool {
        self.mappers.contains_key(request_type)
    }
}
