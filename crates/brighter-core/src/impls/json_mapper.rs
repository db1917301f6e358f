//! JsonMessageMapper: serde_json mapping for any serializable request.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    BrighterError, Message, MessageBody, MessageHeader, MessageType, Publication, Request,
    RequestKind,
};
use crate::ports::{Clock, IdGenerator, MessageMapper, SystemClock, UlidGenerator};

/// Maps `R` to a JSON message body and back.
///
/// The message id is the request id, so a request deposited twice lands on
/// the same outbox row. Each message gets a fresh correlation id.
pub struct JsonMessageMapper<R> {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    _request: PhantomData<fn() -> R>,
}

impl<R> JsonMessageMapper<R> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            _request: PhantomData,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl<R> Default for JsonMessageMapper<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn message_type_of(kind: RequestKind) -> MessageType {
    match kind {
        RequestKind::Event => MessageType::Event,
        RequestKind::Command | RequestKind::Query => MessageType::Command,
    }
}

impl<R> MessageMapper<R> for JsonMessageMapper<R>
where
    R: Request + Serialize + DeserializeOwned,
{
    fn map_to_message(
        &self,
        request: &R,
        publication: &Publication,
    ) -> Result<Message, BrighterError> {
        let mut header = MessageHeader::new(
            request.id().retag(),
            publication.topic.clone(),
            message_type_of(R::KIND),
            self.clock.now(),
        )
        .with_correlation_id(self.ids.correlation_id());
        if let Some(reply_to) = &publication.reply_to {
            header = header.with_reply_to(reply_to.clone());
        }
        if let Some(partition_key) = &publication.partition_key {
            header = header.with_partition_key(partition_key.clone());
        }
        for (key, value) in &publication.default_headers {
            header = header.with_bag_item(key.clone(), value.clone());
        }

        let body = serde_json::to_vec(request)?;
        let mut message = Message::new(header, MessageBody::new(body));
        message.set_delayed(publication.delay);
        Ok(message)
    }

    fn map_to_request(&self, message: &Message) -> Result<R, BrighterError> {
        serde_json::from_slice(message.body.bytes()).map_err(|e| {
            BrighterError::Mapping(format!("{} from message {}: {e}", R::TYPE, message.id()))
        })
    }
}
