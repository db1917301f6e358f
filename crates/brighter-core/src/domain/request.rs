//! Request model.
//!
//! A request is any value the command processor can route: a command (one
//! handler), an event (zero or more handlers) or a query (one handler that
//! fills in a result). Routing is keyed by the associated `TYPE` constant, the
//! same way the registries key everything else, so no runtime reflection is
//! needed.

use super::ids::RequestId;

/// Dispatch semantics of a request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Point-to-point. Exactly one handler.
    Command,
    /// Multicast. Any number of handlers, failures isolated.
    Event,
    /// Point-to-point with a result carried back in the request.
    Query,
}

impl RequestKind {
    /// Whether `send` must find exactly one handler.
    pub fn is_point_to_point(self) -> bool {
        !matches!(self, RequestKind::Event)
    }
}

/// A routable request.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct AddGreeting { id: RequestId, name: String, greeting: String }
///
/// impl Request for AddGreeting {
///     const TYPE: &'static str = "greetings.add_greeting";
///     const KIND: RequestKind = RequestKind::Command;
///     fn id(&self) -> RequestId { self.id }
/// }
/// ```
pub trait Request: Clone + Send + Sync + 'static {
    /// Stable routing name, unique per request type.
    const TYPE: &'static str;

    const KIND: RequestKind;

    fn id(&self) -> RequestId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_events_fan_out() {
        assert!(RequestKind::Command.is_point_to_point());
        assert!(RequestKind::Query.is_point_to_point());
        assert!(!RequestKind::Event.is_point_to_point());
    }
}
