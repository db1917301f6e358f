//! Strongly-typed identifiers.
//!
//! Every identifier is a ULID tagged with a zero-sized marker type, so a
//! `RequestId` can never be passed where a `MessageId` is expected even though
//! both are 128-bit values underneath. ULIDs sort by creation time, which keeps
//! outbox scans and log output in a natural order.
//!
//! On the wire an id is the bare 26-character ULID string; `Display` adds a
//! type prefix (`req-`, `msg-`, `corr-`) for logs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for each identifier family.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display`.
    fn prefix() -> &'static str;
}

/// Generic identifier. `T` only exists at compile time.
#[repr(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock and thread rng.
    ///
    /// Components that need deterministic timestamps should go through an
    /// [`IdGenerator`](crate::ports::IdGenerator) instead.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Re-tag the same ULID as a different id family.
    ///
    /// Mappers use this to give an outgoing message the id of the request it
    /// carries, which is what lets the inbox deduplicate redeliveries.
    pub fn retag<U: IdMarker>(self) -> Id<U> {
        Id::from_ulid(self.ulid)
    }
}

impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    /// Accepts both the bare ULID and the prefixed display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.ulid.to_string())
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestMarker {}

impl IdMarker for RequestMarker {
    fn prefix() -> &'static str {
        "req-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageMarker {}

impl IdMarker for MessageMarker {
    fn prefix() -> &'static str {
        "msg-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorrelationMarker {}

impl IdMarker for CorrelationMarker {
    fn prefix() -> &'static str {
        "corr-"
    }
}

/// Identity of one request instance (command, event or query).
pub type RequestId = Id<RequestMarker>;

/// Identity of a message on the bus and in the outbox.
pub type MessageId = Id<MessageMarker>;

/// Ties replies and follow-up messages to the message that caused them.
pub type CorrelationId = Id<CorrelationMarker>;
