//! IdGenerator port.
//!
//! Ids are ULIDs whose timestamp part comes from the injected [`Clock`], so a
//! `FixedClock` gives deterministic ordering in tests.

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{CorrelationId, MessageId, RequestId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn request_id(&self) -> RequestId;

    fn message_id(&self) -> MessageId;

    fn correlation_id(&self) -> CorrelationId;
}

pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn request_id(&self) -> RequestId {
        RequestId::from(self.next())
    }

    fn message_id(&self) -> MessageId {
        MessageId::from(self.next())
    }

    fn correlation_id(&self) -> CorrelationId {
        CorrelationId::from(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));

        let id1 = id_gen.message_id();
        let id2 = id_gen.message_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn timestamp_part_follows_the_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let id1 = id_gen.request_id();
        let id2 = id_gen.request_id();
        assert_ne!(id1, id2);

        let timestamp1 = (id1.as_ulid().0 >> 80) as u64;
        let timestamp2 = (id2.as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp1, timestamp2);
        assert_eq!(timestamp1, fixed_time.timestamp_millis() as u64);
    }
}
