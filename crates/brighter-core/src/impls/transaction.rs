//! InMemoryTransaction: a unit of work for the in-memory stores.
//!
//! Writes are staged as closures and applied in order on `commit`. Dropping
//! or rolling back the transaction discards them, so an outbox row staged
//! next to a business write becomes visible together with it or not at all.

use std::any::Any;

use parking_lot::Mutex;

use crate::ports::BoxTransaction;

type StagedWrite = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct InMemoryTransaction {
    staged: Mutex<Vec<StagedWrite>>,
}

impl InMemoryTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write to apply on commit.
    pub fn stage(&self, write: impl FnOnce() + Send + 'static) {
        self.staged.lock().push(Box::new(write));
    }

    pub fn pending(&self) -> usize {
        self.staged.lock().len()
    }

    /// Apply every staged write, in staging order. Returns how many ran.
    pub fn commit(self) -> usize {
        let staged = self.staged.into_inner();
        let applied = staged.len();
        for write in staged {
            write();
        }
        applied
    }

    pub fn rollback(self) {
        drop(self);
    }
}

impl BoxTransaction for InMemoryTransaction {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn commit_applies_in_order_and_rollback_discards() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let tx = InMemoryTransaction::new();
        for n in 0..3 {
            let log = Arc::clone(&log);
            tx.stage(move || log.lock().push(n));
        }
        assert_eq!(tx.pending(), 3);
        assert!(log.lock().is_empty());
        assert_eq!(tx.commit(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);

        let applied = Arc::new(AtomicUsize::new(0));
        let tx = InMemoryTransaction::new();
        {
            let applied = Arc::clone(&applied);
            tx.stage(move || {
                applied.fetch_add(1, Ordering::SeqCst);
            });
        }
        tx.rollback();
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }
}
