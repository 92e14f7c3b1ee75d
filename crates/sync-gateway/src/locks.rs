//! Per-document write serialization
//!
//! Successive revisions of one document must be evaluated against the
//! revision actually committed before them, so commits to the same document
//! id run one at a time. Distinct documents never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Lock table keyed by document id
#[derive(Default)]
pub struct DocumentLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `doc_id`
    pub async fn lock(&self, doc_id: &str) -> DocumentGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(doc_id.to_string()).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        DocumentGuard {
            locks: self,
            doc_id: doc_id.to_string(),
            slot,
            guard: Some(guard),
        }
    }

    /// Number of documents currently locked or awaited
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one document; released on drop
pub struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    doc_id: String,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // Table, this guard's handle: nobody else is waiting
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.doc_id);
        }
    }
}
