//! In-process record store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hl_core::{LocationRecord, SubjectId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{ChangeFeed, LocationStore, StoreError, StoreResult};

/// Map-backed store with per-subject change fan-out.
///
/// Every successful upsert notifies the subject's subscribers, in write
/// order, through unbounded channels (nothing is coalesced or dropped).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: HashMap<SubjectId, LocationRecord>,
    subscribers: Vec<Subscriber>,
    unavailable: Option<String>,
}

#[derive(Debug)]
struct Subscriber {
    subject: SubjectId,
    tx: mpsc::UnboundedSender<LocationRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable` until
    /// cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.inner.lock().unavailable = reason.map(str::to_string);
    }

    /// Emit a change notification without touching the stored row.
    ///
    /// Models a push that arrives out of band, e.g. a delayed notification
    /// for an older write.
    pub fn inject_change(&self, record: &LocationRecord) {
        self.inner.lock().notify(record);
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live subscriber count for `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &SubjectId) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner
            .subscribers
            .iter()
            .filter(|s| &s.subject == subject)
            .count()
    }
}

impl MemoryInner {
    fn check_available(&self) -> StoreResult<()> {
        match &self.unavailable {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn notify(&mut self, record: &LocationRecord) {
        self.subscribers.retain(|s| {
            if s.subject != record.subject_id {
                return !s.tx.is_closed();
            }
            s.tx.send(record.clone()).is_ok()
        });
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, record: &LocationRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner
            .rows
            .insert(record.subject_id.clone(), record.clone());
        inner.notify(record);
        debug!(subject = %record.subject_id, timestamp = record.timestamp, "memory upsert");
        Ok(())
    }

    async fn select_one(&self, subject: &SubjectId) -> StoreResult<Option<LocationRecord>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.rows.get(subject).cloned())
    }

    async fn subscribe(&self, subject: &SubjectId) -> StoreResult<ChangeFeed> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber {
            subject: subject.clone(),
            tx,
        });
        Ok(ChangeFeed::from_receiver(rx))
    }
}
