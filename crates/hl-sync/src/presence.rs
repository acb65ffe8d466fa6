//! Observing side: read and follow the subject's record.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use hl_core::{LocationRecord, SubjectId};
use hl_store::{ChangeFeed, StoreHandle};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Callback = Box<dyn FnMut(LocationRecord) + Send>;

/// Reads and follows one subject's record.
#[derive(Debug, Clone)]
pub struct PresenceClient {
    store: StoreHandle,
    subject: SubjectId,
}

impl PresenceClient {
    #[must_use]
    pub const fn new(store: StoreHandle, subject: SubjectId) -> Self {
        Self { store, subject }
    }

    #[must_use]
    pub const fn subject(&self) -> &SubjectId {
        &self.subject
    }

    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Current record, or `None` when unconfigured, missing or failed.
    /// Failures are logged.
    pub async fn get_latest(&self) -> Option<LocationRecord> {
        match self.store.select_one(&self.subject).await {
            Ok(record) => record,
            Err(err) => {
                warn!(subject = %self.subject, error = %err, "failed to read latest location");
                None
            }
        }
    }

    /// Follow the subject's record.
    ///
    /// `on_update` runs once per change notification, sequentially, in the
    /// order the store delivers them. When the store is unconfigured or the
    /// channel cannot be opened the subscription is inert. Must be called
    /// within a Tokio runtime.
    pub async fn subscribe<F>(&self, on_update: F) -> Subscription
    where
        F: FnMut(LocationRecord) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            callback: Mutex::new(Some(Box::new(on_update))),
            released: AtomicBool::new(false),
            invoker: Mutex::new(None),
        });

        let feed = match self.store.subscribe(&self.subject).await {
            Ok(feed) => feed,
            Err(err) => {
                warn!(subject = %self.subject, error = %err, "location subscription failed");
                ChangeFeed::inert()
            }
        };
        if feed.is_inert() {
            debug!(subject = %self.subject, "inert location subscription");
            return Subscription { shared, task: None };
        }

        let task = tokio::spawn(deliver(feed, Arc::clone(&shared)));
        Subscription {
            shared,
            task: Some(task),
        }
    }
}

/// State shared between a [`Subscription`] and its delivery task.
struct Shared {
    callback: Mutex<Option<Callback>>,
    released: AtomicBool,
    /// Thread currently running the callback.
    invoker: Mutex<Option<ThreadId>>,
}

async fn deliver(mut feed: ChangeFeed, shared: Arc<Shared>) {
    while let Some(record) = feed.recv().await {
        if !shared.invoke(record) {
            return;
        }
    }
}

impl Shared {
    /// Run the callback once. Returns `false` once the subscription is released.
    fn invoke(&self, record: LocationRecord) -> bool {
        let mut guard = self.callback.lock();
        if !self.released.load(Ordering::Acquire) {
            let Some(on_update) = guard.as_mut() else {
                return false;
            };
            *self.invoker.lock() = Some(thread::current().id());
            on_update(record);
            *self.invoker.lock() = None;
        }
        if !self.released.load(Ordering::Acquire) {
            return true;
        }
        // Dropped outside the lock: the callback may own a subscription.
        let callback = guard.take();
        drop(guard);
        drop(callback);
        false
    }
}

/// A live subscription. Dropping it unsubscribes.
///
/// The callback may own its subscription and unsubscribe (or drop it) from
/// inside an invocation; that invocation is the last.
pub struct Subscription {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Release the channel. Once this returns the callback is never invoked
    /// again; an invocation already running completes first. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.shared.released.store(true, Ordering::Release);
        let reentrant = *self.shared.invoker.lock() == Some(thread::current().id());
        if !reentrant {
            // Taking the callback waits for an in-progress invocation.
            let callback = self.shared.callback.lock().take();
            drop(callback);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the subscription can still deliver.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.shared.released.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
