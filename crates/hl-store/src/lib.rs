//! Location record store.
//!
//! The store holds one row per subject and emits a change notification on
//! every write. This crate defines the contract ([`LocationStore`]), the
//! injected handle clients share ([`StoreHandle`]), and two backends:
//!
//! - [`MemoryStore`]: in-process map with change fan-out
//! - [`RestStore`]: PostgREST over HTTP, with a Phoenix realtime channel for
//!   change notifications
//!
//! An unconfigured [`StoreHandle`] degrades every operation: writes are
//! skipped, reads return nothing and subscriptions never fire.

#![forbid(unsafe_code)]

mod config;
mod error;
mod memory;
pub mod realtime;
mod reconnect;
mod rest;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hl_core::{LocationRecord, SubjectId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use config::{RealtimeConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use reconnect::{ReconnectConfig, ReconnectHandler};
pub use rest::RestStore;

/// Contract every record store backend implements.
#[async_trait]
pub trait LocationStore: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Insert or replace the record for `record.subject_id`.
    async fn upsert(&self, record: &LocationRecord) -> StoreResult<()>;

    /// Point read for one subject.
    async fn select_one(&self, subject: &SubjectId) -> StoreResult<Option<LocationRecord>>;

    /// Open a change channel filtered to one subject. Notifications arrive
    /// in the order the backend emits them.
    async fn subscribe(&self, subject: &SubjectId) -> StoreResult<ChangeFeed>;
}

/// Receiving end of a change channel.
///
/// Dropping the feed releases the channel (and stops any task driving it).
#[derive(Debug)]
pub struct ChangeFeed {
    rx: Option<mpsc::UnboundedReceiver<LocationRecord>>,
    driver: Option<AbortOnDrop>,
}

impl ChangeFeed {
    /// A feed that never yields anything.
    #[must_use]
    pub const fn inert() -> Self {
        Self {
            rx: None,
            driver: None,
        }
    }

    #[must_use]
    pub const fn from_receiver(rx: mpsc::UnboundedReceiver<LocationRecord>) -> Self {
        Self {
            rx: Some(rx),
            driver: None,
        }
    }

    /// Feed whose notifications are produced by `driver`; the task is
    /// aborted when the feed is dropped.
    #[must_use]
    pub fn with_driver(rx: mpsc::UnboundedReceiver<LocationRecord>, driver: JoinHandle<()>) -> Self {
        Self {
            rx: Some(rx),
            driver: Some(AbortOnDrop(driver)),
        }
    }

    /// Next notification, or `None` once the channel is closed for good.
    pub async fn recv(&mut self) -> Option<LocationRecord> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.rx.is_none()
    }
}

#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Shared, explicitly constructed store connection.
///
/// Cheap to clone. `StoreHandle::unconfigured()` stands in when no
/// credentials were provided.
#[derive(Clone, Default)]
pub struct StoreHandle {
    inner: Option<Arc<dyn LocationStore>>,
}

impl StoreHandle {
    #[must_use]
    pub fn new(store: impl LocationStore + 'static) -> Self {
        Self {
            inner: Some(Arc::new(store)),
        }
    }

    #[must_use]
    pub const fn unconfigured() -> Self {
        Self { inner: None }
    }

    /// Build a handle from configuration. Missing credentials yield an
    /// unconfigured handle rather than an error.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidUrl` when credentials are present but the
    /// URL is unusable, or `StoreError::Http` if the HTTP client cannot be
    /// built.
    pub fn from_config(config: &StoreConfig, realtime: &RealtimeConfig) -> StoreResult<Self> {
        if !config.is_configured() {
            warn!("store credentials missing; location sync disabled");
            return Ok(Self::unconfigured());
        }
        Ok(Self::new(RestStore::new(config, realtime.clone())?))
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.inner.as_ref().map_or("unconfigured", |s| s.backend())
    }

    /// Upsert, or skip when unconfigured.
    ///
    /// # Errors
    /// Propagates backend errors from a configured store.
    pub async fn upsert(&self, record: &LocationRecord) -> StoreResult<()> {
        match &self.inner {
            Some(store) => store.upsert(record).await,
            None => {
                debug!(subject = %record.subject_id, "store not configured; location update skipped");
                Ok(())
            }
        }
    }

    /// Point read, or `None` when unconfigured.
    ///
    /// # Errors
    /// Propagates backend errors from a configured store.
    pub async fn select_one(&self, subject: &SubjectId) -> StoreResult<Option<LocationRecord>> {
        match &self.inner {
            Some(store) => store.select_one(subject).await,
            None => Ok(None),
        }
    }

    /// Change channel, or an inert feed when unconfigured.
    ///
    /// # Errors
    /// Propagates backend errors from a configured store.
    pub async fn subscribe(&self, subject: &SubjectId) -> StoreResult<ChangeFeed> {
        match &self.inner {
            Some(store) => store.subscribe(subject).await,
            None => Ok(ChangeFeed::inert()),
        }
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("backend", &self.backend())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LocationRecord {
        LocationRecord {
            subject_id: SubjectId::default(),
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
            timestamp: 4,
        }
    }

    #[tokio::test]
    async fn unconfigured_handle_degrades() {
        let handle = StoreHandle::unconfigured();
        assert!(!handle.is_configured());
        assert_eq!(handle.backend(), "unconfigured");
        handle.upsert(&record()).await.unwrap();
        assert!(handle.select_one(&SubjectId::default()).await.unwrap().is_none());
        let mut feed = handle.subscribe(&SubjectId::default()).await.unwrap();
        assert!(feed.is_inert());
        assert!(feed.recv().await.is_none());
    }

    #[test]
    fn from_config_without_credentials_is_unconfigured() {
        let handle =
            StoreHandle::from_config(&StoreConfig::default(), &RealtimeConfig::default()).unwrap();
        assert!(!handle.is_configured());
    }

    #[test]
    fn from_config_with_bad_url_fails() {
        let config = StoreConfig {
            url: Some("not a url".into()),
            anon_key: Some("key".into()),
            ..StoreConfig::default()
        };
        let err = StoreHandle::from_config(&config, &RealtimeConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));
    }
}
