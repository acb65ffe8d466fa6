//! Reporting side: capture positions and publish them.

use std::sync::Arc;

use hl_core::{PositionFix, SubjectId};
use hl_store::StoreHandle;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::position::{PositionSource, PositionWatch, WatchOptions};

/// Counters for one reporting session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    /// Fixes received from the source.
    pub fixes: u64,
    /// Fixes the store accepted.
    pub published: u64,
    /// Fixes the store rejected or never received.
    pub publish_failures: u64,
    /// Capture errors reported by the source, plus fixes dropped as invalid.
    pub capture_errors: u64,
}

#[derive(Debug, Default)]
struct Shared {
    stats: Mutex<ReportStats>,
    last_fix: Mutex<Option<PositionFix>>,
}

/// Publishes the subject's position as the source reports it.
#[derive(Debug, Clone)]
pub struct SyncClient {
    store: StoreHandle,
    subject: SubjectId,
    source: Arc<dyn PositionSource>,
    options: WatchOptions,
}

impl SyncClient {
    #[must_use]
    pub fn new(store: StoreHandle, subject: SubjectId, source: Arc<dyn PositionSource>) -> Self {
        Self {
            store,
            subject,
            source,
            options: WatchOptions::default(),
        }
    }

    /// Override the watch options. High accuracy is requested by default.
    #[must_use]
    pub const fn with_watch_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Start continuous reporting.
    ///
    /// Each fix is upserted as the subject's record. Publish and capture
    /// failures are logged and counted; the session keeps running until it
    /// is cancelled or the source ends its stream. Must be called within a
    /// Tokio runtime.
    #[must_use = "dropping the handle stops reporting"]
    pub fn start_reporting(&self) -> CancelHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let shared = Arc::new(Shared::default());
        let watch = self.source.watch(self.options);

        if !self.store.is_configured() {
            warn!(subject = %self.subject, "store not configured; positions stay local");
        }
        info!(
            subject = %self.subject,
            source = self.source.name(),
            backend = self.store.backend(),
            "location sharing active"
        );

        let task = tokio::spawn(report_loop(
            self.store.clone(),
            self.subject.clone(),
            watch,
            Arc::clone(&shared),
            stop_rx,
        ));

        CancelHandle {
            stop: Some(stop_tx),
            task: Some(task),
            shared,
        }
    }
}

async fn report_loop(
    store: StoreHandle,
    subject: SubjectId,
    mut watch: PositionWatch,
    shared: Arc<Shared>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            _ = &mut stop => {
                info!(%subject, "location sharing stopped");
                return;
            }
            item = watch.next() => item,
        };

        let Some(item) = item else {
            warn!(%subject, "position source ended; sharing stopped");
            return;
        };

        let fix = match item {
            Ok(fix) => fix,
            Err(err) => {
                shared.stats.lock().capture_errors += 1;
                if err.is_terminal() {
                    error!(%subject, error = %err, "position capture denied");
                } else {
                    warn!(%subject, error = %err, "position capture failed");
                }
                continue;
            }
        };

        shared.stats.lock().fixes += 1;
        *shared.last_fix.lock() = Some(fix);

        let record = fix.into_record(subject.clone());
        if let Err(err) = record.validate() {
            shared.stats.lock().capture_errors += 1;
            warn!(%subject, error = %err, "dropping invalid fix");
            continue;
        }

        match store.upsert(&record).await {
            Ok(()) => {
                shared.stats.lock().published += 1;
                debug!(%subject, timestamp = record.timestamp, accuracy = record.accuracy, "location published");
            }
            Err(err) => {
                shared.stats.lock().publish_failures += 1;
                warn!(%subject, error = %err, retryable = err.is_retryable(), "location publish failed");
            }
        }
    }
}

/// Stops a reporting session. Dropping the handle cancels too.
#[derive(Debug)]
pub struct CancelHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Stop capturing and release the watch. A publish already in flight
    /// completes; nothing after it is captured. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.stop.is_none()
    }

    /// Whether the reporting task has exited (cancelled or source ended).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    #[must_use]
    pub fn stats(&self) -> ReportStats {
        *self.shared.stats.lock()
    }

    /// Most recent fix captured locally, published or not.
    #[must_use]
    pub fn last_fix(&self) -> Option<PositionFix> {
        *self.shared.last_fix.lock()
    }

    /// Wait for the reporting task to exit without cancelling it.
    /// Cancel-safe: dropping the future keeps the task attached.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            if let Err(err) = result {
                if err.is_panic() {
                    error!(error = %err, "reporting task panicked");
                }
            }
        }
    }

    /// Cancel and wait for the reporting task to exit.
    pub async fn join(mut self) -> ReportStats {
        self.cancel();
        self.finished().await;
        self.stats()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
