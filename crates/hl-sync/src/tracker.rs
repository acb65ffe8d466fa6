//! Observer state model.
//!
//! A [`PresenceTracker`] combines the initial read, the live subscription
//! and an optional periodic re-read into one [`PresenceState`], applying
//! every arrival through a single [`LatestLocation`] register.

use std::sync::Arc;
use std::time::Duration;

use hl_core::{ApplyOutcome, ApplyPolicy, Freshness, LatestLocation, LocationRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::presence::{PresenceClient, Subscription};

/// Tracker settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceOptions {
    /// How arrivals are weighed against the current record.
    pub policy: ApplyPolicy,
    /// Re-read the record this often, in case pushes are silently lost.
    #[serde(with = "opt_millis", rename = "resync_interval_ms")]
    pub resync_interval: Option<Duration>,
}

impl PresenceOptions {
    #[must_use]
    pub const fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Periodic re-read interval; a zero interval turns re-reads off.
    #[must_use]
    pub const fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }
}

/// What the observer currently knows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    /// Last applied record.
    pub record: Option<LocationRecord>,
    /// The store is configured and a read returned the subject's record.
    pub connected: bool,
    /// At least one record has been applied.
    pub tracking: bool,
    /// Arrivals applied so far.
    pub updates_applied: u64,
}

impl PresenceState {
    #[must_use]
    pub fn freshness(&self, now_ms: i64, stale_after: Duration) -> Freshness {
        self.record
            .as_ref()
            .map_or(Freshness::Unknown, |r| r.freshness(now_ms, stale_after))
    }
}

/// Where an arrival came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Read,
    Push,
    Resync,
}

#[derive(Debug)]
struct Register {
    latest: Mutex<LatestLocation>,
    state: watch::Sender<PresenceState>,
}

impl Register {
    fn offer(&self, record: LocationRecord, arrival: Arrival) {
        let mut latest = self.latest.lock();
        // A re-read that returns what is already shown changes nothing.
        if arrival == Arrival::Resync && latest.current() == Some(&record) {
            return;
        }
        let timestamp = record.timestamp;
        match latest.offer(record) {
            ApplyOutcome::Applied => {
                let current = latest.current().cloned();
                let applied = latest.applied();
                self.state.send_modify(|state| {
                    state.record = current;
                    state.tracking = true;
                    state.updates_applied = applied;
                    if arrival != Arrival::Push {
                        state.connected = true;
                    }
                });
            }
            ApplyOutcome::Superseded => {
                debug!(timestamp, ?arrival, "ignoring older location");
            }
        }
    }
}

/// Builds an observer session for one subject.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    client: PresenceClient,
    options: PresenceOptions,
}

impl PresenceTracker {
    #[must_use]
    pub const fn new(client: PresenceClient, options: PresenceOptions) -> Self {
        Self { client, options }
    }

    /// Subscribe, then read the current record, then start the optional
    /// re-read loop. Must be called within a Tokio runtime.
    pub async fn start(self) -> PresenceSession {
        let (state_tx, state_rx) = watch::channel(PresenceState::default());
        let register = Arc::new(Register {
            latest: Mutex::new(LatestLocation::new(self.options.policy)),
            state: state_tx,
        });

        let push_register = Arc::clone(&register);
        let subscription = self
            .client
            .subscribe(move |record| push_register.offer(record, Arrival::Push))
            .await;

        if let Some(record) = self.client.get_latest().await {
            register.offer(record, Arrival::Read);
        }
        let state = state_rx.borrow().clone();
        info!(
            subject = %self.client.subject(),
            backend = self.client.store().backend(),
            connected = state.connected,
            live = subscription.is_active(),
            "presence tracking started"
        );

        let resync = self
            .options
            .resync_interval
            .filter(|every| !every.is_zero())
            .map(|every| tokio::spawn(resync_loop(self.client.clone(), Arc::clone(&register), every)));

        PresenceSession {
            state: state_rx,
            subscription,
            resync,
        }
    }
}

async fn resync_loop(client: PresenceClient, register: Arc<Register>, every: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Some(record) = client.get_latest().await {
            register.offer(record, Arrival::Resync);
        }
    }
}

/// A running observer session. Dropping it stops tracking.
#[derive(Debug)]
pub struct PresenceSession {
    state: watch::Receiver<PresenceState>,
    subscription: Subscription,
    resync: Option<JoinHandle<()>>,
}

impl PresenceSession {
    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> PresenceState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every applied change.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<PresenceState> {
        self.state.clone()
    }

    /// Whether pushes are still being received.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.subscription.is_active()
    }

    /// Unsubscribe and end the re-read loop. Idempotent.
    pub fn stop(&mut self) {
        self.subscription.unsubscribe();
        if let Some(resync) = self.resync.take() {
            resync.abort();
        }
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}
