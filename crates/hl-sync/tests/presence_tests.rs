//! Presence client and tracker against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hl_core::display::{LAST_UPDATE_PLACEHOLDER, format_last_update};
use hl_core::{ApplyPolicy, LocationRecord, SubjectId};
use hl_store::{ChangeFeed, LocationStore, MemoryStore, StoreHandle, StoreResult};
use hl_sync::{PresenceClient, PresenceOptions, PresenceState, PresenceTracker};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

fn subject() -> SubjectId {
    SubjectId::parse("mey").unwrap()
}

fn at(timestamp: i64) -> LocationRecord {
    LocationRecord {
        subject_id: subject(),
        lat: -6.2,
        lng: 106.8,
        accuracy: 5.0,
        timestamp,
    }
}

fn collector() -> (Arc<Mutex<Vec<i64>>>, impl FnMut(LocationRecord) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |record: LocationRecord| sink.lock().push(record.timestamp))
}

async fn wait_len(seen: &Mutex<Vec<i64>>, n: usize) {
    tokio::time::timeout(WAIT, async {
        while seen.lock().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("deliveries");
}

async fn wait_state(
    rx: &mut watch::Receiver<PresenceState>,
    done: impl Fn(&PresenceState) -> bool,
) -> PresenceState {
    let state = tokio::time::timeout(WAIT, rx.wait_for(|s| done(s)))
        .await
        .expect("state condition")
        .expect("tracker alive");
    state.clone()
}

#[tokio::test]
async fn never_reported_subject_has_no_record() {
    let client = PresenceClient::new(StoreHandle::new(MemoryStore::new()), subject());
    let latest = client.get_latest().await;
    assert_eq!(latest, None);
    assert_eq!(format_last_update(latest.as_ref()), LAST_UPDATE_PLACEHOLDER);
}

#[tokio::test]
async fn later_write_wins_on_read() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory);
    store.upsert(&at(1)).await.unwrap();
    store.upsert(&at(2)).await.unwrap();
    let client = PresenceClient::new(store, subject());
    assert_eq!(client.get_latest().await.map(|r| r.timestamp), Some(2));
}

#[tokio::test]
async fn read_failure_looks_like_no_record() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    store.upsert(&at(1)).await.unwrap();
    memory.set_unavailable(Some("down"));
    let client = PresenceClient::new(store, subject());
    assert_eq!(client.get_latest().await, None);
}

#[tokio::test]
async fn subscription_delivers_pushes_in_order() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    let client = PresenceClient::new(store.clone(), subject());
    let (seen, on_update) = collector();
    let _subscription = client.subscribe(on_update).await;

    store.upsert(&at(3)).await.unwrap();
    store.upsert(&at(1)).await.unwrap();
    store.upsert(&at(2)).await.unwrap();
    // Out-of-band duplicate: delivered as-is, no dedup.
    memory.inject_change(&at(2));

    wait_len(&seen, 4).await;
    assert_eq!(*seen.lock(), vec![3, 1, 2, 2]);
}

#[tokio::test]
async fn no_deliveries_after_unsubscribe() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    let client = PresenceClient::new(store.clone(), subject());
    let (seen, on_update) = collector();
    let mut subscription = client.subscribe(on_update).await;

    store.upsert(&at(1)).await.unwrap();
    wait_len(&seen, 1).await;

    subscription.unsubscribe();
    subscription.unsubscribe();
    assert!(!subscription.is_active());

    store.upsert(&at(2)).await.unwrap();
    memory.inject_change(&at(3));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock(), vec![1]);
    assert_eq!(memory.subscriber_count(&subject()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_can_drop_its_own_subscription() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    let client = PresenceClient::new(store.clone(), subject());

    let slot: Arc<Mutex<Option<hl_sync::Subscription>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let slot = Arc::clone(&slot);
        let seen = Arc::clone(&seen);
        client
            .subscribe(move |record: LocationRecord| {
                seen.lock().push(record.timestamp);
                let own = slot.lock().take();
                drop(own);
            })
            .await
    };
    *slot.lock() = Some(subscription);

    store.upsert(&at(1)).await.unwrap();
    wait_len(&seen, 1).await;
    store.upsert(&at(2)).await.unwrap();
    memory.inject_change(&at(3));

    tokio::time::timeout(WAIT, async {
        while memory.subscriber_count(&subject()) > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("feed released");
    assert_eq!(*seen.lock(), vec![1]);
    assert!(slot.lock().is_none());
}

#[tokio::test]
async fn unconfigured_subscription_is_inert() {
    let client = PresenceClient::new(StoreHandle::unconfigured(), subject());
    assert_eq!(client.get_latest().await, None);
    let (seen, on_update) = collector();
    let mut subscription = client.subscribe(on_update).await;
    assert!(!subscription.is_active());
    subscription.unsubscribe();
    drop(subscription);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn failed_subscribe_is_inert() {
    let memory = MemoryStore::new();
    memory.set_unavailable(Some("down"));
    let client = PresenceClient::new(StoreHandle::new(memory), subject());
    let (_seen, on_update) = collector();
    let subscription = client.subscribe(on_update).await;
    assert!(!subscription.is_active());
}

#[tokio::test]
async fn tracker_applies_initial_read_then_pushes() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    store.upsert(&at(10)).await.unwrap();

    let client = PresenceClient::new(store.clone(), subject());
    let session = PresenceTracker::new(client, PresenceOptions::default())
        .start()
        .await;
    let state = session.state();
    assert!(state.connected);
    assert!(state.tracking);
    assert_eq!(state.record.map(|r| r.timestamp), Some(10));
    assert!(session.is_live());

    let mut changes = session.changes();
    store.upsert(&at(20)).await.unwrap();
    let state = wait_state(&mut changes, |s| {
        s.record.as_ref().is_some_and(|r| r.timestamp == 20)
    })
    .await;
    assert_eq!(state.updates_applied, 2);
}

#[tokio::test]
async fn tracker_without_record_is_not_connected() {
    let client = PresenceClient::new(StoreHandle::new(MemoryStore::new()), subject());
    let session = PresenceTracker::new(client, PresenceOptions::default())
        .start()
        .await;
    assert_eq!(session.state(), PresenceState::default());
}

#[tokio::test]
async fn last_arrival_policy_applies_older_push() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    store.upsert(&at(10)).await.unwrap();
    let client = PresenceClient::new(store, subject());
    let session = PresenceTracker::new(client, PresenceOptions::default())
        .start()
        .await;

    let mut changes = session.changes();
    memory.inject_change(&at(5));
    let state = wait_state(&mut changes, |s| s.updates_applied == 2).await;
    assert_eq!(state.record.map(|r| r.timestamp), Some(5));
}

#[tokio::test]
async fn newer_timestamp_policy_ignores_older_push() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(memory.clone());
    store.upsert(&at(10)).await.unwrap();
    let client = PresenceClient::new(store, subject());
    let options = PresenceOptions::default().with_policy(ApplyPolicy::NewerTimestamp);
    let session = PresenceTracker::new(client, options).start().await;

    let mut changes = session.changes();
    memory.inject_change(&at(5));
    memory.inject_change(&at(15));
    let state = wait_state(&mut changes, |s| s.updates_applied == 2).await;
    assert_eq!(state.record.map(|r| r.timestamp), Some(15));
}

/// Store whose change channel never delivers.
#[derive(Debug)]
struct SilentPushes(MemoryStore);

#[async_trait]
impl LocationStore for SilentPushes {
    fn backend(&self) -> &'static str {
        "silent"
    }

    async fn upsert(&self, record: &LocationRecord) -> StoreResult<()> {
        self.0.upsert(record).await
    }

    async fn select_one(&self, subject: &SubjectId) -> StoreResult<Option<LocationRecord>> {
        self.0.select_one(subject).await
    }

    async fn subscribe(&self, _subject: &SubjectId) -> StoreResult<ChangeFeed> {
        Ok(ChangeFeed::inert())
    }
}

#[tokio::test]
async fn resync_recovers_lost_pushes() {
    let memory = MemoryStore::new();
    let store = StoreHandle::new(SilentPushes(memory.clone()));
    store.upsert(&at(1)).await.unwrap();

    let client = PresenceClient::new(store.clone(), subject());
    let options = PresenceOptions::default().with_resync_interval(Duration::from_millis(20));
    let mut session = PresenceTracker::new(client, options).start().await;
    assert!(!session.is_live());

    let mut changes = session.changes();
    store.upsert(&at(2)).await.unwrap();
    let state = wait_state(&mut changes, |s| {
        s.record.as_ref().is_some_and(|r| r.timestamp == 2)
    })
    .await;
    assert_eq!(state.updates_applied, 2);

    session.stop();
    store.upsert(&at(3)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(session.state().record.map(|r| r.timestamp), Some(2));
}
