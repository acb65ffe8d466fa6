//! Sync client against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use hl_core::{PositionFix, SubjectId};
use hl_store::{MemoryStore, StoreHandle};
use hl_sync::{CancelHandle, CaptureError, ChannelSource, ReportStats, SyncClient};
use pretty_assertions::assert_eq;

fn fix(timestamp: i64) -> PositionFix {
    PositionFix {
        lat: -6.2088,
        lng: 106.8456,
        accuracy: 8.0,
        timestamp,
    }
}

fn subject() -> SubjectId {
    SubjectId::parse("mey").unwrap()
}

async fn wait_for(handle: &CancelHandle, done: impl Fn(&ReportStats) -> bool) -> ReportStats {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let stats = handle.stats();
            if done(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stats condition not reached")
}

#[tokio::test]
async fn fixes_are_published_in_order() {
    let memory = MemoryStore::new();
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(memory.clone()), subject(), Arc::new(source));
    let handle = client.start_reporting();

    tx.send(Ok(fix(1_000))).unwrap();
    tx.send(Ok(fix(2_000))).unwrap();
    let stats = wait_for(&handle, |s| s.published == 2).await;
    assert_eq!(stats.fixes, 2);
    assert_eq!(stats.publish_failures, 0);

    let store = StoreHandle::new(memory.clone());
    let row = store.select_one(&subject()).await.unwrap().unwrap();
    assert_eq!(row.timestamp, 2_000);
    assert_eq!((row.lat, row.lng, row.accuracy), (-6.2088, 106.8456, 8.0));
    assert_eq!(memory.len(), 1);
    assert_eq!(handle.last_fix(), Some(fix(2_000)));
}

#[tokio::test]
async fn publish_failures_do_not_stop_reporting() {
    let memory = MemoryStore::new();
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(memory.clone()), subject(), Arc::new(source));
    let handle = client.start_reporting();

    memory.set_unavailable(Some("offline"));
    tx.send(Ok(fix(1))).unwrap();
    wait_for(&handle, |s| s.publish_failures == 1).await;

    memory.set_unavailable(None);
    tx.send(Ok(fix(2))).unwrap();
    let stats = wait_for(&handle, |s| s.published == 1).await;
    assert_eq!(
        stats,
        ReportStats {
            fixes: 2,
            published: 1,
            publish_failures: 1,
            capture_errors: 0,
        }
    );
    assert!(!handle.is_finished());
}

#[tokio::test]
async fn capture_errors_are_counted_and_survived() {
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(MemoryStore::new()), subject(), Arc::new(source));
    let handle = client.start_reporting();

    tx.send(Err(CaptureError::Timeout(Duration::from_secs(10)))).unwrap();
    tx.send(Err(CaptureError::Unavailable("no signal".into()))).unwrap();
    tx.send(Ok(fix(3))).unwrap();
    let stats = wait_for(&handle, |s| s.published == 1).await;
    assert_eq!(stats.capture_errors, 2);
}

#[tokio::test]
async fn invalid_fixes_are_not_published() {
    let memory = MemoryStore::new();
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(memory.clone()), subject(), Arc::new(source));
    let handle = client.start_reporting();

    tx.send(Ok(PositionFix {
        lat: 123.0,
        ..fix(1)
    }))
    .unwrap();
    let stats = wait_for(&handle, |s| s.capture_errors == 1).await;
    assert_eq!(stats.published, 0);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn permission_denial_ends_the_session() {
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(MemoryStore::new()), subject(), Arc::new(source));
    let mut handle = client.start_reporting();

    tx.send(Err(CaptureError::PermissionDenied("user refused".into())))
        .unwrap();
    // A denying source ends its stream.
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), handle.finished())
        .await
        .unwrap();
    assert!(handle.is_finished());
    assert_eq!(handle.stats().capture_errors, 1);
}

#[tokio::test]
async fn unconfigured_store_still_captures_locally() {
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::unconfigured(), subject(), Arc::new(source));
    let handle = client.start_reporting();

    tx.send(Ok(fix(42))).unwrap();
    let stats = wait_for(&handle, |s| s.fixes == 1).await;
    assert_eq!(stats.publish_failures, 0);
    assert_eq!(handle.last_fix().map(|f| f.timestamp), Some(42));
}

#[tokio::test]
async fn cancel_releases_the_watch() {
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(MemoryStore::new()), subject(), Arc::new(source));
    let mut handle = client.start_reporting();

    tx.send(Ok(fix(1))).unwrap();
    wait_for(&handle, |s| s.published == 1).await;

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());
    let stats = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap();
    assert_eq!(stats.published, 1);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn dropping_the_handle_cancels() {
    let (source, tx) = ChannelSource::new();
    let client = SyncClient::new(StoreHandle::new(MemoryStore::new()), subject(), Arc::new(source));
    let handle = client.start_reporting();
    drop(handle);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !tx.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
