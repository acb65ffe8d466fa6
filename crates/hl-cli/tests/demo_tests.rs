//! End-to-end run of the in-process demo.

use std::io::Write;
use std::time::Duration;

use hl_cli::AppContext;
use hl_cli::commands::demo::{self, DemoArgs};

#[tokio::test]
async fn demo_replays_track_to_completion() {
    let mut track = tempfile::NamedTempFile::new().unwrap();
    writeln!(track, r#"{{"lat": -6.2000, "lng": 106.8166, "accuracy": 12.0}}"#).unwrap();
    writeln!(track, r#"{{"lat": -6.2010, "lng": 106.8170, "accuracy": 9.5}}"#).unwrap();
    writeln!(track, r#"{{"lat": -6.2020, "lng": 106.8175, "accuracy": 7.0}}"#).unwrap();

    let args = DemoArgs {
        replay: track.path().to_path_buf(),
        interval_ms: Some(10),
        annotate: true,
    };
    tokio::time::timeout(Duration::from_secs(5), demo::run(&args, &AppContext::default()))
        .await
        .expect("demo should finish when the replay ends")
        .unwrap();
}

#[tokio::test]
async fn demo_rejects_zero_interval() {
    let args = DemoArgs {
        replay: "track.ndjson".into(),
        interval_ms: Some(0),
        annotate: false,
    };
    let err = demo::run(&args, &AppContext::default()).await.unwrap_err();
    assert!(err.to_string().contains("replay_interval_ms"));
}
