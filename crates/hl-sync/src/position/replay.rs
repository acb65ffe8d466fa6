//! NDJSON replay source.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hl_core::{PositionFix, now_millis};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{PositionSource, PositionWatch, WatchOptions};
use crate::{CaptureError, CaptureResult};

/// Shortest delay between replayed fixes.
pub const MIN_REPLAY_INTERVAL: Duration = Duration::from_millis(1);

/// Replays recorded positions from a newline-delimited JSON file.
///
/// Each non-blank line is `{"lat": .., "lng": .., "accuracy": ..}`
/// (`accuracy` optional). Fixes are stamped with the current time when
/// emitted.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    interval: Duration,
    repeat: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    lat: f64,
    lng: f64,
    #[serde(default)]
    accuracy: f64,
}

impl ReplaySource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_secs(1),
            repeat: false,
        }
    }

    /// Delay between emitted fixes. A zero delay is raised to
    /// [`MIN_REPLAY_INTERVAL`].
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            MIN_REPLAY_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Start over from the first line after the last one.
    #[must_use]
    pub const fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn watch(&self, _options: WatchOptions) -> PositionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run_replay(self.clone(), tx));
        PositionWatch::with_driver(rx, driver)
    }
}

async fn run_replay(source: ReplaySource, tx: mpsc::UnboundedSender<CaptureResult<PositionFix>>) {
    let contents = match tokio::fs::read_to_string(&source.path).await {
        Ok(contents) => contents,
        Err(err) => {
            let _ = tx.send(Err(open_error(&source.path, &err)));
            return;
        }
    };

    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        let _ = tx.send(Err(CaptureError::Unavailable(format!(
            "{} has no positions",
            source.path.display()
        ))));
        return;
    }

    let mut ticker = tokio::time::interval(source.interval);
    loop {
        for (index, line) in lines.iter().enumerate() {
            ticker.tick().await;
            let item = match serde_json::from_str::<ReplayLine>(line) {
                Ok(entry) => Ok(PositionFix {
                    lat: entry.lat,
                    lng: entry.lng,
                    accuracy: entry.accuracy,
                    timestamp: now_millis(),
                }),
                Err(err) => {
                    warn!(line = index + 1, error = %err, "skipping bad replay line");
                    Err(CaptureError::Unavailable(format!(
                        "bad replay line {}: {err}",
                        index + 1
                    )))
                }
            };
            if tx.send(item).is_err() {
                return;
            }
        }
        if !source.repeat {
            debug!(path = %source.path.display(), "replay finished");
            return;
        }
    }
}

fn open_error(path: &Path, err: &io::Error) -> CaptureError {
    let message = format!("{}: {err}", path.display());
    if err.kind() == io::ErrorKind::PermissionDenied {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::Unavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn replay_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[tokio::test(start_paused = true)]
    async fn replays_lines_in_order_then_ends() {
        let file = replay_file(
            "{\"lat\":1.0,\"lng\":2.0,\"accuracy\":5.0}\n\n{\"lat\":3.0,\"lng\":4.0}\n",
        );
        let source = ReplaySource::new(file.path()).with_interval(Duration::from_millis(100));
        let mut watch = source.watch(WatchOptions::default());

        let first = watch.next().await.unwrap().unwrap();
        assert_eq!((first.lat, first.lng, first.accuracy), (1.0, 2.0, 5.0));
        let second = watch.next().await.unwrap().unwrap();
        assert_eq!((second.lat, second.lng, second.accuracy), (3.0, 4.0, 0.0));
        assert!(watch.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_loops_back_to_start() {
        let file = replay_file("{\"lat\":1.0,\"lng\":2.0}\n{\"lat\":3.0,\"lng\":4.0}\n");
        let source = ReplaySource::new(file.path())
            .with_interval(Duration::from_millis(10))
            .with_repeat(true);
        let mut watch = source.watch(WatchOptions::default());
        let lats: Vec<f64> = next_lats(&mut watch, 5).await;
        assert_eq!(lats, vec![1.0, 3.0, 1.0, 3.0, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_lines_are_reported_and_skipped() {
        let file = replay_file("{\"lat\":1.0,\"lng\":2.0}\nnot json\n{\"lat\":3.0,\"lng\":4.0}\n");
        let source = ReplaySource::new(file.path()).with_interval(Duration::from_millis(10));
        let mut watch = source.watch(WatchOptions::default());
        assert!(watch.next().await.unwrap().is_ok());
        assert!(matches!(watch.next().await, Some(Err(CaptureError::Unavailable(_)))));
        assert!(watch.next().await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_minimum() {
        let file = replay_file("{\"lat\":1.0,\"lng\":2.0}\n{\"lat\":3.0,\"lng\":4.0}\n");
        let source = ReplaySource::new(file.path()).with_interval(Duration::ZERO);
        assert_eq!(source.interval, MIN_REPLAY_INTERVAL);
        let mut watch = source.watch(WatchOptions::default());
        assert_eq!(next_lats(&mut watch, 2).await, vec![1.0, 3.0]);
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn missing_file_ends_the_watch() {
        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::new(dir.path().join("absent.ndjson"));
        let mut watch = source.watch(WatchOptions::default());
        assert!(matches!(watch.next().await, Some(Err(CaptureError::Unavailable(_)))));
        assert!(watch.next().await.is_none());
    }

    async fn next_lats(watch: &mut PositionWatch, n: usize) -> Vec<f64> {
        let mut lats = Vec::with_capacity(n);
        while lats.len() < n {
            lats.push(watch.next().await.unwrap().unwrap().lat);
        }
        lats
    }
}
