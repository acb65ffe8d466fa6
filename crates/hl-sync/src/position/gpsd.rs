//! gpsd client.
//!
//! Speaks the gpsd JSON protocol over TCP: enable a watch, then read one
//! report per line and turn `TPV` reports into fixes.

use std::io;
use std::time::Duration;

use chrono::DateTime;
use hl_core::{PositionFix, now_millis};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{PositionSource, PositionWatch, WatchOptions};
use crate::{CaptureError, CaptureResult};

/// Where gpsd listens by default.
pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

/// Position source backed by a gpsd daemon.
#[derive(Debug, Clone)]
pub struct GpsdSource {
    addr: String,
    reconnect_delay: Duration,
}

impl Default for GpsdSource {
    fn default() -> Self {
        Self::new(DEFAULT_GPSD_ADDR)
    }
}

impl GpsdSource {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl PositionSource for GpsdSource {
    fn name(&self) -> &'static str {
        "gpsd"
    }

    fn watch(&self, options: WatchOptions) -> PositionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run_watch(
            self.addr.clone(),
            self.reconnect_delay,
            options,
            tx,
        ));
        PositionWatch::with_driver(rx, driver)
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    mode: u8,
    time: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    epx: Option<f64>,
    epy: Option<f64>,
    eph: Option<f64>,
}

/// Interpret one gpsd report line.
///
/// Returns `None` for reports that carry no position (`VERSION`, `DEVICES`,
/// `WATCH`, `SKY`, ...). A `TPV` without a usable fix, or with only a 2D fix
/// while `high_accuracy` is requested, yields `Unavailable`.
#[must_use]
pub fn parse_tpv(line: &str, high_accuracy: bool) -> Option<CaptureResult<PositionFix>> {
    let report: Report = match serde_json::from_str(line) {
        Ok(report) => report,
        Err(err) => {
            return Some(Err(CaptureError::Unavailable(format!(
                "malformed gpsd report: {err}"
            ))));
        }
    };
    if report.class != "TPV" {
        return None;
    }

    let fix = match (report.mode, report.lat, report.lon) {
        (0 | 1, _, _) | (_, None, _) | (_, _, None) => {
            return Some(Err(CaptureError::Unavailable("no fix".into())));
        }
        (2, _, _) if high_accuracy => {
            return Some(Err(CaptureError::Unavailable("2D fix only".into())));
        }
        (_, Some(lat), Some(lng)) => PositionFix {
            lat,
            lng,
            accuracy: accuracy_of(&report),
            timestamp: report
                .time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map_or_else(now_millis, |t| t.timestamp_millis()),
        },
    };
    Some(Ok(fix))
}

// Horizontal error in meters: the larger axis estimate, else eph.
fn accuracy_of(report: &Report) -> f64 {
    match (report.epx, report.epy) {
        (Some(x), Some(y)) => x.max(y),
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => report.eph.unwrap_or(0.0),
    }
}

async fn run_watch(
    addr: String,
    reconnect_delay: Duration,
    options: WatchOptions,
    tx: mpsc::UnboundedSender<CaptureResult<PositionFix>>,
) {
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!(%addr, "connected to gpsd");
                if let Err(reason) = read_reports(stream, options, &tx).await {
                    warn!(%addr, %reason, "gpsd connection lost");
                    let _ = tx.send(Err(CaptureError::Unavailable(reason)));
                }
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                let _ = tx.send(Err(CaptureError::PermissionDenied(format!("gpsd at {addr}: {err}"))));
                return;
            }
            Err(err) => {
                debug!(%addr, error = %err, "gpsd connect failed");
                let _ = tx.send(Err(CaptureError::Unavailable(format!("gpsd at {addr}: {err}"))));
            }
        }

        tokio::select! {
            () = tx.closed() => return,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

async fn read_reports(
    stream: TcpStream,
    options: WatchOptions,
    tx: &mpsc::UnboundedSender<CaptureResult<PositionFix>>,
) -> Result<(), String> {
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(WATCH_COMMAND)
        .await
        .map_err(|e| e.to_string())?;
    let mut lines = BufReader::new(read_half).lines();
    let mut deadline = options.timeout.map(|t| Instant::now() + t);

    loop {
        let next = tokio::select! {
            () = tx.closed() => return Ok(()),
            () = sleep_until(deadline) => {
                let Some(timeout) = options.timeout else { continue };
                if tx.send(Err(CaptureError::Timeout(timeout))).is_err() {
                    return Ok(());
                }
                deadline = Some(Instant::now() + timeout);
                continue;
            }
            line = lines.next_line() => line,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => return Err("gpsd closed the connection".into()),
            Err(err) => return Err(err.to_string()),
        };
        let Some(item) = parse_tpv(&line, options.high_accuracy) else {
            continue;
        };
        if item.is_ok() {
            deadline = options.timeout.map(|t| Instant::now() + t);
        }
        if tx.send(item).is_err() {
            return Ok(());
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
