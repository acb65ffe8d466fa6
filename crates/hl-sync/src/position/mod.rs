//! Position sources.
//!
//! A [`PositionSource`] opens a [`PositionWatch`]: a stream of fixes and
//! capture errors that lasts until the watch is dropped or the source hits
//! a terminal error.

mod channel;
mod gpsd;
mod replay;

use std::fmt;
use std::time::Duration;

use hl_core::PositionFix;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::CaptureResult;

pub use channel::ChannelSource;
pub use gpsd::{DEFAULT_GPSD_ADDR, GpsdSource, parse_tpv};
pub use replay::{MIN_REPLAY_INTERVAL, ReplaySource};

/// Options for a continuous watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Ask for the most precise fixes the source can give.
    pub high_accuracy: bool,
    /// Report `Timeout` when no fix arrives for this long.
    pub timeout: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: None,
        }
    }
}

impl WatchOptions {
    #[must_use]
    pub const fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Something that can continuously report the device position.
pub trait PositionSource: Send + Sync + fmt::Debug {
    /// Short source name for logs.
    fn name(&self) -> &'static str;

    /// Start watching. Must be called within a Tokio runtime.
    fn watch(&self, options: WatchOptions) -> PositionWatch;
}

/// An open watch. Dropping it releases the underlying source.
#[derive(Debug)]
pub struct PositionWatch {
    rx: mpsc::UnboundedReceiver<CaptureResult<PositionFix>>,
    driver: Option<AbortOnDrop>,
}

impl PositionWatch {
    #[must_use]
    pub const fn from_receiver(rx: mpsc::UnboundedReceiver<CaptureResult<PositionFix>>) -> Self {
        Self { rx, driver: None }
    }

    /// Watch fed by `driver`, which is aborted when the watch is dropped.
    #[must_use]
    pub fn with_driver(
        rx: mpsc::UnboundedReceiver<CaptureResult<PositionFix>>,
        driver: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            driver: Some(AbortOnDrop(driver)),
        }
    }

    /// Next fix or capture error; `None` once the source has ended.
    pub async fn next(&mut self) -> Option<CaptureResult<PositionFix>> {
        self.rx.recv().await
    }

    /// Whether a driver task is still attached and running.
    #[must_use]
    pub fn is_driven(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.0.is_finished())
    }
}

#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
