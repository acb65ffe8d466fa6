use hl_core::PositionFix;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{PositionSource, PositionWatch, WatchOptions};
use crate::{CaptureError, CaptureResult};

/// Source fed by the embedding application through a channel.
///
/// Only one watch can be open at a time; the sender sees the channel close
/// when that watch is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<CaptureResult<PositionFix>>>>,
}

impl ChannelSource {
    /// Create the source and the sender that feeds it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<CaptureResult<PositionFix>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl PositionSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn watch(&self, _options: WatchOptions) -> PositionWatch {
        if let Some(rx) = self.rx.lock().take() {
            return PositionWatch::from_receiver(rx);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Err(CaptureError::Unavailable(
            "channel source is already being watched".into(),
        )));
        PositionWatch::from_receiver(rx)
    }
}
