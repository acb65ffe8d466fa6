//! HeartLink location sync.
//!
//! Both sides of the sharing loop, built on an injected [`StoreHandle`]:
//!
//! - [`SyncClient`]: the reporter. Watches a [`PositionSource`] and upserts
//!   every fix as the subject's record.
//! - [`PresenceClient`]: the observer. Point reads and a live subscription.
//! - [`PresenceTracker`]: the observer's state model on top of the presence
//!   client.
//!
//! [`StoreHandle`]: hl_store::StoreHandle

#![forbid(unsafe_code)]

mod error;
pub mod position;
mod presence;
mod sync;
mod tracker;

pub use error::{CaptureError, CaptureResult};
pub use position::{
    ChannelSource, GpsdSource, PositionSource, PositionWatch, ReplaySource, WatchOptions,
};
pub use presence::{PresenceClient, Subscription};
pub use sync::{CancelHandle, ReportStats, SyncClient};
pub use tracker::{PresenceOptions, PresenceSession, PresenceState, PresenceTracker};
