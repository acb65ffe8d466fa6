//! HeartLink core types.
//!
//! The data model shared by the reporting side, the observing side and the
//! safety annotation client:
//!
//! - [`LocationRecord`]: the single persisted row per subject
//! - [`SafetyReport`]: the ephemeral structured note about a position
//! - [`LatestLocation`]: the last-writer-wins register observers apply
//!   incoming records through
//! - [`Role`]: the entry mode switch (reporter or observer)

#![forbid(unsafe_code)]

pub mod display;
mod error;
mod lww;
mod record;
mod report;
mod role;

pub use error::{CoreError, CoreResult};
pub use lww::{ApplyOutcome, ApplyPolicy, LatestLocation};
pub use record::{
    DEFAULT_SUBJECT_ID, Freshness, LocationRecord, PositionFix, SubjectId, now_millis,
};
pub use report::{SafetyReport, SafetyStatus};
pub use role::Role;
