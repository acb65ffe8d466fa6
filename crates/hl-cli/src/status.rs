//! Observer status lines.

use std::time::Duration;

use chrono::TimeZone;
use hl_core::display::{format_accuracy, format_last_update_in, map_link};
use hl_core::{Freshness, LocationRecord, SafetyReport};
use hl_sync::PresenceState;

/// Zoom level of printed map links.
pub const MAP_ZOOM: u8 = 16;

/// One-line summary of what the observer knows, rendered in `tz`.
#[must_use]
pub fn status_line<Tz>(state: &PresenceState, now_ms: i64, stale_after: Duration, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let record = state.record.as_ref();
    let link = if state.connected { "online" } else { "offline" };
    let position = record.map_or_else(
        || "waiting for the first location".to_string(),
        |r| format!("{:.6}, {:.6}", r.lat, r.lng),
    );
    format!(
        "[{link}] [{freshness}] {position} {accuracy} last update {time}",
        freshness = state.freshness(now_ms, stale_after),
        accuracy = format_accuracy(record),
        time = format_last_update_in(record, tz),
    )
}

/// Map link for the record, if any.
#[must_use]
pub fn map_line(record: Option<&LocationRecord>) -> Option<String> {
    record.map(|r| map_link(r.lat, r.lng, MAP_ZOOM))
}

/// Safety note as indented lines.
#[must_use]
pub fn report_lines(report: &SafetyReport) -> Vec<String> {
    let mut lines = vec![format!("safety: {} - {}", report.status, report.summary)];
    lines.extend(report.recommendations.iter().map(|r| format!("  * {r}")));
    lines
}

/// Whether a new annotation is worth requesting for `state`.
#[must_use]
pub fn should_annotate(state: &PresenceState, last_annotated: Option<i64>) -> bool {
    match &state.record {
        Some(record) => last_annotated != Some(record.timestamp),
        None => false,
    }
}

/// `Freshness` rendering used in JSON output.
#[must_use]
pub fn freshness_of(record: Option<&LocationRecord>, now_ms: i64, stale_after: Duration) -> Freshness {
    record.map_or(Freshness::Unknown, |r| r.freshness(now_ms, stale_after))
}
