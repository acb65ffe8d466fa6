//! Text rendering helpers for observer views.
//!
//! None of these fail: a missing record renders a placeholder.

use chrono::{Local, TimeZone};

use crate::LocationRecord;

/// Shown in place of the last-update time before anything was reported.
pub const LAST_UPDATE_PLACEHOLDER: &str = "--:--";

/// Local wall-clock time of the record, or [`LAST_UPDATE_PLACEHOLDER`].
#[must_use]
pub fn format_last_update(record: Option<&LocationRecord>) -> String {
    format_last_update_in(record, &Local)
}

/// Same as [`format_last_update`], rendered in `tz`.
#[must_use]
pub fn format_last_update_in<Tz>(record: Option<&LocationRecord>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    record
        .and_then(|r| tz.timestamp_millis_opt(r.timestamp).single())
        .map_or_else(
            || LAST_UPDATE_PLACEHOLDER.to_string(),
            |t| t.format("%H:%M:%S").to_string(),
        )
}

/// Accuracy radius, e.g. `±12.3m`; `±0m` when nothing is known.
#[must_use]
pub fn format_accuracy(record: Option<&LocationRecord>) -> String {
    record.map_or_else(|| "±0m".to_string(), |r| format!("±{:.1}m", r.accuracy))
}

/// OpenStreetMap link centred on the position.
#[must_use]
pub fn map_link(lat: f64, lng: f64, zoom: u8) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat:.6}&mlon={lng:.6}#map={zoom}/{lat:.6}/{lng:.6}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SubjectId;
    use chrono::Utc;

    fn record() -> LocationRecord {
        LocationRecord {
            subject_id: SubjectId::default(),
            lat: -6.2,
            lng: 106.816_666,
            accuracy: 12.345,
            // 2023-11-14T22:13:20Z
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn never_reported_renders_placeholder() {
        assert_eq!(format_last_update(None), "--:--");
        assert_eq!(format_accuracy(None), "±0m");
    }

    #[test]
    fn last_update_renders_wall_clock() {
        assert_eq!(format_last_update_in(Some(&record()), &Utc), "22:13:20");
    }

    #[test]
    fn out_of_range_timestamp_renders_placeholder() {
        let mut r = record();
        r.timestamp = i64::MAX;
        assert_eq!(format_last_update_in(Some(&r), &Utc), LAST_UPDATE_PLACEHOLDER);
    }

    #[test]
    fn accuracy_has_one_decimal() {
        assert_eq!(format_accuracy(Some(&record())), "±12.3m");
    }

    #[test]
    fn map_link_embeds_coordinates() {
        assert_eq!(
            map_link(-6.2, 106.816_666, 16),
            "https://www.openstreetmap.org/?mlat=-6.200000&mlon=106.816666#map=16/-6.200000/106.816666"
        );
    }
}
