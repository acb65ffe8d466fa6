//! Location records and subject identity.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{CoreError, CoreResult};

/// Subject tracked when no identifier is configured.
pub const DEFAULT_SUBJECT_ID: &str = "primary";

const MAX_SUBJECT_ID_LEN: usize = 128;

/// Identifier of the tracked subject (the store's row key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Parse and validate a subject identifier.
    ///
    /// Accepts ASCII alphanumerics plus `-`, `_`, `.` and `@`, up to 128
    /// characters. The restriction keeps the id safe to embed in store
    /// filter expressions.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidSubjectId` for empty, overlong or
    /// otherwise unsupported identifiers.
    pub fn parse(raw: impl Into<String>) -> CoreResult<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SUBJECT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if valid {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidSubjectId(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self(DEFAULT_SUBJECT_ID.to_string())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for SubjectId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for SubjectId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl std::str::FromStr for SubjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A raw position capture, before it is attributed to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lng: f64,
    /// Radius of uncertainty in meters.
    pub accuracy: f64,
    /// Capture instant, milliseconds since the Unix epoch (device clock).
    pub timestamp: i64,
}

impl PositionFix {
    /// Attribute this fix to `subject`.
    #[must_use]
    pub fn into_record(self, subject: SubjectId) -> LocationRecord {
        LocationRecord {
            subject_id: subject,
            lat: self.lat,
            lng: self.lng,
            accuracy: self.accuracy,
            timestamp: self.timestamp,
        }
    }
}

/// The persisted position of one subject.
///
/// At most one record exists per subject: writes replace, never append.
/// Ordering is last-writer-wins; the store does not compare timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "id")]
    pub subject_id: SubjectId,
    pub lat: f64,
    pub lng: f64,
    /// Radius of uncertainty in meters. Advisory; display only.
    pub accuracy: f64,
    /// Capture instant, milliseconds since the Unix epoch (device clock).
    #[serde(deserialize_with = "deserialize_millis")]
    pub timestamp: i64,
}

impl LocationRecord {
    /// Check coordinate ranges and accuracy.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidRecord` when a coordinate is not finite or
    /// out of range, or when accuracy is negative or not finite.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoreError::InvalidRecord(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(CoreError::InvalidRecord(format!(
                "longitude {} out of range",
                self.lng
            )));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(CoreError::InvalidRecord(format!(
                "accuracy {} must be a non-negative number",
                self.accuracy
            )));
        }
        Ok(())
    }

    /// Age of the record relative to `now_ms`. Records stamped in the future
    /// report zero age.
    #[must_use]
    pub fn age(&self, now_ms: i64) -> Duration {
        let delta = now_ms.saturating_sub(self.timestamp).max(0);
        Duration::from_millis(u64::try_from(delta).unwrap_or(0))
    }

    /// Classify how current the record is.
    #[must_use]
    pub fn freshness(&self, now_ms: i64, stale_after: Duration) -> Freshness {
        if self.age(now_ms) > stale_after {
            Freshness::Stale
        } else {
            Freshness::Live
        }
    }
}

/// How current the observed position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Nothing has been observed yet.
    Unknown,
    /// The latest record is within the staleness window.
    Live,
    /// The latest record is older than the staleness window.
    Stale,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Live => write!(f, "live"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// Row stores may hand the timestamp back as a float (e.g. `1.7e12`).
fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    match value.as_f64() {
        Some(v) if v.is_finite() && v.abs() < 9.0e18 => Ok(truncate_millis(v)),
        _ => Err(serde::de::Error::custom(format!(
            "timestamp {value} is not representable as milliseconds"
        ))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_millis(v: f64) -> i64 {
    v.trunc() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(lat: f64, lng: f64, accuracy: f64) -> LocationRecord {
        LocationRecord {
            subject_id: SubjectId::default(),
            lat,
            lng,
            accuracy,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn subject_id_accepts_common_forms() {
        for raw in ["primary", "mey_s", "user-42", "a.b@c"] {
            assert!(SubjectId::parse(raw).is_ok(), "{raw} should parse");
        }
    }

    #[test]
    fn subject_id_rejects_filter_breaking_input() {
        let overlong = "a".repeat(129);
        for raw in ["", "a b", "id,eq", "x)", overlong.as_str()] {
            assert!(SubjectId::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn record_wire_shape_uses_id_key() {
        let value = serde_json::to_value(record(1.5, -2.5, 10.0)).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "primary",
                "lat": 1.5,
                "lng": -2.5,
                "accuracy": 10.0,
                "timestamp": 1_700_000_000_000_i64
            })
        );
    }

    #[test]
    fn record_decodes_float_timestamp_and_extra_columns() {
        let parsed: LocationRecord = serde_json::from_value(json!({
            "id": "primary",
            "lat": 1.0,
            "lng": 2.0,
            "accuracy": 3.0,
            "timestamp": 1_700_000_000_123.0,
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn record_rejects_invalid_subject_on_decode() {
        let parsed: Result<LocationRecord, _> = serde_json::from_value(json!({
            "id": "",
            "lat": 1.0,
            "lng": 2.0,
            "accuracy": 3.0,
            "timestamp": 1
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_checks_ranges() {
        assert!(record(45.0, 120.0, 5.0).validate().is_ok());
        assert!(record(91.0, 0.0, 5.0).validate().is_err());
        assert!(record(0.0, -181.0, 5.0).validate().is_err());
        assert!(record(0.0, 0.0, -1.0).validate().is_err());
        assert!(record(f64::NAN, 0.0, 1.0).validate().is_err());
    }

    #[test]
    fn freshness_uses_stale_window() {
        let r = record(0.0, 0.0, 1.0);
        let window = Duration::from_secs(60);
        assert_eq!(r.freshness(r.timestamp + 30_000, window), Freshness::Live);
        assert_eq!(r.freshness(r.timestamp + 61_000, window), Freshness::Stale);
        // Clock skew: a record from the future is treated as live.
        assert_eq!(r.freshness(r.timestamp - 5_000, window), Freshness::Live);
    }

    #[test]
    fn fix_into_record_keeps_fields() {
        let fix = PositionFix {
            lat: -6.2,
            lng: 106.8,
            accuracy: 12.5,
            timestamp: 42,
        };
        let rec = fix.into_record(SubjectId::parse("s1").unwrap());
        assert_eq!(rec.subject_id.as_str(), "s1");
        assert_eq!((rec.lat, rec.lng, rec.accuracy, rec.timestamp), (-6.2, 106.8, 12.5, 42));
    }
}
