//! Safety report produced by the annotation client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Advisory status attached to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    Safe,
    Warning,
    Unknown,
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Warning => write!(f, "warning"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Structured, human-readable note about a position. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyReport {
    pub status: SafetyStatus,
    pub summary: String,
    /// Short reminders, in the order the producer emitted them.
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_requires_all_fields() {
        let missing: Result<SafetyReport, _> =
            serde_json::from_value(json!({ "status": "safe", "summary": "ok" }));
        assert!(missing.is_err());
    }

    #[test]
    fn report_rejects_extra_fields() {
        let extra: Result<SafetyReport, _> = serde_json::from_value(json!({
            "status": "safe",
            "summary": "ok",
            "recommendations": [],
            "confidence": 0.9
        }));
        assert!(extra.is_err());
    }

    #[test]
    fn status_rejects_unlisted_values() {
        let parsed: Result<SafetyStatus, _> = serde_json::from_value(json!("danger"));
        assert!(parsed.is_err());
        let parsed: SafetyStatus = serde_json::from_value(json!("warning")).unwrap();
        assert_eq!(parsed, SafetyStatus::Warning);
    }
}
