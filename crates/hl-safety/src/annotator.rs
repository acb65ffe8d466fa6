//! Safety annotation client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hl_core::{LocationRecord, SafetyReport, SafetyStatus};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{GenerationRequest, TextGenerator};

const FALLBACK_SUMMARY: &str = "Hope your day is going well out there. Stay careful.";
const FALLBACK_RECOMMENDATIONS: [&str; 2] = ["Take care of your health.", "I'm waiting for you at home."];

/// The report returned whenever annotation fails. Identical on every call.
#[must_use]
pub fn fallback_report() -> SafetyReport {
    SafetyReport {
        status: SafetyStatus::Safe,
        summary: FALLBACK_SUMMARY.to_string(),
        recommendations: FALLBACK_RECOMMENDATIONS.iter().map(ToString::to_string).collect(),
    }
}

/// Prompt asking for a short caring note about the position.
#[must_use]
pub fn build_prompt(lat: f64, lng: f64) -> String {
    format!(
        "You are a warm, caring assistant helping someone keep an eye on a loved one \
         who has chosen to share their location.\n\
         Look at this location: Lat {lat}, Lng {lng}.\n\
         Write a short caring message for them. The tone should be gentle and \
         affectionate, focused on their well-being and safety around that area.\n\
         Set status to \"warning\" only when the area calls for extra care, \"safe\" \
         otherwise, and \"unknown\" when you cannot tell.\n\
         Give 2-3 short, sweet reminders as recommendations."
    )
}

/// Reply schema: `{status, summary, recommendations}`, all required.
#[must_use]
pub fn report_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "status": {
                "type": "STRING",
                "enum": ["safe", "warning", "unknown"]
            },
            "summary": {
                "type": "STRING",
                "description": "A warm and caring safety message."
            },
            "recommendations": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "2-3 short, caring reminders."
            }
        },
        "required": ["status", "summary", "recommendations"]
    })
}

/// Parse a generator reply into a report.
///
/// # Errors
/// Returns the JSON error when the text is not a report object or a
/// required field is missing or mistyped, or it carries a field a report
/// does not have.
pub fn parse_report(text: &str) -> Result<SafetyReport, serde_json::Error> {
    serde_json::from_str(text.trim())
}

/// Turns a position into a [`SafetyReport`] through a text generator.
#[derive(Clone, Default)]
pub struct SafetyAnnotator {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Option<Duration>,
}

impl SafetyAnnotator {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
            timeout: None,
        }
    }

    /// Annotator without a generator; every call returns the fallback.
    #[must_use]
    pub const fn unconfigured() -> Self {
        Self {
            generator: None,
            timeout: None,
        }
    }

    /// Give up on the generator after `timeout` and return the fallback.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Annotate a position. Always resolves: any failure yields
    /// [`fallback_report`]. A successful reply is passed through unmodified.
    pub async fn analyze(&self, record: &LocationRecord) -> SafetyReport {
        let Some(generator) = &self.generator else {
            debug!("safety annotation not configured; using fallback");
            return fallback_report();
        };

        let request = GenerationRequest {
            prompt: build_prompt(record.lat, record.lng),
            response_schema: report_schema(),
        };

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, generator.generate(&request)).await {
                Ok(reply) => reply,
                Err(_) => {
                    warn!(generator = generator.name(), timeout = ?limit, "safety annotation timed out");
                    return fallback_report();
                }
            },
            None => generator.generate(&request).await,
        };

        let text = match reply {
            Ok(text) => text,
            Err(err) => {
                warn!(generator = generator.name(), error = %err, "safety annotation failed");
                return fallback_report();
            }
        };

        match parse_report(&text) {
            Ok(report) => {
                debug!(status = %report.status, "safety annotation received");
                report
            }
            Err(err) => {
                warn!(generator = generator.name(), error = %err, "malformed safety annotation");
                fallback_report()
            }
        }
    }
}

impl fmt::Debug for SafetyAnnotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyAnnotator")
            .field("generator", &self.generator.as_ref().map(|g| g.name()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fallback_is_stable() {
        let report = fallback_report();
        assert_eq!(report.status, SafetyStatus::Safe);
        assert_eq!(report.recommendations.len(), 2);
        assert_eq!(report, fallback_report());
    }

    #[test]
    fn prompt_embeds_coordinates() {
        let prompt = build_prompt(-6.2088, 106.8456);
        assert!(prompt.contains("Lat -6.2088, Lng 106.8456"));
    }

    #[test]
    fn schema_requires_every_field() {
        assert_eq!(
            report_schema()["required"],
            json!(["status", "summary", "recommendations"])
        );
    }

    #[test]
    fn parse_rejects_empty_object() {
        assert!(parse_report("{}").is_err());
        assert!(parse_report("  {\"status\":\"safe\",\"summary\":\"ok\",\"recommendations\":[]}\n").is_ok());
    }
}
