//! HeartLink safety annotation.
//!
//! [`SafetyAnnotator::analyze`] turns a position into a short structured
//! note through a [`TextGenerator`]. It never fails: collaborator errors,
//! malformed replies, timeouts and a missing generator all produce the
//! fixed [`fallback_report`].

#![forbid(unsafe_code)]

mod annotator;
mod generator;

pub use annotator::{SafetyAnnotator, build_prompt, fallback_report, parse_report, report_schema};
pub use generator::{GenerationError, GenerationRequest, GenerationResult, TextGenerator};
