//! `heartlink analyze`: safety note for a position.
//!
//! ```text
//! heartlink analyze --lat -6.2088 --lng 106.8456
//! heartlink analyze --json        # uses the latest stored record
//! ```

use anyhow::{Result, bail};
use clap::Args;
use hl_core::{LocationRecord, now_millis};

use crate::AppContext;
use crate::status::report_lines;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Latitude in degrees.
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in degrees.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lng: Option<f64>,

    /// Output the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Annotate the given coordinates, or the latest stored record.
///
/// Generator failures are absorbed into the fallback note; this only fails
/// when there is nothing to annotate.
///
/// # Errors
/// Fails on invalid coordinates, when no record is stored and none was
/// given, or when the store or annotator cannot be set up.
pub async fn run(args: &AnalyzeArgs, ctx: &AppContext) -> Result<()> {
    let record = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => {
            let record = LocationRecord {
                subject_id: ctx.config.subject_id.clone(),
                lat,
                lng,
                accuracy: 0.0,
                timestamp: now_millis(),
            };
            record.validate()?;
            record
        }
        _ => {
            let Some(record) = ctx.presence(ctx.store()?).get_latest().await else {
                bail!(
                    "no stored location for {}; pass --lat and --lng",
                    ctx.config.subject_id
                );
            };
            record
        }
    };

    let report = ctx.annotator()?.analyze(&record).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
