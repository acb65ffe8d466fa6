//! `heartlink latest`: one-shot read of the stored record.

use anyhow::Result;
use chrono::Local;
use clap::Args;
use hl_core::{Freshness, LocationRecord, now_millis};
use hl_sync::PresenceState;
use serde::Serialize;

use crate::AppContext;
use crate::status::{freshness_of, map_line, status_line};

#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Output JSON instead of a status line.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct LatestOutput {
    subject_id: String,
    backend: &'static str,
    freshness: Freshness,
    record: Option<LocationRecord>,
}

/// Print the latest record. An absent record is not an error.
///
/// # Errors
/// Fails when the store cannot be set up or JSON rendering fails.
pub async fn run(args: &LatestArgs, ctx: &AppContext) -> Result<()> {
    let store = ctx.store()?;
    let backend = store.backend();
    let client = ctx.presence(store);
    let record = client.get_latest().await;
    let stale_after = ctx.config.presence.stale_after();
    let now = now_millis();

    if args.json {
        let output = LatestOutput {
            subject_id: client.subject().to_string(),
            backend,
            freshness: freshness_of(record.as_ref(), now, stale_after),
            record,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let state = PresenceState {
        connected: record.is_some(),
        tracking: record.is_some(),
        updates_applied: u64::from(record.is_some()),
        record,
    };
    println!("{}", status_line(&state, now, stale_after, &Local));
    if let Some(link) = map_line(state.record.as_ref()) {
        println!("  {link}");
    }
    Ok(())
}
