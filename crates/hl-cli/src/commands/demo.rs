//! `heartlink demo`: both roles in one process over an in-memory store.
//!
//! ```text
//! heartlink demo --replay track.ndjson --interval-ms 500
//! ```
//!
//! The replay file holds one `{"lat":..,"lng":..,"accuracy":..}` object per
//! line. The demo ends when the replay does, or on ctrl-c.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use hl_store::{MemoryStore, StoreHandle};
use hl_sync::{PresenceTracker, SyncClient};
use tracing::info;

use crate::AppContext;
use crate::commands::run::Printer;

/// Time the observer gets to drain pushes after the reporter stops.
const DRAIN: Duration = Duration::from_millis(200);

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// NDJSON file of positions to replay.
    #[arg(long)]
    pub replay: PathBuf,

    /// Delay between replayed positions; overrides `reporter.replay_interval_ms`.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Print a safety note for each new position.
    #[arg(long)]
    pub annotate: bool,
}

/// # Errors
/// Fails on a zero interval or when the annotator cannot be set up.
pub async fn run(args: &DemoArgs, ctx: &AppContext) -> Result<()> {
    let mut ctx = ctx.clone();
    if let Some(interval) = args.interval_ms {
        ctx.config.reporter.replay_interval_ms = interval;
    }
    ctx.config.reporter.replay_repeat = false;

    let source = ctx.replay(args.replay.clone())?;
    let annotator = if args.annotate {
        Some(ctx.annotator()?)
    } else {
        None
    };
    let stale_after = ctx.config.presence.stale_after();
    let subject = ctx.config.subject_id.clone();
    let store = StoreHandle::new(MemoryStore::new());

    let mut session = PresenceTracker::new(ctx.presence(store.clone()), ctx.config.presence.options())
        .start()
        .await;
    let mut changes = session.changes();
    let mut reporter = SyncClient::new(store, subject, source)
        .with_watch_options(ctx.watch_options())
        .start_reporting();
    let mut printer = Printer::default();

    loop {
        let state = changes.borrow_and_update().clone();
        printer.show(&state, stale_after, annotator.as_ref()).await;

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
            () = reporter.finished() => {
                tokio::time::sleep(DRAIN).await;
                let state = changes.borrow_and_update().clone();
                printer.show(&state, stale_after, annotator.as_ref()).await;
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    let stats = reporter.join().await;
    session.stop();
    info!(
        fixes = stats.fixes,
        published = stats.published,
        applied = session.state().updates_applied,
        "demo finished"
    );
    Ok(())
}
