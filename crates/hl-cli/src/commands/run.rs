//! `heartlink run`: the role switch.
//!
//! ```text
//! heartlink run --role reporter
//! heartlink run --role observer --annotate
//! HEARTLINK_ROLE=partner heartlink run
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use hl_core::{Role, now_millis};
use hl_safety::SafetyAnnotator;
use hl_sync::{PresenceState, PresenceTracker, SyncClient};
use tracing::info;

use crate::AppContext;
use crate::status::{map_line, report_lines, should_annotate, status_line};

/// How often the observer re-checks freshness without new data.
const REFRESH_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Side of the link to play: reporter (alias partner) or observer
    /// (alias admin).
    #[arg(long, env = "HEARTLINK_ROLE", default_value = "observer")]
    pub role: Role,

    /// Observer only: print a safety note for each new position.
    #[arg(long)]
    pub annotate: bool,
}

/// Run the selected role until interrupted.
///
/// # Errors
/// Fails when the store, source or annotator cannot be set up.
pub async fn run(args: &RunArgs, ctx: &AppContext) -> Result<()> {
    info!(role = %args.role, subject = %ctx.config.subject_id, "starting");
    match args.role {
        Role::Reporter => report(ctx).await,
        Role::Observer => {
            let annotator = if args.annotate {
                Some(ctx.annotator()?)
            } else {
                None
            };
            observe(ctx, annotator.as_ref()).await
        }
    }
}

async fn report(ctx: &AppContext) -> Result<()> {
    let client = SyncClient::new(ctx.store()?, ctx.config.subject_id.clone(), ctx.source()?)
        .with_watch_options(ctx.watch_options());
    let mut handle = client.start_reporting();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("interrupted");
        }
        () = handle.finished() => {}
    }

    let stats = handle.join().await;
    info!(
        fixes = stats.fixes,
        published = stats.published,
        publish_failures = stats.publish_failures,
        capture_errors = stats.capture_errors,
        "reporting finished"
    );
    Ok(())
}

async fn observe(ctx: &AppContext, annotator: Option<&SafetyAnnotator>) -> Result<()> {
    let store = ctx.store()?;
    let options = ctx.config.presence.options();
    let stale_after = ctx.config.presence.stale_after();
    let mut session = PresenceTracker::new(ctx.presence(store), options).start().await;
    let mut changes = session.changes();
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    let mut printer = Printer::default();

    loop {
        let state = changes.borrow_and_update().clone();
        printer.show(&state, stale_after, annotator).await;

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = refresh.tick() => {}
        }
    }

    session.stop();
    Ok(())
}

/// Prints status lines, skipping repeats, and annotates new positions.
#[derive(Debug, Default)]
pub(crate) struct Printer {
    last_line: Option<String>,
    last_annotated: Option<i64>,
}

impl Printer {
    /// Returns whether a status line was printed.
    pub(crate) async fn show(
        &mut self,
        state: &PresenceState,
        stale_after: Duration,
        annotator: Option<&SafetyAnnotator>,
    ) -> bool {
        let line = status_line(state, now_millis(), stale_after, &Local);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return false;
        }
        println!("{line}");
        if let Some(link) = map_line(state.record.as_ref()) {
            println!("  {link}");
        }
        self.last_line = Some(line);

        let Some(annotator) = annotator else {
            return true;
        };
        if !should_annotate(state, self.last_annotated) {
            return true;
        }
        if let Some(record) = &state.record {
            self.last_annotated = Some(record.timestamp);
            for line in report_lines(&annotator.analyze(record).await) {
                println!("{line}");
            }
        }
        true
    }
}
