//! Subcommands. Each module exposes its clap `Args` and a `run`.

pub mod analyze;
pub mod demo;
pub mod latest;
pub mod run;
pub mod show_config;

use anyhow::Result;
use clap::Subcommand;

use crate::AppContext;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start as reporter or observer, selected by `--role`.
    Run(run::RunArgs),
    /// Print the subject's latest stored location.
    Latest(latest::LatestArgs),
    /// Produce a safety note for a position.
    Analyze(analyze::AnalyzeArgs),
    /// Print the effective configuration with secrets masked.
    Config(show_config::ConfigArgs),
    /// Reporter and observer in one process over an in-memory store.
    Demo(demo::DemoArgs),
}

impl Command {
    /// Dispatch to the subcommand.
    ///
    /// # Errors
    /// Propagates the subcommand's failure.
    pub async fn run(self, ctx: AppContext) -> Result<()> {
        match self {
            Self::Run(args) => run::run(&args, &ctx).await,
            Self::Latest(args) => latest::run(&args, &ctx).await,
            Self::Analyze(args) => analyze::run(&args, &ctx).await,
            Self::Config(args) => show_config::run(&args, &ctx),
            Self::Demo(args) => demo::run(&args, &ctx).await,
        }
    }
}
