//! `heartlink` binary.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use hl_cli::AppContext;
use hl_cli::commands::Command;
use hl_cli::config::{self, LogFormat};
use hl_core::SubjectId;

/// Two-party location sharing: publish a position, or follow one live.
#[derive(Parser, Debug)]
#[command(name = "heartlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: `<config dir>/heartlink/config.toml`).
    #[arg(long, global = true, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Subject whose location is shared.
    #[arg(long, global = true)]
    subject: Option<SubjectId>,

    /// Log output format.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("heartlink: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env = |name: &str| std::env::var(name).ok();
    let (mut config, path) = config::load(cli.config.as_deref(), &env, config::default_config_path())?;

    if let Some(subject) = cli.subject {
        config.subject_id = subject;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(filter) = cli.log_filter {
        config.logging.filter = filter;
    }

    hl_cli::logging::init(config.logging.format, &config.logging.filter)?;
    cli.command.run(AppContext::new(config, path)).await
}
