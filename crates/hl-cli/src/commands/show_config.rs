//! `heartlink config`: effective configuration, secrets masked.

use anyhow::Result;
use clap::Args;

use crate::AppContext;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only print the path of the config file in use.
    #[arg(long)]
    pub path: bool,
}

/// # Errors
/// Fails if the configuration cannot be rendered as TOML.
pub fn run(args: &ConfigArgs, ctx: &AppContext) -> Result<()> {
    let source = ctx
        .config_path
        .as_ref()
        .map_or_else(|| "(defaults and environment)".to_string(), |p| p.display().to_string());
    if args.path {
        println!("{source}");
        return Ok(());
    }
    println!("# source: {source}");
    print!("{}", ctx.config.redacted().to_toml()?);
    Ok(())
}
