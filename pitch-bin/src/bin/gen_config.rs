use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pitch_core::config::PitchConfig;

/// CLI arguments for the `gen_config` binary.
#[derive(Debug, Parser)]
struct CliArgs {
    /// The pitch config file.
    #[clap(long = "config", default_value = "config/pitch-config.json")]
    config: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();
    let config = PitchConfig::from_jsonfile(&args.config)
        .with_context(|| format!("reading {}", args.config))?;
    let mem_config = config
        .mem_config()
        .context("resolving platform address functions")?;
    info!(
        "{} banks, {} rows, {} columns",
        mem_config.get_bank_count(),
        mem_config.get_row_count(),
        mem_config.get_col_count()
    );
    println!("{}", serde_json::to_string_pretty(&mem_config)?);
    Ok(())
}
