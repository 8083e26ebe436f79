//! # Pitch binaries
//!
//! Command-line tools around `pitch-core`:
//!
//! - `gen_config`: resolve the platform's address functions and print the resulting
//!   `MemConfiguration` as JSON.
//! - `fn_reduce`: reduce a list of bit functions to a linearly independent subset.
//! - `hammer`: run a pattern campaign on the native or the simulated driver and write
//!   one JSON record per attempted instance.
//!
//! ```sh
//! cargo run --release --bin=hammer -- --config config/pitch-config.json --driver dummy
//! ```
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Initializes `env_logger` (default filter `info`) behind a progress-aware wrapper.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}
