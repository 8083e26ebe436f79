use std::{
    fs::File,
    io::{BufWriter, Write, stdout},
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::MultiProgress;
use log::{info, warn};
use pitch_bin::init_logging_with_progress;
use pitch_core::config::PitchConfig;
use pitch_core::hammerer::HammerDriver;
use pitch_core::{Campaign, PatternRecord};
use pitch_dummy::Dummy;
use pitch_hammerlib::HammerLib;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Driver {
    /// Native refresh-synchronised driver (requires 1 GiB hugepages)
    Hammerlib,
    /// Simulated driver
    Dummy,
}

/// CLI arguments for the `hammer` binary.
#[derive(Debug, Parser)]
struct CliArgs {
    /// The pitch config file.
    #[clap(long = "config", default_value = "config/pitch-config.json")]
    config: String,
    /// The driver to hammer with.
    #[clap(long = "driver", value_enum, default_value = "hammerlib")]
    driver: Driver,
    /// Number of pattern shapes, overrides the config.
    #[clap(long = "shapes")]
    shapes: Option<usize>,
    /// Phases per shape, overrides the config.
    #[clap(long = "phases")]
    phases: Option<usize>,
    /// Base addresses per phased shape, overrides the config.
    #[clap(long = "instances")]
    instances: Option<usize>,
    /// Campaign seed, overrides the config.
    #[clap(long = "seed")]
    seed: Option<u64>,
    /// Activations per row and hammer call above which the dummy driver flips bits.
    #[clap(long = "dummy-threshold")]
    dummy_threshold: Option<usize>,
    /// Output file for the records (JSON lines). Defaults to stdout.
    #[clap(long = "output")]
    output: Option<String>,
}

fn run<D: HammerDriver>(
    mut driver: D,
    config: PitchConfig,
    progress: MultiProgress,
    out: &mut dyn Write,
) -> Result<()>
where
    D::Error: Send + Sync,
{
    driver.init().context("driver initialization failed")?;
    let mut campaign = Campaign::builder()
        .driver(driver)
        .params(config.params)
        .config(config.campaign)
        .progress(progress)
        .build()?;

    let start = Instant::now();
    let mut write_err = None;
    let summary = campaign.run_with(|record: PatternRecord| {
        if write_err.is_some() {
            return;
        }
        let line = serde_json::to_string(&record)
            .map_err(anyhow::Error::from)
            .and_then(|json| Ok(writeln!(out, "{}", json)?));
        if let Err(e) = line {
            warn!("Failed to write record {}: {:?}", record.uid, e);
            write_err = Some(e);
        }
    });
    out.flush()?;
    if let Some(e) = write_err {
        return Err(e.context("writing records"));
    }
    info!("=== CAMPAIGN SUMMARY ===");
    info!("Shapes: {}", summary.shapes);
    info!("Instances: {} ({} failed)", summary.instances, summary.failed);
    info!("Attributed flips: {}", summary.flips);
    info!("Duration: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);
    let mut config = PitchConfig::from_jsonfile(&args.config)
        .with_context(|| format!("reading {}", args.config))?;
    if let Some(shapes) = args.shapes {
        config.campaign.shapes = shapes;
    }
    if let Some(phases) = args.phases {
        config.campaign.phases = phases;
    }
    if let Some(instances) = args.instances {
        config.campaign.instances = instances;
    }
    if args.seed.is_some() {
        config.campaign.seed = args.seed;
    }
    let mem_config = config
        .mem_config()
        .context("resolving platform address functions")?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path))?,
        )),
        None => Box::new(BufWriter::new(stdout())),
    };
    let driver_seed = config.campaign.seed.unwrap_or(0);
    match args.driver {
        Driver::Hammerlib => run(
            HammerLib::new(mem_config, driver_seed),
            config,
            progress,
            &mut out,
        ),
        Driver::Dummy => {
            let mut dummy = Dummy::new(mem_config, driver_seed);
            if let Some(threshold) = args.dummy_threshold {
                dummy = dummy.with_threshold(threshold);
            }
            run(dummy, config, progress, &mut out)
        }
    }
}
