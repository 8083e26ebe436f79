use crate::config::{CampaignConfig, PatternParams};
use crate::correlate::correlate;
use crate::hammerer::{DriverError, HammerDriver, verify_translation};
use crate::memory::{DRAMAddr, MemConfiguration};
use crate::pattern::{
    AggressorTuple, ConstraintViolation, PatternShape, PhasedPatternShape, ShapeGenerator,
    bind_address, bind_phase,
};
use crate::record::PatternRecord;
use crate::util::{NamedProgress, Rng};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::Rng as _;
use thiserror::Error;

/// Coordinates sampled when checking the driver's address translation.
const TRANSLATION_SAMPLES: usize = 1000;

/// Sweeps pattern shapes, phases and base addresses on one driver.
///
/// For every shape the campaign draws `phases` phases from `[0, max_phase]`, and for
/// every phased shape `instances` base addresses. Each instance is materialized,
/// hammered, scanned and its flips attributed, yielding one [`PatternRecord`].
/// Failing instances are logged and recorded; they never abort the sweep.
///
/// The campaign owns the driver, so hammer and scan calls are strictly sequential.
///
/// # Examples
///
/// Use [`Campaign::builder()`] to construct a `Campaign`.
pub struct Campaign<D: HammerDriver> {
    driver: D,
    mem_config: MemConfiguration,
    params: PatternParams,
    config: CampaignConfig,
    generator: ShapeGenerator,
    rng: Rng,
    progress: Option<MultiProgress>,
}

/// Counters of a finished sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignSummary {
    /// Shapes generated
    pub shapes: usize,
    /// Instances attempted
    pub instances: usize,
    /// Instances that failed
    pub failed: usize,
    /// Attributed flips
    pub flips: usize,
}

impl<D: HammerDriver> Campaign<D> {
    /// Creates a new Campaign builder.
    pub fn builder() -> CampaignBuilder<D> {
        CampaignBuilder::default()
    }

    /// Row space of the instances: `max_rows` capped by the rows of the platform.
    pub fn row_limit(&self) -> usize {
        self.params.max_rows.min(self.mem_config.get_row_count())
    }

    fn random_base(&mut self) -> DRAMAddr {
        let banks = self.config.max_bank.min(self.mem_config.bank.count()).max(1);
        let rows = self.config.max_base_row.min(self.row_limit()).max(1);
        DRAMAddr::new(
            self.rng.random_range(0..banks),
            self.rng.random_range(0..rows),
            0,
        )
    }

    fn run_instance(&mut self, phased: &PhasedPatternShape) -> PatternRecord {
        let record = PatternRecord::from_phased(phased);
        let base = self.random_base();
        let instance = match bind_address(phased, base, self.row_limit()) {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Skipping instance at {}: {}", base, e);
                return record.with_error(e);
            }
        };
        let record = record.with_instance(&instance, &self.mem_config);
        match instance.hammer(&mut self.driver, &self.params, &mut self.rng) {
            Ok(outcome) => {
                let per_aggressor = instance
                    .aggressors()
                    .iter()
                    .map(|&aggr| vec![aggr])
                    .collect::<Vec<_>>();
                let correlation = correlate(
                    &per_aggressor,
                    &outcome.flips,
                    self.config.correlation,
                );
                if !correlation.rejected.is_empty() {
                    debug!(
                        "{} flip(s) not attributed to instance at {}",
                        correlation.rejected.len(),
                        base
                    );
                }
                record.with_outcome(&outcome, correlation)
            }
            Err(e) => {
                warn!("Hammering instance at {} failed: {}", base, e);
                record.with_error(e)
            }
        }
    }

    fn run_shape(
        &mut self,
        shape: &PatternShape,
        sink: &mut dyn FnMut(PatternRecord),
        summary: &mut CampaignSummary,
    ) {
        for _ in 0..self.config.phases {
            let phase = self.rng.random_range(0..=shape.max_phase());
            let phased = match bind_phase(shape, phase) {
                Ok(phased) => phased,
                Err(e) => {
                    warn!("Skipping phase {} of {}: {}", phase, shape, e);
                    continue;
                }
            };
            info!("{}", phased);
            for _ in 0..self.config.instances {
                let record = self.run_instance(&phased);
                summary.instances += 1;
                summary.flips += record.attributions.len();
                if record.error.is_some() {
                    summary.failed += 1;
                }
                sink(record);
            }
        }
    }

    /// Runs the sweep and hands every record to `sink` as soon as it is complete.
    pub fn run_with(&mut self, mut sink: impl FnMut(PatternRecord)) -> CampaignSummary {
        let mut summary = CampaignSummary::default();
        let p = self.progress.as_ref().map(|p| {
            let p = p.add(ProgressBar::new(self.config.shapes as u64));
            p.set_style(ProgressStyle::named_bar("Pattern shapes"));
            p
        });
        info!(
            "Starting campaign: {} shapes x {} phases x {} instances, seed {:#x}",
            self.config.shapes,
            self.config.phases,
            self.config.instances,
            self.rng.seed()
        );
        for i in 0..self.config.shapes {
            if let Some(p) = &p {
                p.set_position(i as u64 + 1);
            }
            let shape = match self.generator.generate(&mut self.rng) {
                Ok(shape) => shape,
                Err(e) => {
                    warn!("Skipping shape: {}", e);
                    continue;
                }
            };
            summary.shapes += 1;
            self.run_shape(&shape, &mut sink, &mut summary);
        }
        if let Some(p) = p {
            p.finish_and_clear();
        }
        info!(
            "Campaign done: {} instances ({} failed), {} flips",
            summary.instances, summary.failed, summary.flips
        );
        summary
    }

    /// Runs the sweep and collects all records.
    pub fn run(&mut self) -> Vec<PatternRecord> {
        let mut records = vec![];
        self.run_with(|record| records.push(record));
        records
    }

    /// The driver the campaign hammers with.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the driver.
    pub fn into_driver(self) -> D {
        self.driver
    }
}

/// Builder for [`Campaign`].
pub struct CampaignBuilder<D: HammerDriver> {
    driver: Option<D>,
    params: PatternParams,
    config: CampaignConfig,
    progress: Option<MultiProgress>,
    verify: bool,
}

impl<D: HammerDriver> Default for CampaignBuilder<D> {
    fn default() -> Self {
        CampaignBuilder {
            driver: None,
            params: PatternParams::default(),
            config: CampaignConfig::default(),
            progress: None,
            verify: true,
        }
    }
}

impl<D: HammerDriver> CampaignBuilder<D> {
    /// The initialized driver to hammer with.
    pub fn driver(mut self, driver: D) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Timing and materializer parameters.
    pub fn params(mut self, params: PatternParams) -> Self {
        self.params = params;
        self
    }

    /// Sweep bounds, seed and correlation policy.
    pub fn config(mut self, config: CampaignConfig) -> Self {
        self.config = config;
        self
    }

    /// Shows a progress bar on `progress`.
    pub fn progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Skip comparing the driver's address translation with the resolver's.
    pub fn skip_translation_check(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Builds the campaign and checks the driver's address translation.
    pub fn build(self) -> Result<Campaign<D>, Error> {
        let driver = self.driver.ok_or(Error::Driver)?;
        if self.config.phases == 0 || self.config.instances == 0 {
            return Err(Error::InvalidConfig(
                "phases and instances must be at least 1".into(),
            ));
        }
        let mem_config = *driver.mem_config();
        let mut rng = match self.config.seed {
            Some(seed) => Rng::from_seed(seed),
            None => Rng::from_entropy(),
        };
        if self.verify {
            let mut check_rng = rng.fork();
            verify_translation(&driver, &mem_config, &mut check_rng, TRANSLATION_SAMPLES)?;
        }
        let tuple = AggressorTuple::new(self.config.aggressors.clone())?;
        let generator = ShapeGenerator::new(self.params, tuple)?;
        Ok(Campaign {
            driver,
            mem_config,
            params: self.params,
            config: self.config,
            generator,
            rng,
            progress: self.progress,
        })
    }
}

/// Errors while building a [`Campaign`].
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("No driver specified")]
    Driver,
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),
    #[error(transparent)]
    Translation(#[from] DriverError),
}
