use crate::config::PatternParams;
use crate::hammerer::{HammerDriver, HammerError, HammerRequest, check_undercount};
use crate::memory::{BitFlip, DRAMAddr, MemConfiguration, PhysAddr};
use crate::pattern::{ConstraintViolation, PhasedPatternShape};
use crate::util::Rng;
use itertools::Itertools;
use log::{debug, info, trace};
use rand::Rng as _;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Errors while materializing the signal of an instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SignalError {
    #[error("guard band [{lo}, {hi}] leaves no filler row in [0, {max_rows})")]
    GuardCoversRowSpace {
        lo: usize,
        hi: usize,
        max_rows: usize,
    },
    #[error("no filler row outside the guard band [{lo}, {hi}] after {attempts} draws")]
    FillerExhausted {
        lo: usize,
        hi: usize,
        attempts: usize,
    },
}

/// One activation slot of a signal.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalEntry {
    /// Access to an aggressor row
    Aggressor(DRAMAddr),
    /// Access to a random row outside the guard band
    Filler(DRAMAddr),
}

impl SignalEntry {
    /// The accessed DRAM address.
    pub fn addr(&self) -> &DRAMAddr {
        match self {
            SignalEntry::Aggressor(addr) | SignalEntry::Filler(addr) => addr,
        }
    }

    /// Whether the slot accesses an aggressor.
    pub fn is_aggressor(&self) -> bool {
        matches!(self, SignalEntry::Aggressor(_))
    }
}

/// One period of DRAM accesses, replayed by the driver.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Signal(Vec<SignalEntry>);

impl Signal {
    /// Number of activation slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signal has no slots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The slots in access order.
    pub fn entries(&self) -> &[SignalEntry] {
        &self.0
    }

    /// Indices of the aggressor slots.
    pub fn aggressor_slots(&self) -> Vec<usize> {
        self.0.iter().positions(SignalEntry::is_aggressor).collect()
    }

    /// Physical address of every slot.
    pub fn to_phys(&self, mem_config: &MemConfiguration) -> Vec<PhysAddr> {
        self.0.iter().map(|e| e.addr().to_phys(mem_config)).collect()
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let slots = self
            .0
            .iter()
            .map(|e| match e {
                SignalEntry::Aggressor(a) => format!("A{}", a.row),
                SignalEntry::Filler(_) => "_".to_string(),
            })
            .join(" ");
        write!(f, "[{}]", slots)
    }
}

/// A phased shape bound to absolute DRAM addresses.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PatternInstance {
    #[serde(flatten)]
    phased: PhasedPatternShape,
    base: DRAMAddr,
    aggressors: Vec<DRAMAddr>,
    #[serde(skip)]
    max_rows: usize,
}

/// Binds every relative aggressor offset `o` to `base + (0, o, 0)`.
///
/// Bank and column are inherited from `base`. `max_rows` bounds the row space of the
/// instance; filler rows are drawn from `[0, max_rows)`.
///
/// # Errors
///
/// Fails with [`ConstraintViolation::RowOutOfRange`] if an aggressor row would leave
/// `[0, max_rows)`.
pub fn bind_address(
    phased: &PhasedPatternShape,
    base: DRAMAddr,
    max_rows: usize,
) -> Result<PatternInstance, ConstraintViolation> {
    let aggressors = phased
        .shape()
        .aggr_tuple()
        .offsets()
        .iter()
        .map(|&offset| {
            base.offset_row(offset)
                .filter(|addr| addr.row < max_rows)
                .ok_or(ConstraintViolation::RowOutOfRange {
                    base_row: base.row,
                    offset,
                    max_rows,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PatternInstance {
        phased: phased.clone(),
        base,
        aggressors,
        max_rows,
    })
}

/// Everything observed while hammering one instance.
#[derive(Serialize, Debug, Clone)]
pub struct HammerOutcome {
    /// The materialized signal
    pub signal: Signal,
    /// Repetitions of the signal
    pub rounds: usize,
    /// Synchronisation address
    pub sync_addr: PhysAddr,
    /// Scanned physical range
    pub scan_range: (PhysAddr, PhysAddr),
    /// Flips with resolved DRAM coordinates
    pub flips: Vec<BitFlip>,
    /// The driver's flip list was full; more flips may have occurred
    pub possibly_truncated: bool,
}

impl PatternInstance {
    /// The phased shape this instance was bound from.
    pub fn phased(&self) -> &PhasedPatternShape {
        &self.phased
    }

    /// The base address.
    pub fn base(&self) -> &DRAMAddr {
        &self.base
    }

    /// Absolute aggressor addresses, in tuple order.
    pub fn aggressors(&self) -> &[DRAMAddr] {
        &self.aggressors
    }

    /// Identifier of the instance (phased shape parameters and base address).
    pub fn uid(&self) -> u32 {
        self.phased.uid() ^ (self.base.bank as u32).rotate_left(16) ^ self.base.row as u32
    }

    fn row_bounds(&self) -> (usize, usize) {
        self.aggressors
            .iter()
            .map(|a| a.row)
            .minmax()
            .into_option()
            .unwrap_or((self.base.row, self.base.row))
    }

    /// Inclusive row range filler rows must avoid.
    pub fn guard_band(&self, guard_rows: usize) -> (usize, usize) {
        let (min, max) = self.row_bounds();
        (min.saturating_sub(guard_rows), max + guard_rows)
    }

    fn draw_filler(&self, lo: usize, hi: usize, attempts: usize, rng: &mut Rng) -> Option<usize> {
        (0..attempts)
            .map(|_| rng.random_range(0..self.max_rows))
            .find(|row| !(lo..=hi).contains(row))
    }

    /// Builds one period of accesses.
    ///
    /// Aggressor slots follow the phased shape. Every other slot accesses a uniformly
    /// drawn row of `[0, max_rows)` outside the guard band around the aggressors, in
    /// the bank of the first aggressor, column 0.
    ///
    /// # Errors
    ///
    /// Fails if the guard band covers the whole row space, or if no row outside the
    /// guard band was drawn within `params.max_filler_attempts` tries.
    pub fn materialize_signal(
        &self,
        params: &PatternParams,
        rng: &mut Rng,
    ) -> Result<Signal, SignalError> {
        let (lo, hi) = self.guard_band(params.guard_rows);
        let pattern_aggrs = self.aggressors.len();
        let slots = self.phased.slot_indices();
        if slots.iter().any(Option::is_none) && lo == 0 && hi + 1 >= self.max_rows {
            return Err(SignalError::GuardCoversRowSpace {
                lo,
                hi,
                max_rows: self.max_rows,
            });
        }
        let filler_base = self.aggressors[0].with_col(0);
        let signal = slots
            .into_iter()
            .map(|slot| match slot {
                Some(i) => Ok(SignalEntry::Aggressor(self.aggressors[i % pattern_aggrs])),
                None => self
                    .draw_filler(lo, hi, params.max_filler_attempts, rng)
                    .map(|row| SignalEntry::Filler(filler_base.with_row(row)))
                    .ok_or(SignalError::FillerExhausted {
                        lo,
                        hi,
                        attempts: params.max_filler_attempts,
                    }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Signal(signal))
    }

    /// Row the driver synchronises on: `sync_row_offset` rows after the first
    /// aggressor, or before it if that leaves the row space.
    pub fn sync_addr(&self, params: &PatternParams) -> DRAMAddr {
        let first = self.aggressors[0];
        let row = first.row + params.sync_row_offset;
        if row < self.max_rows {
            first.with_row(row)
        } else {
            first.with_row(first.row.saturating_sub(params.sync_row_offset))
        }
    }

    /// First and last row to scan after hammering, both inclusive: the aggressor span
    /// padded by `scan_margin` and clamped to the row space.
    pub fn scan_range(&self, params: &PatternParams) -> (DRAMAddr, DRAMAddr) {
        let (min, max) = self.row_bounds();
        let first = self.aggressors[0].with_col(0);
        let lo = min.saturating_sub(params.scan_margin);
        let hi = (max + params.scan_margin).min(self.max_rows.saturating_sub(1));
        (first.with_row(lo), first.with_row(hi))
    }

    /// Half-open physical range covering every row of [`scan_range`](Self::scan_range).
    ///
    /// Ends at the first address of the row after the last scanned row, or at the end
    /// of the address space if the last row is the platform's top row.
    pub fn scan_phys_range(
        &self,
        params: &PatternParams,
        mem_config: &MemConfiguration,
    ) -> (PhysAddr, PhysAddr) {
        let (lo, hi) = self.scan_range(params);
        let end = if hi.row + 1 < mem_config.get_row_count() {
            hi.with_row(hi.row + 1).to_phys(mem_config)
        } else {
            mem_config.address_span() as PhysAddr
        };
        (lo.to_phys(mem_config), end)
    }

    /// Signal repetitions for one hammer call.
    pub fn rounds(&self, params: &PatternParams, signal_len: usize) -> usize {
        (params.round_factor * params.expected_act() / signal_len.max(1)).max(1)
    }

    /// Materializes the signal, hammers it and scans the aggressor range for flips.
    ///
    /// # Errors
    ///
    /// Fails if the signal cannot be materialized or the driver reports an error.
    pub fn hammer<D: HammerDriver + ?Sized>(
        &self,
        driver: &mut D,
        params: &PatternParams,
        rng: &mut Rng,
    ) -> Result<HammerOutcome, HammerError<D::Error>> {
        let signal = self.materialize_signal(params, rng)?;
        let mem_config = *driver.mem_config();
        debug!("{}: aggressor slots {:?}", self.phased, signal.aggressor_slots());
        trace!("signal {}", signal);

        let rounds = self.rounds(params, signal.len());
        let sync_addr = self.sync_addr(params).to_phys(&mem_config);
        let request = HammerRequest {
            sync_addr,
            addrs: signal.to_phys(&mem_config),
            rounds,
            act_per_ref: self.phased.shape().act_per_ref(),
        };
        driver.hammer(&request).map_err(HammerError::Driver)?;

        let scan_range = self.scan_phys_range(params, &mem_config);
        let flips = driver
            .scan(scan_range.0, scan_range.1)
            .map_err(HammerError::Driver)?;
        let possibly_truncated = check_undercount(&flips, scan_range.0, scan_range.1);
        let flips = flips
            .into_flips()
            .into_iter()
            .map(|flip| flip.locate(&mem_config))
            .collect::<Vec<_>>();
        if !flips.is_empty() {
            info!("{} flip(s) for instance at {}", flips.len(), self.base);
        }
        Ok(HammerOutcome {
            signal,
            rounds,
            sync_addr,
            scan_range,
            flips,
            possibly_truncated,
        })
    }
}
