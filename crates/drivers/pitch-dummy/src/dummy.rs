use itertools::Itertools;
use log::{debug, trace};
use pitch_core::hammerer::{DriverError, FLIP_LIST_CAPACITY, FlipList, HammerDriver, HammerRequest};
use pitch_core::memory::{BitFlip, DRAMAddr, MemConfiguration, PhysAddr};
use pitch_core::util::{Rng, WORD_SIZE};
use rand::Rng as _;
use std::collections::BTreeMap;

/// Activations of one row per hammer call above which its neighbours flip.
const DEFAULT_THRESHOLD: usize = 100_000;

/// Simulated driver that plants flips next to heavily activated rows.
pub struct Dummy {
    config: MemConfiguration,
    initialized: bool,
    threshold: usize,
    capacity: usize,
    rng: Rng,
    /// Flipped words not yet scanned, keyed by address
    pending: BTreeMap<PhysAddr, BitFlip>,
    requests: Vec<HammerRequest>,
}

impl Dummy {
    /// Creates a new dummy driver translating with `config`.
    pub fn new(config: MemConfiguration, seed: u64) -> Self {
        Dummy {
            config,
            initialized: false,
            threshold: DEFAULT_THRESHOLD,
            capacity: FLIP_LIST_CAPACITY,
            rng: Rng::from_seed(seed),
            pending: BTreeMap::new(),
            requests: vec![],
        }
    }

    /// Sets the activation count per hammer call above which neighbours flip.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the flip list capacity.
    pub fn with_flip_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// All requests hammered so far.
    pub fn requests(&self) -> &[HammerRequest] {
        &self.requests
    }

    /// Number of planted flips not yet reported by a scan.
    pub fn pending_flips(&self) -> usize {
        self.pending.len()
    }

    fn check_addr(&self, addr: PhysAddr) -> Result<(), DriverError> {
        if addr & !self.config.address_mask() != 0 {
            return Err(DriverError::OutOfBounds {
                addr,
                len: self.config.address_span(),
            });
        }
        Ok(())
    }

    fn plant_flip(&mut self, victim: DRAMAddr) {
        let words = self.config.get_col_count() / WORD_SIZE;
        let col = self.rng.random_range(0..words.max(1)) * WORD_SIZE;
        let addr = victim.with_col(col).to_phys(&self.config);
        let bitmask = 1u64 << self.rng.random_range(0..u64::BITS);
        let data = self.rng.random::<u64>();
        trace!("planting flip {:#x} at {}", bitmask, victim.with_col(col));
        self.pending
            .entry(addr)
            .and_modify(|flip| flip.bitmask |= bitmask)
            .or_insert(BitFlip::new(addr, bitmask, data));
    }
}

impl HammerDriver for Dummy {
    type Error = DriverError;

    fn init(&mut self) -> Result<(), DriverError> {
        debug!("Dummy driver initialized");
        self.initialized = true;
        Ok(())
    }

    fn mem_config(&self) -> &MemConfiguration {
        &self.config
    }

    fn hammer(&mut self, request: &HammerRequest) -> Result<(), DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        self.check_addr(request.sync_addr)?;
        for &addr in &request.addrs {
            self.check_addr(addr)?;
        }
        let counts = request
            .addrs
            .iter()
            .map(|&addr| DRAMAddr::from_phys(addr, &self.config).with_col(0))
            .counts();
        let rows = self.config.get_row_count();
        let hot = counts
            .into_iter()
            .filter(|(_, count)| count * request.rounds >= self.threshold)
            .map(|(row, _)| row)
            .sorted()
            .collect::<Vec<_>>();
        debug!(
            "Hammered {} accesses, {} row(s) above threshold",
            request.total_accesses(),
            hot.len()
        );
        for aggr in hot {
            for victim in [aggr.offset_row(-1), aggr.offset_row(1)]
                .into_iter()
                .flatten()
                .filter(|v| v.row < rows)
            {
                self.plant_flip(victim);
            }
        }
        self.requests.push(request.clone());
        Ok(())
    }

    fn scan(&mut self, begin: PhysAddr, end: PhysAddr) -> Result<FlipList, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        let (lo, hi) = (begin.min(end), begin.max(end));
        let found = self
            .pending
            .range(lo..hi)
            .map(|(&addr, _)| addr)
            .collect::<Vec<_>>();
        let mut flips = FlipList::with_capacity(self.capacity);
        for addr in found {
            if let Some(flip) = self.pending.remove(&addr) {
                flips.push(flip);
            }
        }
        debug!("Scan {:#x}..{:#x}: {} flip(s)", lo, hi, flips.len());
        Ok(flips)
    }

    fn flip_capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_core::memory::AddressFunctions;

    fn config() -> MemConfiguration {
        let funcs = AddressFunctions::new(30, 0x3ff80000, 0x1fff)
            .bank_fns(&[0x4080, 0x88000, 0x110000, 0x220000, 0x440000, 0x4b300]);
        MemConfiguration::from_functions(&funcs).unwrap()
    }

    fn request(config: &MemConfiguration, rows: &[usize], rounds: usize) -> HammerRequest {
        HammerRequest {
            sync_addr: DRAMAddr::new(4, 200, 0).to_phys(config),
            addrs: rows
                .iter()
                .map(|&r| DRAMAddr::new(4, r, 0).to_phys(config))
                .collect(),
            rounds,
            act_per_ref: 170,
        }
    }

    #[test]
    fn test_requires_init() {
        let config = config();
        let mut dummy = Dummy::new(config, 0);
        assert!(matches!(
            dummy.hammer(&request(&config, &[10], 1)),
            Err(DriverError::NotInitialized)
        ));
    }

    #[test]
    fn test_flips_next_to_hot_rows() {
        let config = config();
        let mut dummy = Dummy::new(config, 0).with_threshold(1000);
        dummy.init().unwrap();
        // row 100 is hot, row 300 is accessed once per round
        dummy
            .hammer(&request(&config, &[100, 100, 300], 500))
            .unwrap();
        assert_eq!(dummy.pending_flips(), 2);
        let begin = DRAMAddr::new(4, 95, 0).to_phys(&config);
        let end = DRAMAddr::new(4, 105, 0).to_phys(&config);
        let flips = dummy.scan(begin, end).unwrap();
        let mut rows = flips
            .flips()
            .iter()
            .map(|f| DRAMAddr::from_phys(f.addr, &config).row)
            .collect::<Vec<_>>();
        rows.sort();
        assert_eq!(rows, vec![99, 101]);
        assert_eq!(dummy.pending_flips(), 0);
        assert!(dummy.scan(begin, end).unwrap().is_empty());
    }

    #[test]
    fn test_capacity_truncates() {
        let config = config();
        let mut dummy = Dummy::new(config, 1)
            .with_threshold(1)
            .with_flip_capacity(1);
        dummy.init().unwrap();
        dummy.hammer(&request(&config, &[100, 102], 1)).unwrap();
        let begin = DRAMAddr::new(4, 95, 0).to_phys(&config);
        let end = DRAMAddr::new(4, 110, 0).to_phys(&config);
        let flips = dummy.scan(end, begin).unwrap();
        assert_eq!(flips.len(), 1);
        assert!(flips.possibly_truncated());
    }

    #[test]
    fn test_out_of_bounds() {
        let config = config();
        let mut dummy = Dummy::new(config, 0);
        dummy.init().unwrap();
        let mut req = request(&config, &[1], 1);
        req.addrs.push(1 << 30);
        assert!(matches!(
            dummy.hammer(&req),
            Err(DriverError::OutOfBounds { addr, .. }) if addr == 1 << 30
        ));
    }
}
