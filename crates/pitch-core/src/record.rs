use crate::correlate::{Attachment, Correlation};
use crate::memory::{BitFlip, DRAMAddr, MemConfiguration, PhysAddr};
use crate::pattern::{HammerOutcome, PatternInstance, PhasedPatternShape};
use serde::Serialize;
use std::fmt::Display;

/// An aggressor and the physical address it was accessed through.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapping {
    /// DRAM coordinate of the aggressor
    pub dram: DRAMAddr,
    /// Physical address of the aggressor
    pub phys: PhysAddr,
}

/// Persisted result of one hammering attempt.
///
/// Contains the shape parameters, the realized address mapping and the flips
/// attributed to the pattern. Each attribution indexes the aggressors in `mapping`. Attempts that failed carry the error message instead.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PatternRecord {
    /// RFC 3339 timestamp of the attempt
    pub date: String,
    /// Instance identifier
    pub uid: u32,
    /// Identifier of the phased shape
    pub shape_uid: u32,
    /// Pattern period in activation slots
    pub period: usize,
    /// Tuple repetitions per period
    pub amplitude: usize,
    /// Replay frequency
    pub frequency: f64,
    /// Offset of the pattern inside the period
    pub phase: usize,
    /// Relative aggressor rows
    pub aggressors: Vec<isize>,
    /// Realized aggressor addresses
    pub mapping: Vec<AddressMapping>,
    /// Signal repetitions issued by the driver
    pub rounds: Option<usize>,
    /// Flips attributed to the pattern, with the nearest aggressor(s) and their distance
    pub attributions: Vec<Attachment>,
    /// Flips in the scan range that were not attributed
    pub rejected_flips: Vec<BitFlip>,
    /// The driver's flip list was full, the flip count is a lower bound
    pub possibly_truncated: bool,
    /// Failure of the attempt
    pub error: Option<String>,
}

impl PatternRecord {
    /// Record of a phased shape without instance data.
    pub fn from_phased(phased: &PhasedPatternShape) -> Self {
        let shape = phased.shape();
        PatternRecord {
            date: chrono::Local::now().to_rfc3339(),
            uid: phased.uid(),
            shape_uid: phased.uid(),
            period: shape.period(),
            amplitude: shape.amplitude(),
            frequency: shape.frequency().as_f64(),
            phase: phased.phase(),
            aggressors: shape.aggr_tuple().offsets().to_vec(),
            mapping: vec![],
            rounds: None,
            attributions: vec![],
            rejected_flips: vec![],
            possibly_truncated: false,
            error: None,
        }
    }

    /// Adds the instance identifier and aggressor mapping.
    pub fn with_instance(mut self, instance: &PatternInstance, mem_config: &MemConfiguration) -> Self {
        self.uid = instance.uid();
        self.mapping = instance
            .aggressors()
            .iter()
            .map(|&dram| AddressMapping {
                dram,
                phys: dram.to_phys(mem_config),
            })
            .collect();
        self
    }

    /// Adds the hammering outcome and the flip attribution.
    pub fn with_outcome(mut self, outcome: &HammerOutcome, correlation: Correlation) -> Self {
        self.rounds = Some(outcome.rounds);
        self.possibly_truncated = outcome.possibly_truncated;
        self.attributions = correlation.attached;
        self.rejected_flips = correlation.rejected;
        self
    }

    /// Marks the attempt as failed.
    pub fn with_error(mut self, error: impl Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Whether any flip was attributed to the pattern.
    pub fn has_flips(&self) -> bool {
        !self.attributions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternParams;
    use crate::memory::desktop_functions;
    use crate::util::Rng;
    use crate::pattern::{AggressorTuple, Frequency, PatternShape, bind_address, bind_phase};

    #[test]
    fn test_record_fields() {
        let config = MemConfiguration::from_functions(&desktop_functions()).unwrap();
        let tuple = AggressorTuple::new(vec![0, 2]).unwrap();
        let shape = PatternShape::new(4, 170, tuple, 3, Frequency::from_tenths(113)).unwrap();
        let phased = bind_phase(&shape, 4).unwrap();
        let inst = bind_address(&phased, DRAMAddr::new(1, 40, 0), 2048).unwrap();
        let record = PatternRecord::from_phased(&phased)
            .with_instance(&inst, &config)
            .with_error("driver error");
        assert_eq!(record.period, 61);
        assert_eq!(record.amplitude, 3);
        assert_eq!(record.frequency, 11.3);
        assert_eq!(record.phase, 4);
        assert_eq!(record.aggressors, vec![0, 2]);
        assert_eq!(record.uid, inst.uid());
        assert_eq!(record.shape_uid, phased.uid());
        assert_eq!(record.mapping[1].dram, DRAMAddr::new(1, 42, 0));
        assert_eq!(record.mapping[1].phys, DRAMAddr::new(1, 42, 0).to_phys(&config));
        assert!(!record.has_flips());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error"], "driver error");
        assert!(chrono::DateTime::parse_from_rfc3339(json["date"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_attribution_persisted() {
        let config = MemConfiguration::from_functions(&desktop_functions()).unwrap();
        let tuple = AggressorTuple::new(vec![0, 4]).unwrap();
        let shape = PatternShape::new(4, 170, tuple, 3, Frequency::from_tenths(113)).unwrap();
        let phased = bind_phase(&shape, 0).unwrap();
        let inst = bind_address(&phased, DRAMAddr::new(1, 40, 0), 2048).unwrap();
        let flip = |row| BitFlip {
            dram: Some(DRAMAddr::new(1, row, 0)),
            ..BitFlip::new(0x1000, 0x1, 0x1)
        };
        let per_aggressor = inst
            .aggressors()
            .iter()
            .map(|&a| vec![a])
            .collect::<Vec<_>>();
        let correlation = crate::correlate::correlate(
            &per_aggressor,
            &[flip(45), flip(42), BitFlip::new(0x2000, 0x1, 0x0)],
            Default::default(),
        );
        let signal = inst
            .materialize_signal(&PatternParams::default(), &mut Rng::from_seed(3))
            .unwrap();
        let outcome = HammerOutcome {
            signal,
            rounds: 7,
            sync_addr: 0,
            scan_range: (0, 0),
            flips: vec![],
            possibly_truncated: false,
        };
        let record = PatternRecord::from_phased(&phased)
            .with_instance(&inst, &config)
            .with_outcome(&outcome, correlation);
        assert!(record.has_flips());
        assert_eq!(record.rounds, Some(7));
        assert_eq!(record.attributions.len(), 2);
        assert_eq!(record.attributions[0].sub_patterns, vec![1]);
        assert_eq!(record.attributions[0].distance, 1);
        assert_eq!(record.attributions[1].sub_patterns, vec![0, 1]);
        assert_eq!(record.attributions[1].distance, 2);
        assert_eq!(record.rejected_flips.len(), 1);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["attributions"][0]["distance"], 1);
        assert_eq!(json["attributions"][1]["sub_patterns"][1], 1);
        assert_eq!(json["attributions"][0]["flip"]["dram"]["row"], 45);
    }
}
