//! Configuration of a pitch run.
//!
//! A [`PitchConfig`] bundles the platform's address functions, the timing budget and
//! materializer parameters, and the campaign sweep bounds. It is loaded from JSON:
//!
//! ```json
//! {
//!   "platform": { "size": 30, "row_mask": "0x3ff80000", "col_mask": "0x1fff",
//!                 "bank_fns": ["0x4080", "0x88000"] },
//!   "params": { "guard_rows": 5 },
//!   "campaign": { "shapes": 10, "aggressors": [0, 2] }
//! }
//! ```
use crate::correlate::CorrelationPolicy;
use crate::memory::{AddressFunctions, ConfigurationError, MemConfiguration};
use crate::util::{
    AGGRESSOR_ACT_RATIO, GUARD_ROW_CNT, MAX_ACT_PER_REF, MAX_FILLER_ATTEMPTS, MAX_REFS, MAX_ROWS,
    REFS_PER_RI, ROUND_FACTOR, SCAN_MARGIN, SYNC_ROW_OFFSET,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Refresh budget and materializer parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PatternParams {
    /// REF commands per refresh window
    pub refs_per_ri: usize,
    /// REF intervals spanned by the longest pattern period
    pub max_refs: usize,
    /// Activations that fit between two REF commands
    pub max_act_per_ref: usize,
    /// Share of the activations of one refresh window spent on the aggressors
    pub aggressor_act_ratio: f64,
    /// Guard rows on either side of the aggressors that filler rows avoid
    pub guard_rows: usize,
    /// Filler rows are drawn from `[0, max_rows)`
    pub max_rows: usize,
    /// Row offset of the synchronisation address from the first aggressor
    pub sync_row_offset: usize,
    /// Rows scanned beyond the outermost aggressors
    pub scan_margin: usize,
    /// Multiple of the activation budget issued per hammer call
    pub round_factor: usize,
    /// Filler draws per slot before materialization fails
    pub max_filler_attempts: usize,
}

impl Default for PatternParams {
    fn default() -> Self {
        PatternParams {
            refs_per_ri: REFS_PER_RI,
            max_refs: MAX_REFS,
            max_act_per_ref: MAX_ACT_PER_REF,
            aggressor_act_ratio: AGGRESSOR_ACT_RATIO,
            guard_rows: GUARD_ROW_CNT,
            max_rows: MAX_ROWS,
            sync_row_offset: SYNC_ROW_OFFSET,
            scan_margin: SCAN_MARGIN,
            round_factor: ROUND_FACTOR,
            max_filler_attempts: MAX_FILLER_ATTEMPTS,
        }
    }
}

impl PatternParams {
    /// Aggressor activations per refresh window.
    pub fn expected_act(&self) -> usize {
        ((self.refs_per_ri * self.max_act_per_ref) as f64 * self.aggressor_act_ratio) as usize
    }

    /// Aggressor activations per maximal pattern period.
    pub fn expected_act_per_max_period(&self) -> usize {
        if self.max_refs == 0 {
            return 0;
        }
        (self.expected_act() as f64 / (self.refs_per_ri as f64 / self.max_refs as f64)) as usize
    }

    /// The period ceiling in activation slots.
    pub fn max_period(&self) -> usize {
        self.max_refs * self.max_act_per_ref
    }
}

/// Bounds of a pattern sweep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CampaignConfig {
    /// Number of pattern shapes to generate
    pub shapes: usize,
    /// Phases drawn per shape
    pub phases: usize,
    /// Base addresses drawn per phased shape
    pub instances: usize,
    /// Relative row offsets of the aggressor tuple
    pub aggressors: Vec<isize>,
    /// Banks are drawn from `[0, max_bank)`
    pub max_bank: usize,
    /// Base rows are drawn from `[0, max_base_row)`
    pub max_base_row: usize,
    /// Seed of the campaign RNG; drawn from the OS if absent
    pub seed: Option<u64>,
    /// Flip attribution policy
    pub correlation: CorrelationPolicy,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        CampaignConfig {
            shapes: 2000,
            phases: 20,
            instances: 5,
            aggressors: vec![0, 2],
            max_bank: 16,
            max_base_row: 512,
            seed: None,
            correlation: CorrelationPolicy::default(),
        }
    }
}

/// Complete pitch configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PitchConfig {
    /// Address functions of the platform
    pub platform: AddressFunctions,
    /// Timing and materializer parameters
    #[serde(default)]
    pub params: PatternParams,
    /// Sweep bounds
    #[serde(default)]
    pub campaign: CampaignConfig,
}

impl PitchConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_jsonfile(filepath: impl AsRef<Path>) -> Result<PitchConfig, ConfigurationError> {
        let mut file = File::open(filepath.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: PitchConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Resolves the platform address functions.
    pub fn mem_config(&self) -> Result<MemConfiguration, ConfigurationError> {
        MemConfiguration::from_functions(&self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let params = PatternParams::default();
        assert_eq!(params.refs_per_ri, 8205);
        assert_eq!(params.expected_act(), 139485);
        assert_eq!(params.expected_act_per_max_period(), 68);
        assert_eq!(params.max_period(), 680);
    }

    #[test]
    fn test_parse_minimal() {
        let config: PitchConfig = serde_json::from_str(
            r#"{"platform": {"size": 30, "row_mask": "0x3ff80000", "col_mask": "0x1fff",
                "bank_fns": ["0x4080", "0x88000", "0x110000", "0x220000", "0x440000", "0x4b300"]},
                "params": {"guard_rows": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.params.guard_rows, 7);
        assert_eq!(config.params.max_rows, MAX_ROWS);
        assert_eq!(config.campaign, CampaignConfig::default());
        let mem = config.mem_config().unwrap();
        assert_eq!(mem.get_bank_count(), 64);
    }

    #[test]
    fn test_shipped_config() {
        let config = PitchConfig::from_jsonfile(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../config/pitch-config.json"
        ))
        .unwrap();
        config.mem_config().unwrap();
        assert_eq!(config.campaign.aggressors, vec![0, 2]);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PitchConfig::from_jsonfile("/nonexistent/pitch.json"),
            Err(ConfigurationError::Io(_))
        ));
    }
}
