//! # Pitch
//!
//! Frequency, amplitude and phase sweeps of Rowhammer patterns.
//!
//! This crate re-exports [`pitch_core`] and, behind the `hammerlib` and `dummy`
//! features, the driver crates.
//!
//! ```no_run
//! use pitch::config::PitchConfig;
//! use pitch::hammerer::HammerDriver;
//! # #[cfg(feature = "dummy")]
//! # fn main() -> anyhow::Result<()> {
//! let config = PitchConfig::from_jsonfile("config/pitch-config.json")?;
//! let mut driver = pitch::pitch_dummy::Dummy::new(config.mem_config()?, 0);
//! driver.init()?;
//! let mut campaign = pitch::Campaign::builder()
//!     .driver(driver)
//!     .params(config.params)
//!     .config(config.campaign)
//!     .build()?;
//! let records = campaign.run();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "dummy"))]
//! # fn main() {}
//! ```
pub use pitch_core::*;

#[cfg(feature = "dummy")]
pub use pitch_dummy;
#[cfg(feature = "hammerlib")]
pub use pitch_hammerlib;
