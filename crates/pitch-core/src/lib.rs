//! # Pitch Core
//!
//! `pitch-core` synthesizes Rowhammer patterns with controlled frequency, amplitude
//! and phase, and resolves them into physical addresses for a timed-access driver.
//!
//! ## Architecture Overview
//!
//! Generation flows in one direction:
//!
//! parameters → [`pattern::PatternShape`] → [`pattern::PhasedPatternShape`] →
//! [`pattern::PatternInstance`] → [`pattern::Signal`] → driver → flips →
//! [`correlate::Correlation`]
//!
//! The driver interface is defined by the [`hammerer::HammerDriver`] trait; concrete
//! drivers live in their own crates (`pitch-hammerlib`, `pitch-dummy`).
//!
//! ## Main Components
//!
//! - [`memory`] module - The GF(2) address resolver: [`memory::AddressMatrix`],
//!   [`memory::MemConfiguration`] and [`memory::DRAMAddr`] translate between physical
//!   addresses and the DRAM geometry.
//!
//! - [`pattern`] module - Pattern shapes, their generator, phase binding, address
//!   binding and signal materialization.
//!
//! - [`correlate`] module - Attributes reported bit flips to the nearest aggressor
//!   sub-pattern.
//!
//! - [`Campaign`] - Sweeps shapes, phases and base addresses on one driver and
//!   produces a [`PatternRecord`] per hammering attempt.
//!
//! - [`config`] module - JSON configuration of platform, timing budget and sweep.
//!
//! ## Platform Support
//!
//! Everything except the drivers is platform independent. The native driver requires
//! x86_64 Linux with 1 GiB hugepages.

#![warn(missing_docs)]

mod campaign;
pub mod config;
pub mod correlate;
pub mod hammerer;
pub mod memory;
pub mod pattern;
mod record;
pub mod util;

pub use campaign::{Campaign, CampaignBuilder, CampaignSummary, Error};
pub use record::{AddressMapping, PatternRecord};
