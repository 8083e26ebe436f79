//! Simulated driver for testing.
//!
//! This crate provides a driver that performs no memory accesses. It counts the
//! activations of every row in a hammer request and plants bit flips in the
//! neighbouring rows of rows activated more often than a threshold. A subsequent scan
//! reports them. Useful for testing the pattern pipeline without hardware.
//!
//! Implements the [`pitch_core::hammerer::HammerDriver`] trait.
//!
//! # Use Cases
//!
//! - Integration testing of campaigns
//! - Dry runs of a configuration on machines without hugepages

#![warn(missing_docs)]

mod dummy;

pub use dummy::Dummy;
