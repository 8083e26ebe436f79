//! Native hammering driver.
//!
//! This crate provides the timed-access driver for x86_64 Linux. It maps a 1 GiB
//! hugepage at a fixed virtual address, fills it with address-derived values, runs the
//! refresh-synchronised access loop of a hammer request and scans address ranges for
//! words that deviate from their expected value.
//!
//! Implements the [`pitch_core::hammerer::HammerDriver`] trait.
//!
//! # Requirements
//!
//! - x86_64 CPU with `clflushopt` and `rdtscp`
//! - 1 GiB hugepages reserved (`hugepagesz=1G hugepages=1`)
//! - The platform's physical address width must not exceed the mapped buffer, and the
//!   hugepage must be physically contiguous for offsets in the buffer to equal
//!   physical address bits below the width.

#![warn(missing_docs)]

mod buffer;
mod hammerlib;

pub use hammerlib::{DEFAULT_SYNC_THRESHOLD, HammerLib};
