//! Control core for a voltage fault-injection firmware.
//!
//! The target device's boot flow is diverted by a precisely timed glitch
//! pulse. This crate owns the attempt orchestration: validating the
//! monitored rails, searching the timing-offset space across three tiers,
//! persisting what worked, and signaling the outcome through the single
//! RGB indicator before powering down for good.
//!
//! Everything hardware-specific sits behind the traits in [`hal`]; the
//! RP2040 implementation lives in [`board`] and only builds on target.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod error;
pub mod hal;
pub mod orchestrator;
pub mod pins;
pub mod poll;
pub mod power;
pub mod search;
pub mod selftest;
pub mod status;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod board;

#[cfg(test)]
pub(crate) mod testutil;
