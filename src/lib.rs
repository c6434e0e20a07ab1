//! CTPDEC-RS: Raw trigger-link decoder for the Central Trigger Processor
//!
//! This crate reconstructs time-stamped trigger digits and per-heartbeat
//! luminosity counters from the fixed-size hardware packets of the CTP
//! readout links.

pub mod common;
pub mod config;
pub mod decoder;
pub mod raw;
pub mod rawfile;
