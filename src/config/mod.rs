//! Configuration for the CTP decoder
//!
//! Loaded from TOML files. Every section has defaults, so an empty file
//! (or no file) yields a working configuration.
//!
//! # Example
//! ```ignore
//! let config = Config::load("ctpdec.toml")?;
//! let decoder = RawDataDecoder::new(config);
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decoder: DecoderConfig,
    pub offsets: TriggerOffsets,
    pub lumi: LumiPatterns,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Which outputs the decode pass produces
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Produce the digit map
    pub do_digits: bool,
    /// Produce luminosity samples
    pub do_lumi: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            do_digits: true,
            do_lumi: true,
        }
    }
}

/// Channel timing-offset constants, in bunch crossings.
///
/// The interaction-record channel is corrected by `bc_shift`; the
/// class-record channel by `bc_shift + lm_l0 + l0_l1 - 1`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggerOffsets {
    /// Detector-specific shift applied to both channels
    pub bc_shift: i64,
    /// LM-to-L0 trigger latency
    pub lm_l0: i64,
    /// L0-to-L1 trigger latency
    pub l0_l1: i64,
}

impl Default for TriggerOffsets {
    fn default() -> Self {
        Self {
            bc_shift: 0,
            lm_l0: 15,
            l0_l1: 280,
        }
    }
}

/// Trigger-input patterns tallied by the luminosity accumulator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LumiPatterns {
    /// Minimum-bias pattern (TVX input)
    pub mb_trigger_mask: u64,
    /// Veto pattern (VBA input)
    pub mb_veto_mask: u64,
}

impl Default for LumiPatterns {
    fn default() -> Self {
        Self {
            mb_trigger_mask: 0x4,
            mb_veto_mask: 0x20,
        }
    }
}
