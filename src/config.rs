//! Tunable parameters of the hardening scheme.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::history::HISTORY_SIZE;
use crate::poly::COEFFICIENT_BITS;
use crate::Error;

/// Parameters for enrollment and login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardeningConfig {
    /// History window size `h`; also the warm-up length before any feature
    /// can be distinguishing.
    pub history_window: usize,
    /// Distinguishing strictness `k` (multiples of the standard deviation).
    pub k: f64,
    /// Plaintext size of the history block in bytes.
    pub history_size: usize,
    /// Bit-length range of random polynomial coefficients.
    pub coefficient_bits: Range<u64>,
    /// Corruption offsets are drawn from `[-max_offset, max_offset)`, never 0.
    pub max_offset: i64,
    /// Report `CorruptHistory` separately instead of folding it into
    /// `BadCredential`.
    pub diagnostics: bool,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            history_window: 50,
            k: 1.0,
            history_size: HISTORY_SIZE,
            coefficient_bits: COEFFICIENT_BITS,
            max_offset: 1000,
            diagnostics: false,
        }
    }
}

impl HardeningConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Bad config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the history window `h`.
    pub fn with_history_window(mut self, h: usize) -> Self {
        self.history_window = h;
        self
    }

    /// Set the distinguishing factor `k`.
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    /// Set the history block size in bytes.
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Surface `CorruptHistory` from `try_login`.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.history_window == 0 {
            return Err(Error::InvalidInput("history_window must be at least 1".into()));
        }
        if !self.k.is_finite() || self.k < 0.0 {
            return Err(Error::InvalidInput(format!("k must be finite and >= 0, got {}", self.k)));
        }
        if self.coefficient_bits.is_empty() || self.coefficient_bits.start == 0 {
            return Err(Error::InvalidInput(format!(
                "coefficient_bits must be a non-empty range above 0, got {:?}",
                self.coefficient_bits
            )));
        }
        if self.max_offset < 1 {
            return Err(Error::InvalidInput("max_offset must be at least 1".into()));
        }
        if self.history_size == 0 {
            return Err(Error::InvalidInput("history_size must be at least 1".into()));
        }
        Ok(())
    }
}
