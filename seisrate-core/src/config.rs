//! Model configuration with layered defaults.
//!
//! Callers may override any field; omitted fields fall back to the worker's
//! defaults, so a partial TOML document is a valid configuration.

use crate::errors::{ForecastError, ForecastResult};
use crate::grid::MagnitudeBin;
use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Model parameters, with defaults filled in for any field the caller omits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Seconds between returned forecast rate values. The engine reads the
    /// epoch from [`crate::forecast::ForecastWindow`]; the service layer
    /// assembling a request copies this default into windows that do not
    /// override it.
    pub epoch_duration: FloatValue,
    /// Emit one child node per (cell, depth interval) instead of a single
    /// whole-reservoir result.
    pub return_subgeoms: bool,
    /// First magnitude bin, inclusive.
    pub mag_start: FloatValue,
    /// End of the magnitude range, exclusive.
    pub mag_end: FloatValue,
    pub mag_increment: FloatValue,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            epoch_duration: 14_400.0,
            return_subgeoms: false,
            mag_start: 1.0,
            mag_end: 8.0,
            mag_increment: 0.1,
        }
    }
}

impl ModelConfig {
    pub fn from_toml_str(raw: &str) -> ForecastResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ForecastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.epoch_duration < 0.0 || !self.epoch_duration.is_finite() {
            return Err(ForecastError::Config(format!(
                "epoch_duration must be non-negative, got {}",
                self.epoch_duration
            )));
        }
        if self.mag_increment <= 0.0 {
            return Err(ForecastError::Config(format!(
                "mag_increment must be positive, got {}",
                self.mag_increment
            )));
        }
        if self.mag_end <= self.mag_start {
            return Err(ForecastError::Config(format!(
                "magnitude range [{}, {}) is empty",
                self.mag_start, self.mag_end
            )));
        }
        Ok(())
    }

    /// Magnitude bins generated from the configured range, with reference
    /// magnitudes rounded to one decimal.
    pub fn magnitude_bins(&self) -> Vec<MagnitudeBin> {
        Array1::range(self.mag_start, self.mag_end, self.mag_increment)
            .iter()
            .map(|m| {
                let magnitude = (m * 10.0).round() / 10.0;
                MagnitudeBin {
                    label: format!("{magnitude:.1}"),
                    magnitude,
                }
            })
            .collect()
    }
}
