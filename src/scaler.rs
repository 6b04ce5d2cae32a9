//! Min-max scaling fit once per metric and reused at inference.
//!
//! x_scaled = (x - min) / (max - min)

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// The `(min, max)` pair defining a reversible affine map onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleState {
    pub min: f64,
    pub max: f64,
}

impl ScaleState {
    /// Fit the scale on a reference series.
    ///
    /// Fails with `DegenerateRange` for a constant series, since the
    /// inverse transform would collapse every prediction onto one value.
    pub fn fit(series: &[f64]) -> Result<Self> {
        if series.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        ensure_finite(series)?;

        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if max == min {
            return Err(ForecastError::DegenerateRange { value: min });
        }

        Ok(ScaleState { min, max })
    }

    /// Finite bounds with `max > min`; anything else cannot be inverted.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Values outside the fitted range map outside `[0, 1]`.
    pub fn transform(&self, series: &[f64]) -> Vec<f64> {
        let range = self.range();
        series.iter().map(|&x| (x - self.min) / range).collect()
    }

    pub fn inverse_transform(&self, normalized: &[f64]) -> Vec<f64> {
        let range = self.range();
        normalized.iter().map(|&x| x * range + self.min).collect()
    }

    pub fn inverse_value(&self, normalized: f64) -> f64 {
        normalized * self.range() + self.min
    }
}

/// Rejects NaN and infinite values, naming the first offending week.
pub fn ensure_finite(series: &[f64]) -> Result<()> {
    match series.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ForecastError::InvalidSeries(format!(
            "non-finite value {} at index {}",
            series[i], i
        ))),
        None => Ok(()),
    }
}
