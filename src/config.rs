use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ForecastError, Result};

/// Hyperparameters shared by the training and prediction pipelines.
///
/// Every field has a default, so a JSON file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of past weeks fed to the model.
    pub look_back: usize,
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of the series used for training, the rest is held out.
    pub split_ratio: f64,
    pub hidden_size: usize,
    pub dropout_rate: f64,
    pub learning_rate: f64,
    /// Reshuffle training windows at the start of every epoch.
    pub shuffle: bool,
    pub clip_gradient: Option<f64>,
    /// Seed for weight init, dropout masks and shuffling.
    pub seed: Option<u64>,
    /// Emit an epoch progress event every `log_every` epochs.
    pub log_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            look_back: 4,
            epochs: 50,
            batch_size: 16,
            split_ratio: 0.8,
            hidden_size: 50,
            dropout_rate: 0.2,
            learning_rate: 0.001,
            shuffle: true,
            clip_gradient: None,
            seed: None,
            log_every: 10,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.look_back == 0 {
            return Err(ForecastError::InvalidConfig("look_back must be at least 1".into()));
        }
        if self.epochs == 0 {
            return Err(ForecastError::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "split_ratio must lie in (0, 1), got {}",
                self.split_ratio
            )));
        }
        if self.hidden_size == 0 {
            return Err(ForecastError::InvalidConfig("hidden_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ForecastError::InvalidConfig(format!(
                "dropout_rate must lie in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if let Some(clip) = self.clip_gradient {
            if !(clip > 0.0) {
                return Err(ForecastError::InvalidConfig(format!(
                    "clip_gradient must be positive, got {}",
                    clip
                )));
            }
        }
        Ok(())
    }

    /// Smallest series length that yields at least one window.
    pub fn min_series_len(&self) -> usize {
        self.look_back + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let config = PipelineConfig::default();
        assert_eq!(config.look_back, 4);
        assert_eq!(config.epochs, 50);
        assert_eq!(config.batch_size, 16);
        assert!((config.split_ratio - 0.8).abs() < 1e-12);
        assert_eq!(config.hidden_size, 50);
        assert!((config.dropout_rate - 0.2).abs() < 1e-12);
        assert!(config.validate().is_ok());
        assert_eq!(config.min_series_len(), 6);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            PipelineConfig { look_back: 0, ..Default::default() },
            PipelineConfig { batch_size: 0, ..Default::default() },
            PipelineConfig { split_ratio: 1.0, ..Default::default() },
            PipelineConfig { dropout_rate: 1.0, ..Default::default() },
            PipelineConfig { learning_rate: 0.0, ..Default::default() },
            PipelineConfig { clip_gradient: Some(-1.0), ..Default::default() },
        ];
        for config in bad.iter() {
            assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "epochs": 5, "seed": 7 }}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.look_back, 4);
        assert_eq!(config.batch_size, 16);
    }
}
