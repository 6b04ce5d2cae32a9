//! # Maintenance Forecast
//!
//! Weekly forecasts of maintenance metrics (failure counts, downtime hours,
//! workload hours) from a single-layer LSTM regressor.
//!
//! ## Core Components
//!
//! - **Windowing**: fixed `look_back` input windows with one-step-ahead targets
//! - **Scaling**: min-max scale fit once per metric and reused at inference
//! - **Sequence model**: LSTM(50) → Dropout(0.2) → Linear(1), MSE loss, Adam
//! - **Model store**: model and scale state persisted together per metric
//! - **Pipelines**: per-metric training and prediction with typed outcomes
//!
//! ## Quick Start
//!
//! ```rust
//! use maintenance_forecast::{MemoryModelStore, PipelineConfig, PredictionPipeline, TrainingPipeline};
//!
//! let config = PipelineConfig { epochs: 2, hidden_size: 8, seed: Some(1), ..Default::default() };
//! let series: Vec<f64> = (0..40).map(|week| (week % 7) as f64).collect();
//!
//! let mut store = MemoryModelStore::new();
//! let training = TrainingPipeline::new(config.clone()).unwrap();
//! let trained = training.run(&mut store, vec![("failures", series.clone())]);
//! assert!(trained.all_succeeded());
//!
//! let prediction = PredictionPipeline::new(config).unwrap();
//! let report = prediction.run(&store, vec![("failures", series)]);
//! assert_eq!(report.records("failures").len(), 35);
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod pipeline;
pub mod scaler;
pub mod series;
pub mod training;
pub mod utils;
pub mod windowing;

// Re-export commonly used items
pub use config::PipelineConfig;
pub use error::{ForecastError, Result};
pub use export::{write_predictions_json, PredictionExport, PredictionRecord};
pub use models::sequence_model::SequenceModel;
pub use persistence::{ArtifactFormat, ArtifactMetadata, FileModelStore, MemoryModelStore, ModelArtifact, ModelStore};
pub use pipeline::{PredictionPipeline, PredictionReport, TrainingPipeline, TrainingReport, TrainingSummary};
pub use scaler::ScaleState;
pub use series::{aggregate_weekly, Aggregation, MetricKind, WeeklySeries};
pub use training::{Trainer, TrainingConfig};
pub use windowing::{chronological_split, window, Windows};
