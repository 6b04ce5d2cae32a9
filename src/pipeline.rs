//! Per-metric training and prediction.
//!
//! Each metric is processed independently and its outcome recorded in a
//! report; a failure for one metric never stops the others.
//!
//! The scaler is fit on the full series before the train/test split, so
//! the held-out weeks influence the scale range. This matches how earlier
//! models were produced and is kept for comparability. The held-out
//! windows are built and counted but not scored.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::export::{PredictionExport, PredictionRecord};
use crate::models::sequence_model::SequenceModel;
use crate::persistence::{validate_metric_name, ArtifactMetadata, ModelArtifact, ModelStore};
use crate::scaler::{ensure_finite, ScaleState};
use crate::training::create_trainer;
use crate::utils::fnv1a;
use crate::windowing::{chronological_split, window};

/// Outcome of every metric in a run, ordered by metric name
#[derive(Debug, Default)]
pub struct MetricReport<T> {
    outcomes: BTreeMap<String, Result<T>>,
}

impl<T> MetricReport<T> {
    pub fn new() -> Self {
        MetricReport {
            outcomes: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, metric: &str, outcome: Result<T>) {
        self.outcomes.insert(metric.to_string(), outcome);
    }

    pub fn get(&self, metric: &str) -> Option<&Result<T>> {
        self.outcomes.get(metric)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<T>)> + '_ {
        self.outcomes.iter().map(|(metric, outcome)| (metric.as_str(), outcome))
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.iter().filter_map(|(metric, outcome)| outcome.as_ref().ok().map(|value| (metric, value)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ForecastError)> + '_ {
        self.iter().filter_map(|(metric, outcome)| outcome.as_ref().err().map(|err| (metric, err)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(|outcome| outcome.is_ok())
    }
}

/// What a successful training run produced for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub metric: String,
    pub series_len: usize,
    pub train_windows: usize,
    /// Windows built from the held-out segment; not scored
    pub test_windows: usize,
    pub epochs: usize,
    pub final_loss: Option<f64>,
    pub scale: ScaleState,
}

pub type TrainingReport = MetricReport<TrainingSummary>;
pub type PredictionReport = MetricReport<Vec<PredictionRecord>>;

impl PredictionReport {
    /// Records for `metric`; empty when it failed or was never requested
    pub fn records(&self, metric: &str) -> &[PredictionRecord] {
        match self.get(metric) {
            Some(Ok(records)) => records,
            _ => &[],
        }
    }

    /// Failed metrics map to an empty list
    pub fn into_export(self) -> PredictionExport {
        self.outcomes
            .into_iter()
            .map(|(metric, outcome)| (metric, outcome.unwrap_or_default()))
            .collect()
    }
}

/// Random source for one metric: reproducible when a seed is configured
fn metric_rng(seed: Option<u64>, metric: &str) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ fnv1a(metric.as_bytes())),
        None => StdRng::from_entropy(),
    }
}

/// Fits a scaler and a fresh model per metric and saves both to a store
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(TrainingPipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn train_metric<S: ModelStore + ?Sized>(&self, store: &mut S, metric: &str, series: &[f64]) -> Result<TrainingSummary> {
        validate_metric_name(metric)?;
        let config = &self.config;

        if series.len() < config.min_series_len() {
            return Err(ForecastError::InsufficientData {
                needed: config.min_series_len(),
                got: series.len(),
            });
        }

        let scale = ScaleState::fit(series)?;
        let scaled = scale.transform(series);
        let (train, test) = chronological_split(&scaled, config.split_ratio);
        let train_windows = window(train, config.look_back);
        let test_windows = window(test, config.look_back);

        if train_windows.len() < config.batch_size {
            return Err(ForecastError::InsufficientData {
                needed: config.batch_size,
                got: train_windows.len(),
            });
        }

        tracing::info!(
            metric,
            weeks = series.len(),
            train_windows = train_windows.len(),
            test_windows = test_windows.len(),
            "training model"
        );

        let mut rng = metric_rng(config.seed, metric);
        let model = SequenceModel::new(config.look_back, config.hidden_size, config.dropout_rate, &mut rng);
        let mut trainer = create_trainer(model, config, rng);
        trainer.fit(&train_windows)?;

        let final_loss = trainer.get_latest_metrics().map(|m| m.train_loss);
        let artifact = ModelArtifact {
            metric: metric.to_string(),
            model: trainer.into_model(),
            scale,
            metadata: ArtifactMetadata::new(metric, config, final_loss),
        };
        store.save(&artifact)?;

        tracing::info!(metric, final_loss = ?final_loss, "model saved");

        Ok(TrainingSummary {
            metric: metric.to_string(),
            series_len: series.len(),
            train_windows: train_windows.len(),
            test_windows: test_windows.len(),
            epochs: config.epochs,
            final_loss,
            scale,
        })
    }

    pub fn run<S, I, K, V>(&self, store: &mut S, metrics: I) -> TrainingReport
    where
        S: ModelStore + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[f64]>,
    {
        let mut report = TrainingReport::new();
        for (metric, series) in metrics {
            let metric = metric.as_ref();
            let outcome = self.train_metric(store, metric, series.as_ref());
            if let Err(ref err) = outcome {
                tracing::warn!(metric, error = %err, "skipping metric");
            }
            report.insert(metric, outcome);
        }
        report
    }
}

/// Applies stored artifacts to fresh series
#[derive(Debug, Clone)]
pub struct PredictionPipeline {
    config: PipelineConfig,
}

impl PredictionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(PredictionPipeline { config })
    }

    /// Predict every window of `series` with the stored model and scale
    ///
    /// The stored scale state is reused as is, and windows use the look-back
    /// the artifact was trained with.
    pub fn predict_metric<S: ModelStore + ?Sized>(&self, store: &S, metric: &str, series: &[f64]) -> Result<Vec<PredictionRecord>> {
        let artifact = store.load(metric)?;
        let look_back = artifact.look_back();
        if look_back != self.config.look_back {
            tracing::warn!(
                metric,
                stored = look_back,
                configured = self.config.look_back,
                "using the look_back the artifact was trained with"
            );
        }

        ensure_finite(series)?;
        let scaled = artifact.scale.transform(series);
        let windows = window(&scaled, look_back);
        if windows.is_empty() {
            return Err(ForecastError::InsufficientData {
                needed: look_back + 2,
                got: series.len(),
            });
        }

        let predictions = artifact.model.predict_windows(&windows);
        let actual = artifact.scale.inverse_transform(&windows.targets);
        let predicted = artifact.scale.inverse_transform(&predictions);

        Ok(actual
            .into_iter()
            .zip(predicted)
            .enumerate()
            .map(|(i, (actual, predicted))| PredictionRecord {
                step: i + 1,
                actual,
                predicted,
            })
            .collect())
    }

    pub fn run<S, I, K, V>(&self, store: &S, metrics: I) -> PredictionReport
    where
        S: ModelStore + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[f64]>,
    {
        let mut report = PredictionReport::new();
        for (metric, series) in metrics {
            let metric = metric.as_ref();
            let outcome = self.predict_metric(store, metric, series.as_ref());
            match outcome {
                Ok(ref records) => {
                    tracing::info!(metric, records = records.len(), "predictions ready");
                }
                Err(ForecastError::ArtifactNotFound { .. }) => {
                    tracing::warn!(metric, "no trained model, no predictions");
                }
                Err(ref err) => {
                    tracing::warn!(metric, error = %err, "skipping metric");
                }
            }
            report.insert(metric, outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryModelStore;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            epochs: 3,
            batch_size: 4,
            hidden_size: 6,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn weekly(n: usize) -> Vec<f64> {
        (0..n).map(|i| 5.0 + 3.0 * ((i as f64) * 0.7).sin()).collect()
    }

    #[test]
    fn test_train_metric_stores_scale_fit_on_full_series() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut store = MemoryModelStore::new();
        let mut series = weekly(30);
        series[29] = 100.0; // held-out week sets the maximum

        let summary = pipeline.train_metric(&mut store, "downtime", &series).unwrap();

        // floor(0.8 * 30) = 24 training weeks, 6 held out
        assert_eq!(summary.train_windows, 24 - 5);
        assert_eq!(summary.test_windows, 6 - 5);
        assert_eq!(summary.scale.max, 100.0);
        assert_eq!(store.load("downtime").unwrap().scale, summary.scale);
    }

    #[test]
    fn test_short_and_constant_series_are_skipped() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut store = MemoryModelStore::new();

        let report = pipeline.run(
            &mut store,
            vec![
                ("empty", Vec::new()),
                ("flat", vec![2.0; 30]),
                ("few", weekly(10)),
                ("good", weekly(30)),
            ],
        );

        assert!(matches!(report.get("empty"), Some(Err(ForecastError::InsufficientData { needed: 6, got: 0 }))));
        assert!(matches!(report.get("flat"), Some(Err(ForecastError::DegenerateRange { .. }))));
        // 8 training weeks give 3 windows, below one batch of 4
        assert!(matches!(report.get("few"), Some(Err(ForecastError::InsufficientData { needed: 4, got: 3 }))));
        assert!(matches!(report.get("good"), Some(Ok(_))));
        assert_eq!(report.failed().count(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_non_finite_week_is_rejected_before_prediction() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut store = MemoryModelStore::new();
        pipeline.train_metric(&mut store, "failures", &weekly(30)).unwrap();

        let mut fresh = weekly(30);
        fresh[10] = f64::NAN;
        let report = PredictionPipeline::new(fast_config())
            .unwrap()
            .run(&store, vec![("failures", fresh), ("clean", weekly(30))]);

        assert!(matches!(report.get("failures"), Some(Err(ForecastError::InvalidSeries(_)))));
        assert!(report.records("failures").is_empty());

        // the export stays parseable, no null fields
        let json = crate::export::to_json_string(&report.into_export()).unwrap();
        assert!(!json.contains("null"));
        let parsed: PredictionExport = serde_json::from_str(&json).unwrap();
        assert!(parsed["failures"].is_empty());
    }

    #[test]
    fn test_prediction_uses_stored_scale() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut store = MemoryModelStore::new();
        pipeline.train_metric(&mut store, "workload", &weekly(30)).unwrap();

        let fresh: Vec<f64> = weekly(12).iter().map(|v| v * 2.0).collect();
        let records = PredictionPipeline::new(fast_config())
            .unwrap()
            .predict_metric(&store, "workload", &fresh)
            .unwrap();

        assert_eq!(records.len(), 12 - 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.step, i + 1);
            // targets survive the stored transform round trip, even out of range
            assert!((record.actual - fresh[i + 4]).abs() < 1e-9);
            assert!(record.predicted.is_finite());
        }
    }

    #[test]
    fn test_missing_artifact_yields_empty_export() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut store = MemoryModelStore::new();
        pipeline.train_metric(&mut store, "failures", &weekly(30)).unwrap();

        let report = PredictionPipeline::new(fast_config())
            .unwrap()
            .run(&store, vec![("failures", weekly(20)), ("downtime", weekly(20))]);

        assert!(matches!(report.get("downtime"), Some(Err(ForecastError::ArtifactNotFound { .. }))));
        assert_eq!(report.records("failures").len(), 15);
        assert!(report.records("downtime").is_empty());

        let export = report.into_export();
        assert_eq!(export.len(), 2);
        assert!(export["downtime"].is_empty());
        assert_eq!(export["failures"].len(), 15);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let pipeline = TrainingPipeline::new(fast_config()).unwrap();
        let mut first = MemoryModelStore::new();
        let mut second = MemoryModelStore::new();
        pipeline.train_metric(&mut first, "failures", &weekly(30)).unwrap();
        pipeline.train_metric(&mut second, "failures", &weekly(30)).unwrap();

        let predictor = PredictionPipeline::new(fast_config()).unwrap();
        let a = predictor.predict_metric(&first, "failures", &weekly(30)).unwrap();
        let b = predictor.predict_metric(&second, "failures", &weekly(30)).unwrap();
        assert_eq!(a, b);
    }
}
