use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::loss::{LossFunction, MSELoss};
use crate::models::sequence_model::{SequenceModel, SequenceModelGradients};
use crate::optimizers::{Adam, Optimizer};
use crate::windowing::Windows;

/// Configuration for training hyperparameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub clip_gradient: Option<f64>,
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for TrainingConfig {
    fn from(config: &PipelineConfig) -> Self {
        TrainingConfig {
            epochs: config.epochs,
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            clip_gradient: config.clip_gradient,
            log_every: config.log_every,
        }
    }
}

/// Training metrics tracked per epoch
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub time_elapsed: f64,
}

/// Mini-batch trainer for a `SequenceModel`
///
/// Runs a fixed number of epochs with no early stopping; the weights after
/// the last epoch are the result.
pub struct Trainer<L: LossFunction, O: Optimizer> {
    pub model: SequenceModel,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
    rng: StdRng,
}

impl<L: LossFunction, O: Optimizer> Trainer<L, O> {
    pub fn new(model: SequenceModel, loss_function: L, optimizer: O, rng: StdRng) -> Self {
        Trainer {
            model,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
            rng,
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// One optimisation step on a batch; returns the batch loss
    pub fn train_batch(&mut self, inputs: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let (outputs, cache) = self.model.forward_with_cache(inputs, &mut self.rng);
        let loss = self.loss_function.compute_loss(&outputs, targets);
        let grad_output = self.loss_function.compute_gradient(&outputs, targets);

        let mut gradients = self.model.backward(&grad_output, &cache);

        if let Some(clip_value) = self.config.clip_gradient {
            clip_gradients(&mut gradients, clip_value);
        }

        self.model.update_parameters(&gradients, &mut self.optimizer);
        loss
    }

    /// Train on `windows` for the configured number of epochs
    ///
    /// Fails with `InsufficientData` when there is less than one full batch.
    pub fn fit(&mut self, windows: &Windows) -> Result<()> {
        let n = windows.len();
        if n == 0 || n < self.config.batch_size {
            return Err(ForecastError::InsufficientData {
                needed: self.config.batch_size.max(1),
                got: n,
            });
        }
        if windows.look_back() != self.model.look_back {
            return Err(ForecastError::InvalidSeries(format!(
                "window width {} does not match model look_back {}",
                windows.look_back(),
                self.model.look_back
            )));
        }

        tracing::debug!(
            windows = n,
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            "starting training"
        );

        self.model.train();
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            if self.config.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.config.batch_size) {
                let (inputs, targets) = windows.select(batch);
                epoch_loss += self.train_batch(&inputs, &targets) * batch.len() as f64;
            }
            epoch_loss /= n as f64;

            let metrics = TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                time_elapsed: start_time.elapsed().as_secs_f64(),
            };

            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                tracing::debug!(
                    epoch,
                    loss = metrics.train_loss,
                    elapsed = metrics.time_elapsed,
                    "epoch finished"
                );
            }
            self.metrics_history.push(metrics);
        }

        self.model.eval();
        Ok(())
    }

    /// Mean loss over `windows` in evaluation mode
    pub fn evaluate(&self, windows: &Windows) -> Option<f64> {
        if windows.is_empty() {
            return None;
        }
        let (inputs, targets) = windows.to_matrices();
        let outputs = self.model.predict(&inputs);
        Some(self.loss_function.compute_loss(&outputs, &targets))
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }

    pub fn into_model(self) -> SequenceModel {
        self.model
    }
}

/// Clip each gradient matrix to `max_norm`
fn clip_gradients(gradients: &mut SequenceModelGradients, max_norm: f64) {
    for matrix in [
        &mut gradients.lstm.w_ih,
        &mut gradients.lstm.w_hh,
        &mut gradients.lstm.bias,
        &mut gradients.head.weight,
        &mut gradients.head.bias,
    ] {
        clip_gradient_matrix(matrix, max_norm);
    }
}

fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

/// Create the reference trainer: MSE loss and Adam
pub fn create_trainer(model: SequenceModel, config: &PipelineConfig, rng: StdRng) -> Trainer<MSELoss, Adam> {
    Trainer::new(model, MSELoss, Adam::new(config.learning_rate), rng)
        .with_config(TrainingConfig::from(config))
}
