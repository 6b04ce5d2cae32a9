use ndarray::Array2;
use rand::Rng;

use crate::layers::dropout::Dropout;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;
use crate::windowing::Windows;

/// Values kept from a training forward pass for the backward pass
#[derive(Clone, Debug)]
pub struct SequenceModelCache {
    pub lstm: LSTMCellCache,
    pub dropout_mask: Option<Array2<f64>>,
    pub head_input: Array2<f64>,
}

#[derive(Clone, Debug)]
pub struct SequenceModelGradients {
    pub lstm: LSTMCellGradients,
    pub head: LinearGradients,
}

/// One-step-ahead regressor: LSTM → Dropout → Linear(1)
///
/// A window of `look_back` past values is presented as a single time step
/// with `look_back` features, starting from a zero hidden and cell state.
#[derive(Clone, Debug)]
pub struct SequenceModel {
    lstm: LSTMCell,
    dropout: Dropout,
    head: LinearLayer,
    pub look_back: usize,
    pub hidden_size: usize,
}

impl SequenceModel {
    pub fn new<R: Rng>(look_back: usize, hidden_size: usize, dropout_rate: f64, rng: &mut R) -> Self {
        SequenceModel {
            lstm: LSTMCell::new(look_back, hidden_size, rng),
            dropout: Dropout::new(dropout_rate),
            head: LinearLayer::new(hidden_size, 1, rng),
            look_back,
            hidden_size,
        }
    }

    /// Rebuilds a model from stored layers (used for deserialization)
    pub fn from_parts(lstm: LSTMCell, head: LinearLayer, dropout_rate: f64) -> Self {
        let mut dropout = Dropout::new(dropout_rate);
        dropout.eval();
        SequenceModel {
            look_back: lstm.input_size,
            hidden_size: lstm.hidden_size,
            lstm,
            dropout,
            head,
        }
    }

    pub fn lstm(&self) -> &LSTMCell {
        &self.lstm
    }

    pub fn head(&self) -> &LinearLayer {
        &self.head
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout.dropout_rate
    }

    pub fn is_training(&self) -> bool {
        self.dropout.is_training
    }

    pub fn train(&mut self) {
        self.dropout.train();
    }

    pub fn eval(&mut self) {
        self.dropout.eval();
    }

    pub fn num_parameters(&self) -> usize {
        self.lstm.num_parameters() + self.head.num_parameters()
    }

    /// Forward pass over a batch `(look_back, batch)` with caching for training
    pub fn forward_with_cache<R: Rng>(&self, inputs: &Array2<f64>, rng: &mut R) -> (Array2<f64>, SequenceModelCache) {
        let (hx, cx) = self.lstm.zero_state(inputs.ncols());
        let (hy, _cy, lstm_cache) = self.lstm.forward_with_cache(inputs, &hx, &cx);
        let (head_input, dropout_mask) = self.dropout.forward(&hy, rng);
        let output = self.head.forward(&head_input);

        let cache = SequenceModelCache {
            lstm: lstm_cache,
            dropout_mask,
            head_input,
        };
        (output, cache)
    }

    /// Backward pass from the loss gradient w.r.t. the `(1, batch)` output
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &SequenceModelCache) -> SequenceModelGradients {
        let (head, grad_head_input) = self.head.backward(&cache.head_input, grad_output);
        let dhy = self.dropout.backward(&grad_head_input, cache.dropout_mask.as_ref());
        let dcy = Array2::zeros(dhy.raw_dim());
        let (lstm, _dx, _dhx, _dcx) = self.lstm.backward(&dhy, &dcy, &cache.lstm);

        SequenceModelGradients { lstm, head }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &SequenceModelGradients, optimizer: &mut O) {
        optimizer.begin_step();
        self.lstm.update_parameters(&gradients.lstm, optimizer, "lstm");
        self.head.update_parameters(&gradients.head, optimizer, "dense");
    }

    /// Inference on a `(look_back, batch)` matrix; dropout is never applied
    pub fn predict(&self, inputs: &Array2<f64>) -> Array2<f64> {
        let (hx, cx) = self.lstm.zero_state(inputs.ncols());
        let (hy, _) = self.lstm.forward(inputs, &hx, &cx);
        self.head.forward(&hy)
    }

    /// Predict one normalized value per window, in window order
    pub fn predict_windows(&self, windows: &Windows) -> Vec<f64> {
        if windows.is_empty() {
            return Vec::new();
        }
        let (inputs, _) = windows.to_matrices();
        self.predict(&inputs).row(0).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windowing::window;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = SequenceModel::new(4, 50, 0.2, &mut rng);
        let inputs = Array2::from_elem((4, 16), 0.5);

        let (output, cache) = model.forward_with_cache(&inputs, &mut rng);
        assert_eq!(output.shape(), &[1, 16]);
        assert_eq!(cache.head_input.shape(), &[50, 16]);
        assert!(cache.dropout_mask.is_some());
        assert_eq!(model.num_parameters(), 4 * 50 * 4 + 4 * 50 * 50 + 4 * 50 + 50 + 1);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(12);
        let model = SequenceModel::new(4, 8, 0.5, &mut rng);
        let windows = window(&[0.0, 0.1, 0.4, 0.2, 0.9, 1.0, 0.3, 0.5], 4);

        let first = model.predict_windows(&windows);
        let second = model.predict_windows(&windows);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert!(model.predict_windows(&Windows::default()).is_empty());
    }

    #[test]
    fn test_eval_forward_matches_predict() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut model = SequenceModel::new(3, 5, 0.2, &mut rng);
        let inputs = arr2(&[[0.1, 0.9], [0.2, 0.8], [0.3, 0.7]]);

        model.eval();
        let (output, cache) = model.forward_with_cache(&inputs, &mut rng);
        assert!(cache.dropout_mask.is_none());
        assert_eq!(output, model.predict(&inputs));
    }

    #[test]
    fn test_head_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut model = SequenceModel::new(2, 3, 0.2, &mut rng);
        model.eval();
        let inputs = arr2(&[[0.4, 0.1], [0.6, 0.3]]);

        let (output, cache) = model.forward_with_cache(&inputs, &mut rng);
        let gradients = model.backward(&Array2::ones(output.raw_dim()), &cache);

        let eps = 1e-6;
        let mut plus = model.clone();
        plus.head.weight[[0, 1]] += eps;
        let mut minus = model.clone();
        minus.head.weight[[0, 1]] -= eps;
        let numeric = (plus.predict(&inputs).sum() - minus.predict(&inputs).sum()) / (2.0 * eps);
        assert!((numeric - gradients.head.weight[[0, 1]]).abs() < 1e-6);

        let mut plus = model.clone();
        plus.lstm.w_ih[[2, 0]] += eps;
        let mut minus = model.clone();
        minus.lstm.w_ih[[2, 0]] -= eps;
        let numeric = (plus.predict(&inputs).sum() - minus.predict(&inputs).sum()) / (2.0 * eps);
        assert!((numeric - gradients.lstm.w_ih[[2, 0]]).abs() < 1e-6);
    }
}
