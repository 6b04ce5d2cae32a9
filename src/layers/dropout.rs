use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Inverted dropout applied to the recurrent layer's output
///
/// In training mode each element is zeroed with probability `dropout_rate`
/// and the survivors are scaled by `1 / (1 - dropout_rate)`. In evaluation
/// mode the input passes through unchanged.
#[derive(Clone, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
    pub is_training: bool,
}

impl Dropout {
    /// # Panics
    ///
    /// Panics if `dropout_rate` is outside `[0.0, 1.0)`. Pipeline configs and
    /// stored models are validated before a layer is built.
    pub fn new(dropout_rate: f64) -> Self {
        assert!((0.0..1.0).contains(&dropout_rate),
                "Dropout rate must be in [0.0, 1.0)");

        Dropout {
            dropout_rate,
            is_training: true,
        }
    }

    pub fn train(&mut self) {
        self.is_training = true;
    }

    pub fn eval(&mut self) {
        self.is_training = false;
    }

    fn keep_prob(&self) -> f64 {
        1.0 - self.dropout_rate
    }

    /// Returns the output and the mask used, `None` when nothing was dropped
    pub fn forward<R: Rng>(&self, input: &Array2<f64>, rng: &mut R) -> (Array2<f64>, Option<Array2<f64>>) {
        if !self.is_training || self.dropout_rate == 0.0 {
            return (input.clone(), None);
        }

        let keep_prob = self.keep_prob();
        let mask = Array2::random_using(input.raw_dim(), Uniform::new(0.0, 1.0), rng)
            .mapv(|x| if x < keep_prob { 1.0 } else { 0.0 });

        (input * &mask / keep_prob, Some(mask))
    }

    pub fn backward(&self, grad_output: &Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => grad_output * mask / self.keep_prob(),
            None => grad_output.clone(),
        }
    }
}
