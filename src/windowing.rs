//! Fixed-width input windows with one-step-ahead targets.

use ndarray::Array2;

/// Input windows paired with the value that follows each of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Windows {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl Windows {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Width of each input window, 0 when there are no windows.
    pub fn look_back(&self) -> usize {
        self.inputs.first().map_or(0, |w| w.len())
    }

    /// Stack the windows column-wise: inputs `(look_back, N)`, targets `(1, N)`.
    pub fn to_matrices(&self) -> (Array2<f64>, Array2<f64>) {
        let look_back = self.look_back();
        let n = self.len();
        let inputs = Array2::from_shape_fn((look_back, n), |(row, col)| self.inputs[col][row]);
        let targets = Array2::from_shape_fn((1, n), |(_, col)| self.targets[col]);
        (inputs, targets)
    }

    /// Select the windows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> (Array2<f64>, Array2<f64>) {
        let look_back = self.look_back();
        let inputs = Array2::from_shape_fn((look_back, indices.len()), |(row, col)| {
            self.inputs[indices[col]][row]
        });
        let targets = Array2::from_shape_fn((1, indices.len()), |(_, col)| self.targets[indices[col]]);
        (inputs, targets)
    }
}

/// Slide a `look_back`-wide window over `series`.
///
/// Window `i` covers `series[i..i + look_back]` and its target is
/// `series[i + look_back]`. A series of length `n` yields
/// `n - look_back - 1` windows, so the final value is never a target.
pub fn window(series: &[f64], look_back: usize) -> Windows {
    let count = series.len().saturating_sub(look_back + 1);
    let mut windows = Windows {
        inputs: Vec::with_capacity(count),
        targets: Vec::with_capacity(count),
    };

    for i in 0..count {
        windows.inputs.push(series[i..i + look_back].to_vec());
        windows.targets.push(series[i + look_back]);
    }

    windows
}

/// Split a series in time order: the first `floor(ratio * n)` values train,
/// the remainder is held out.
pub fn chronological_split(series: &[f64], ratio: f64) -> (&[f64], &[f64]) {
    let train_len = ((series.len() as f64) * ratio).floor() as usize;
    series.split_at(train_len.min(series.len()))
}
