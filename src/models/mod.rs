/// LSTM regressor used for every metric.
pub mod sequence_model;
