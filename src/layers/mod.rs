/// Single-step LSTM cell.
pub mod lstm_cell;

/// Inverted dropout.
pub mod dropout;

/// Dense output layer.
pub mod linear;
