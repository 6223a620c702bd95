//! Sequence encoders.
//!
//! An encoder maps a padded batch of token indices to a final state,
//! used to initialize a decoder, and a memory bank of per-position
//! representations, used by the decoder's attention.

use tch::Tensor;

use crate::error::EncoderError;

mod config;
pub use config::{EncoderConfig, Encoders};

mod mean;
pub use mean::{MeanEncoder, MeanEncoderConfig};

mod rnn;
pub use rnn::{RnnEncoder, RnnEncoderConfig};

/// Final state of an encoder.
///
/// Every tensor has shape `[n_layers, batch_size, hidden_size]`.
#[derive(Debug)]
pub enum EncoderState {
    /// Hidden state.
    Hidden(Tensor),

    /// Hidden and cell state, for cells that have a memory cell (LSTM).
    HiddenAndCell { hidden: Tensor, cell: Tensor },
}

impl EncoderState {
    /// Get the cell state.
    ///
    /// Returns `Some` if the state has a cell state, `None` otherwise.
    pub fn cell(&self) -> Option<&Tensor> {
        match self {
            EncoderState::Hidden(_) => None,
            EncoderState::HiddenAndCell { cell, .. } => Some(cell),
        }
    }

    /// Get the hidden state.
    pub fn hidden(&self) -> &Tensor {
        match self {
            EncoderState::Hidden(hidden) => hidden,
            EncoderState::HiddenAndCell { hidden, .. } => hidden,
        }
    }

    /// Map every tensor of the state.
    pub fn map<F>(&self, f: F) -> Result<Self, EncoderError>
    where
        F: Fn(&Tensor) -> Result<Tensor, EncoderError>,
    {
        let state = match self {
            EncoderState::Hidden(hidden) => EncoderState::Hidden(f(hidden)?),
            EncoderState::HiddenAndCell { hidden, cell } => EncoderState::HiddenAndCell {
                hidden: f(hidden)?,
                cell: f(cell)?,
            },
        };

        Ok(state)
    }
}

/// Output of an encoder.
#[derive(Debug)]
pub struct EncoderOutput {
    /// Final encoder state, used to initialize the decoder.
    pub final_state: EncoderState,

    /// Per-position representations for attention,
    /// `[seq_len, batch_size, hidden_size]`.
    pub memory_bank: Tensor,
}

impl EncoderOutput {
    /// Split into the final state and memory bank.
    pub fn into_parts(self) -> (EncoderState, Tensor) {
        (self.final_state, self.memory_bank)
    }
}

/// Encoder networks.
pub trait Encoder {
    /// Check that the input and sequence lengths are consistent.
    ///
    /// The input must have shape `[seq_len, batch_size, n_features]`,
    /// the (optional) sequence lengths must have shape `[batch_size]`.
    fn check_args(&self, input: &Tensor, lengths: Option<&Tensor>) -> Result<(), EncoderError> {
        let shape = input.size();
        if shape.len() != 3 {
            return Err(EncoderError::IncorrectInputShape { shape });
        }
        let batch_size = shape[1];

        if let Some(lengths) = lengths {
            let lengths_shape = lengths.size();
            if lengths_shape.len() != 1 {
                return Err(EncoderError::IncorrectLengthsShape {
                    shape: lengths_shape,
                });
            }

            if lengths_shape[0] != batch_size {
                return Err(EncoderError::BatchSizeMismatch {
                    batch_size,
                    n_lengths: lengths_shape[0],
                });
            }
        }

        Ok(())
    }

    /// Apply the encoder.
    ///
    /// The input is a padded batch of token indices of shape
    /// `[seq_len, batch_size, n_features]`. The optional `lengths` of shape
    /// `[batch_size]` are the lengths of the sequences without padding.
    /// `train` indicates whether the encoder is applied during training.
    fn encode(
        &self,
        input: &Tensor,
        lengths: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, EncoderError>;

    /// Dimensionality of the final state and memory bank.
    fn hidden_size(&self) -> i64;

    /// Number of layers in the final state.
    fn n_layers(&self) -> i64;
}
