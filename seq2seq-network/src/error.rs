use tch::TchError;
use thiserror::Error;

/// Encoder errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncoderError {
    /// The number of sequence lengths differs from the batch size.
    #[error("batch size ({batch_size:?}) does not match the number of sequence lengths ({n_lengths:?})")]
    BatchSizeMismatch {
        /// Batch size of the input.
        batch_size: i64,

        /// Number of sequence lengths.
        n_lengths: i64,
    },

    /// The encoder configuration is invalid.
    #[error("illegal configuration: {0}")]
    IncorrectConfiguration(String),

    /// The input does not have the expected number of features.
    #[error("expected input with {expected:?} features, got {got:?}")]
    IncorrectFeatureCount { expected: i64, got: i64 },

    /// The input is not of the shape `[seq_len, batch_size, n_features]`.
    #[error("expected input of shape [seq_len, batch_size, n_features], got {shape:?}")]
    IncorrectInputShape { shape: Vec<i64> },

    /// The sequence lengths are not a vector.
    #[error("expected sequence lengths of shape [batch_size], got {shape:?}")]
    IncorrectLengthsShape { shape: Vec<i64> },

    /// A sequence length is outside `[1, seq_len]`.
    #[error("sequence length {length:?} is not in [1, {seq_len:?}]")]
    InvalidLength { length: i64, seq_len: i64 },

    /// Torch error.
    #[error(transparent)]
    Tch(#[from] TchError),

    /// The recurrent network type is unknown.
    #[error("unknown recurrent network type: {rnn_type:?}")]
    UnknownRnnType { rnn_type: String },
}
