//! Encoders for sequence-to-sequence networks.
//!
//! An encoder maps a padded batch of token index sequences to a final
//! state and a memory bank of per-position hidden states. See
//! [`encoders::RnnEncoder`] for the recurrent encoder.

pub mod embeddings;

pub mod encoders;

pub mod error;
pub use error::EncoderError;

pub mod layers;

pub mod packing;

pub mod rnn;
