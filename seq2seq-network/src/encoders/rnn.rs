use std::borrow::Borrow;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use seq2seq_tch_ext::PathExt;
use tch::Tensor;

use crate::embeddings::Embeddings;
use crate::encoders::{Encoder, EncoderOutput};
use crate::error::EncoderError;
use crate::layers::FallibleModuleT;
use crate::packing::{lengths_to_vec, PackedSequence};
use crate::rnn::{Rnn, RnnType};

/// Recurrent encoder configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RnnEncoderConfig {
    /// Dropout probability between stacked layers.
    pub dropout: f64,
    pub hidden_size: i64,
    pub n_layers: i64,
    pub rnn_type: RnnType,
}

impl Default for RnnEncoderConfig {
    fn default() -> Self {
        RnnEncoderConfig {
            dropout: 0.3,
            hidden_size: 512,
            n_layers: 2,
            rnn_type: RnnType::Lstm,
        }
    }
}

/// Recurrent encoder over token embeddings.
///
/// When sequence lengths are given, the embedded batch is packed, so that
/// the recurrent network does not process padding. The memory bank is
/// always returned in padded form, with zeros at padding positions.
#[derive(Debug)]
pub struct RnnEncoder<E> {
    embeddings: Arc<E>,
    no_pack_padded_seq: bool,
    rnn: Rnn,
}

impl<E> RnnEncoder<E>
where
    E: Embeddings,
{
    /// Construct a recurrent encoder.
    ///
    /// The input size of the recurrent network is the embedding size of
    /// `embeddings`. The embeddings are shared with the caller.
    pub fn new<'a>(
        vs: impl Borrow<PathExt<'a>>,
        config: &RnnEncoderConfig,
        embeddings: Arc<E>,
    ) -> Result<Self, EncoderError> {
        let vs = vs.borrow();

        let rnn = Rnn::new(
            vs / "rnn",
            config.rnn_type,
            embeddings.embedding_size(),
            config.hidden_size,
            config.n_layers,
            config.dropout,
        )?;

        Ok(RnnEncoder {
            embeddings,
            no_pack_padded_seq: false,
            rnn,
        })
    }

    /// Enable or disable packing of padded sequences.
    ///
    /// If packing is disabled, the recurrent network is also applied to
    /// padding positions, even when sequence lengths are given.
    pub fn with_packing(mut self, pack_padded_seq: bool) -> Self {
        self.no_pack_padded_seq = !pack_padded_seq;
        self
    }

    /// The embeddings used by this encoder.
    pub fn embeddings(&self) -> &Arc<E> {
        &self.embeddings
    }

    pub fn rnn_type(&self) -> RnnType {
        self.rnn.rnn_type()
    }
}

impl<E> Encoder for RnnEncoder<E>
where
    E: Embeddings,
{
    fn encode(
        &self,
        input: &Tensor,
        lengths: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, EncoderError> {
        let start = Instant::now();

        self.check_args(input, lengths)?;

        let embeddings = self.embeddings.forward_t(input, train)?;
        let seq_len = input.size()[0];

        let lengths = match lengths {
            Some(lengths) if !self.no_pack_padded_seq => Some(lengths_to_vec(lengths)?),
            _ => None,
        };

        let (memory_bank, final_state) = match &lengths {
            Some(lengths) => {
                let packed = PackedSequence::pack(&embeddings, lengths)?;
                let (output, final_state) = self.rnn.forward_packed_t(&packed, train)?;
                (output.unpack(seq_len)?, final_state)
            }
            None => self.rnn.forward_t(&embeddings, train)?,
        };

        log::debug!(
            "Encoded {} sequences with length {} (packed: {}) in {}ms",
            input.size()[1],
            seq_len,
            lengths.is_some(),
            start.elapsed().as_millis()
        );

        Ok(EncoderOutput {
            final_state,
            memory_bank,
        })
    }

    fn hidden_size(&self) -> i64 {
        self.rnn.hidden_size()
    }

    fn n_layers(&self) -> i64 {
        self.rnn.n_layers()
    }
}
