use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

use crate::embeddings::Embeddings;
use crate::encoders::{Encoder, EncoderOutput, EncoderState};
use crate::error::EncoderError;
use crate::layers::FallibleModuleT;
use crate::packing::lengths_to_vec;

/// Mean encoder configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MeanEncoderConfig {
    /// Number of times the final state is repeated, to initialize
    /// a decoder with this number of layers.
    pub n_layers: i64,
}

impl Default for MeanEncoderConfig {
    fn default() -> Self {
        MeanEncoderConfig { n_layers: 1 }
    }
}

/// Encoder that averages token embeddings.
///
/// The memory bank consists of the embeddings; the final state is the
/// mean of the embeddings of the active time steps.
#[derive(Debug)]
pub struct MeanEncoder<E> {
    embeddings: Arc<E>,
    n_layers: i64,
}

impl<E> MeanEncoder<E>
where
    E: Embeddings,
{
    pub fn new(config: &MeanEncoderConfig, embeddings: Arc<E>) -> Result<Self, EncoderError> {
        if config.n_layers < 1 {
            return Err(EncoderError::IncorrectConfiguration(format!(
                "number of layers must be positive, got: {}",
                config.n_layers
            )));
        }

        Ok(MeanEncoder {
            embeddings,
            n_layers: config.n_layers,
        })
    }
}

impl<E> Encoder for MeanEncoder<E>
where
    E: Embeddings,
{
    fn encode(
        &self,
        input: &Tensor,
        lengths: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, EncoderError> {
        self.check_args(input, lengths)?;

        let embeddings = self.embeddings.forward_t(input, train)?;
        let kind = embeddings.kind();
        let device = embeddings.device();
        let seq_len = input.size()[0];

        let (memory_bank, mean) = match lengths {
            Some(lengths) => {
                let lengths = lengths_to_vec(lengths)?;
                if let Some(&length) = lengths.iter().find(|&&l| l < 1 || l > seq_len) {
                    return Err(EncoderError::InvalidLength { length, seq_len });
                }

                let lengths = Tensor::from_slice(&lengths).f_to_device(device)?;

                // [seq_len, batch_size, 1]
                let mask = Tensor::f_arange(seq_len, (Kind::Int64, device))?
                    .f_unsqueeze(1)?
                    .f_lt_tensor(&lengths.f_unsqueeze(0)?)?
                    .f_unsqueeze(-1)?
                    .f_to_kind(kind)?;

                let memory_bank = embeddings.f_mul(&mask)?;
                let mean = memory_bank
                    .f_sum_dim_intlist(&[0i64][..], false, kind)?
                    .f_div(&lengths.f_unsqueeze(1)?.f_to_kind(kind)?)?;

                (memory_bank, mean)
            }
            None => {
                let mean = embeddings.f_mean_dim(&[0i64][..], false, kind)?;
                (embeddings, mean)
            }
        };

        let hidden = mean.f_unsqueeze(0)?.f_repeat(&[self.n_layers, 1, 1])?;

        Ok(EncoderOutput {
            final_state: EncoderState::Hidden(hidden),
            memory_bank,
        })
    }

    fn hidden_size(&self) -> i64 {
        self.embeddings.embedding_size()
    }

    fn n_layers(&self) -> i64 {
        self.n_layers
    }
}
