use std::borrow::Borrow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use seq2seq_tch_ext::PathExt;
use tch::Tensor;

use crate::embeddings::Embeddings;
use crate::encoders::{
    Encoder, EncoderOutput, MeanEncoder, MeanEncoderConfig, RnnEncoder, RnnEncoderConfig,
};
use crate::error::EncoderError;

/// Encoder configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncoderConfig {
    /// Mean of the token embeddings.
    Mean(MeanEncoderConfig),

    /// Recurrent network over the token embeddings.
    Rnn(RnnEncoderConfig),
}

/// Encoder selected by configuration.
#[derive(Debug)]
pub enum Encoders<E> {
    Mean(MeanEncoder<E>),
    Rnn(RnnEncoder<E>),
}

impl<E> Encoders<E>
where
    E: Embeddings,
{
    /// Construct the encoder described by `config`.
    pub fn new<'a>(
        vs: impl Borrow<PathExt<'a>>,
        config: &EncoderConfig,
        embeddings: Arc<E>,
    ) -> Result<Self, EncoderError> {
        let vs = vs.borrow();

        let encoder = match config {
            EncoderConfig::Mean(config) => Encoders::Mean(MeanEncoder::new(config, embeddings)?),
            EncoderConfig::Rnn(config) => Encoders::Rnn(RnnEncoder::new(vs, config, embeddings)?),
        };

        Ok(encoder)
    }
}

impl<E> Encoder for Encoders<E>
where
    E: Embeddings,
{
    fn encode(
        &self,
        input: &Tensor,
        lengths: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, EncoderError> {
        match self {
            Encoders::Mean(encoder) => encoder.encode(input, lengths, train),
            Encoders::Rnn(encoder) => encoder.encode(input, lengths, train),
        }
    }

    fn hidden_size(&self) -> i64 {
        match self {
            Encoders::Mean(encoder) => encoder.hidden_size(),
            Encoders::Rnn(encoder) => encoder.hidden_size(),
        }
    }

    fn n_layers(&self) -> i64 {
        match self {
            Encoders::Mean(encoder) => encoder.n_layers(),
            Encoders::Rnn(encoder) => encoder.n_layers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use seq2seq_tch_ext::RootExt;
    use tch::nn::VarStore;
    use tch::{Device, Kind, Tensor};

    use super::{EncoderConfig, Encoders};
    use crate::embeddings::{EmbeddingsConfig, WordEmbeddings};
    use crate::encoders::{Encoder, MeanEncoderConfig, RnnEncoderConfig};
    use crate::rnn::RnnType;

    fn embeddings(vs: &VarStore) -> Arc<WordEmbeddings> {
        Arc::new(
            WordEmbeddings::new(
                vs.root_ext(|_| 0).sub("embeddings"),
                &EmbeddingsConfig {
                    dims: 8,
                    vocab_size: 10,
                    ..EmbeddingsConfig::default()
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn config_from_json() {
        let config: EncoderConfig = serde_json::from_str(
            r#"{"type": "rnn", "rnn_type": "GRU", "hidden_size": 32, "n_layers": 1}"#,
        )
        .unwrap();

        assert_eq!(
            config,
            EncoderConfig::Rnn(RnnEncoderConfig {
                hidden_size: 32,
                n_layers: 1,
                rnn_type: RnnType::Gru,
                ..RnnEncoderConfig::default()
            })
        );

        let config: EncoderConfig = serde_json::from_str(r#"{"type": "mean"}"#).unwrap();
        assert_eq!(config, EncoderConfig::Mean(MeanEncoderConfig::default()));
    }

    #[test]
    fn config_rejects_unknown_rnn_type() {
        assert!(serde_json::from_str::<EncoderConfig>(r#"{"type": "rnn", "rnn_type": "SRU"}"#)
            .is_err());
    }

    #[test]
    fn encoders_dispatch_to_configured_encoder() {
        tch::manual_seed(42);

        let vs = VarStore::new(Device::Cpu);
        let embeddings = embeddings(&vs);
        let root = vs.root_ext(|_| 0);

        let rnn = Encoders::new(
            root.sub("rnn_encoder"),
            &EncoderConfig::Rnn(RnnEncoderConfig {
                dropout: 0.,
                hidden_size: 16,
                n_layers: 2,
                rnn_type: RnnType::Gru,
            }),
            embeddings.clone(),
        )
        .unwrap();
        let mean = Encoders::new(
            root.sub("mean_encoder"),
            &EncoderConfig::Mean(MeanEncoderConfig { n_layers: 2 }),
            embeddings,
        )
        .unwrap();

        let input = Tensor::randint(10, &[4, 2, 1], (Kind::Int64, Device::Cpu));
        let lengths = Tensor::from_slice(&[4i64, 2]);

        for (encoder, hidden_size) in &[(rnn, 16), (mean, 8)] {
            assert_eq!(encoder.hidden_size(), *hidden_size);
            assert_eq!(encoder.n_layers(), 2);

            let output = encoder.encode(&input, Some(&lengths), false).unwrap();
            assert_eq!(output.memory_bank.size(), &[4, 2, *hidden_size]);
            assert_eq!(output.final_state.hidden().size(), &[2, 2, *hidden_size]);
        }
    }
}
