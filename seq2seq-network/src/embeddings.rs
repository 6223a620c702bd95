//! Token embeddings.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use seq2seq_tch_ext::PathExt;
use tch::nn::Init;
use tch::Tensor;

use crate::error::EncoderError;
use crate::layers::{Dropout, Embedding, FallibleModuleT};

/// Embedding modules that can be used by encoders.
///
/// An embedding module maps token indices of shape
/// `[seq_len, batch_size, n_features]` to dense vectors of shape
/// `[seq_len, batch_size, embedding_size]`.
pub trait Embeddings: FallibleModuleT<Error = EncoderError> {
    /// The size of a token's dense vector.
    fn embedding_size(&self) -> i64;
}

/// Word embeddings configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// Word embedding dimensionality.
    pub dims: i64,

    /// Dropout probability applied to the concatenated embeddings.
    pub dropout: f64,

    /// Dimensionality of each token feature embedding.
    pub feature_dims: i64,

    /// Vocabulary sizes of the token features that follow the word.
    pub feature_vocab_sizes: Vec<i64>,

    /// Standard deviation of the normal distribution used to initialize
    /// the embedding matrices.
    pub initializer_range: f64,

    /// Index of the padding token, shared by all vocabularies.
    pub padding_idx: Option<i64>,

    /// Word vocabulary size.
    pub vocab_size: i64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        EmbeddingsConfig {
            dims: 256,
            dropout: 0.0,
            feature_dims: 16,
            feature_vocab_sizes: Vec::new(),
            initializer_range: 1.0,
            padding_idx: None,
            vocab_size: 30000,
        }
    }
}

/// Word embeddings, optionally concatenated with token feature embeddings.
///
/// Feature 0 of the input is looked up in the word embedding matrix,
/// feature *i > 0* in the matrix of the *i*-th token feature.
#[derive(Debug)]
pub struct WordEmbeddings {
    dropout: Dropout,
    feature_embeddings: Vec<Embedding>,
    word_embeddings: Embedding,
}

impl WordEmbeddings {
    pub fn new<'a>(
        vs: impl Borrow<PathExt<'a>>,
        config: &EmbeddingsConfig,
    ) -> Result<Self, EncoderError> {
        let vs = vs.borrow();

        let normal_init = Init::Randn {
            mean: 0.,
            stdev: config.initializer_range,
        };

        let word_embeddings = Embedding::new(
            vs / "word_embeddings",
            "embeddings",
            config.vocab_size,
            config.dims,
            normal_init,
            config.padding_idx,
        )?;

        let feature_embeddings = config
            .feature_vocab_sizes
            .iter()
            .enumerate()
            .map(|(idx, &vocab_size)| {
                Embedding::new(
                    vs / format!("feature_embeddings_{}", idx),
                    "embeddings",
                    vocab_size,
                    config.feature_dims,
                    normal_init,
                    config.padding_idx,
                )
            })
            .collect::<Result<_, _>>()?;

        Ok(WordEmbeddings {
            dropout: Dropout::new(config.dropout),
            feature_embeddings,
            word_embeddings,
        })
    }

    fn n_features(&self) -> i64 {
        1 + self.feature_embeddings.len() as i64
    }
}

impl FallibleModuleT for WordEmbeddings {
    type Error = EncoderError;

    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor, Self::Error> {
        let shape = input.size();
        if shape.len() != 3 {
            return Err(EncoderError::IncorrectInputShape { shape });
        }

        if shape[2] != self.n_features() {
            return Err(EncoderError::IncorrectFeatureCount {
                expected: self.n_features(),
                got: shape[2],
            });
        }

        let word_embeddings = self
            .word_embeddings
            .forward_t(&input.f_select(2, 0)?, train)?;

        let embeddings = if self.feature_embeddings.is_empty() {
            word_embeddings
        } else {
            let mut parts = Vec::with_capacity(self.feature_embeddings.len() + 1);
            parts.push(word_embeddings);
            for (idx, embedding) in self.feature_embeddings.iter().enumerate() {
                parts.push(embedding.forward_t(&input.f_select(2, idx as i64 + 1)?, train)?);
            }
            Tensor::f_cat(&parts, 2)?
        };

        self.dropout.forward_t(&embeddings, train)
    }
}

impl Embeddings for WordEmbeddings {
    fn embedding_size(&self) -> i64 {
        self.word_embeddings.embedding_dim()
            + self
                .feature_embeddings
                .iter()
                .map(Embedding::embedding_dim)
                .sum::<i64>()
    }
}
