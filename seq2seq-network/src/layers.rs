//! Basic neural network modules.
//!
//! These are modules that are not provided by the Torch binding, or where
//! different behavior is required from the modules.

use std::borrow::Borrow;
use std::fmt::Debug;

use seq2seq_tch_ext::PathExt;
use tch::nn::Init;
use tch::Tensor;

use crate::error::EncoderError;

/// Module for which a computation can fail.
///
/// `train` indicates whether the module is applied during training,
/// which enables e.g. dropout.
pub trait FallibleModuleT: Debug + Send {
    /// The error type.
    type Error;

    /// Apply the module.
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor, Self::Error>;
}

/// Dropout layer.
///
/// This layer zeros out random elements of a tensor with probability
/// *p* during training.
#[derive(Debug)]
pub struct Dropout {
    p: f64,
}

impl Dropout {
    /// Drop out elements with probability *p*.
    pub fn new(p: f64) -> Self {
        Dropout { p }
    }
}

impl FallibleModuleT for Dropout {
    type Error = EncoderError;

    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor, Self::Error> {
        if self.p == 0. {
            return Ok(input.shallow_clone());
        }

        Ok(input.f_dropout(self.p, train)?)
    }
}

/// Embedding lookup layer.
///
/// If a padding index is given, the embedding of that index is
/// initialized to zeros and does not receive gradients.
#[derive(Debug)]
pub struct Embedding {
    embeddings: Tensor,
    padding_idx: Option<i64>,
}

impl Embedding {
    pub fn new<'a>(
        vs: impl Borrow<PathExt<'a>>,
        name: &str,
        num_embeddings: i64,
        embedding_dim: i64,
        init: Init,
        padding_idx: Option<i64>,
    ) -> Result<Self, EncoderError> {
        if let Some(idx) = padding_idx {
            if idx < 0 || idx >= num_embeddings {
                return Err(EncoderError::IncorrectConfiguration(format!(
                    "padding index {} is not in [0, {})",
                    idx, num_embeddings
                )));
            }
        }

        let embeddings = vs
            .borrow()
            .var(name, &[num_embeddings, embedding_dim], init)?;

        if let Some(idx) = padding_idx {
            tch::no_grad(|| embeddings.f_get(idx)?.f_zero_().map(|_| ()))?;
        }

        Ok(Embedding {
            embeddings,
            padding_idx,
        })
    }

    pub fn embedding_dim(&self) -> i64 {
        self.embeddings.size()[1]
    }
}

impl FallibleModuleT for Embedding {
    type Error = EncoderError;

    fn forward_t(&self, input: &Tensor, _train: bool) -> Result<Tensor, Self::Error> {
        Ok(Tensor::f_embedding(
            &self.embeddings,
            input,
            self.padding_idx.unwrap_or(-1),
            false,
            false,
        )?)
    }
}
