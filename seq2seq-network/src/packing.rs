//! Packing of padded sequence batches.
//!
//! A packed sequence stores only the active time steps of a batch of
//! sequences, so that recurrent networks do not compute over padding.

use std::convert::TryFrom;

use tch::{Kind, Tensor};

use crate::error::EncoderError;

/// Batch of sequences compacted to their active time steps.
///
/// The time steps are stored in `data` with shape `[total_steps, dims]`,
/// ordered by time step and then by batch index. `batch_sizes[t]` is the
/// number of sequences that are active at time step *t*. Libtorch requires
/// sequences to be ordered from longest to shortest, so the batch is
/// permuted when necessary. The permutation is kept to restore the
/// caller's batch order.
#[derive(Debug)]
pub struct PackedSequence {
    batch_size: i64,
    data: Tensor,
    batch_sizes: Tensor,
    sorted_indices: Option<Tensor>,
    unsorted_indices: Option<Tensor>,
}

impl PackedSequence {
    /// Pack a padded batch.
    ///
    /// `padded` has shape `[seq_len, batch_size, dims]`, `lengths` contains
    /// the length of each sequence in the batch. Lengths do not have to
    /// be sorted.
    pub fn pack(padded: &Tensor, lengths: &[i64]) -> Result<Self, EncoderError> {
        let shape = padded.size();
        if shape.len() != 3 {
            return Err(EncoderError::IncorrectInputShape { shape });
        }
        let (seq_len, batch_size) = (shape[0], shape[1]);

        if lengths.len() as i64 != batch_size {
            return Err(EncoderError::BatchSizeMismatch {
                batch_size,
                n_lengths: lengths.len() as i64,
            });
        }

        if let Some(&length) = lengths.iter().find(|&&l| l < 1 || l > seq_len) {
            return Err(EncoderError::InvalidLength { length, seq_len });
        }

        // Stable sort, so that sequences with the same length keep their order.
        let mut order = (0..lengths.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| lengths[b].cmp(&lengths[a]));
        let sorted_lengths = order.iter().map(|&idx| lengths[idx]).collect::<Vec<_>>();

        let (sorted_indices, unsorted_indices) = if is_identity(&order) {
            (None, None)
        } else {
            let mut inverse = vec![0i64; order.len()];
            for (pos, &idx) in order.iter().enumerate() {
                inverse[idx] = pos as i64;
            }

            let order = order.iter().map(|&idx| idx as i64).collect::<Vec<_>>();
            let device = padded.device();
            (
                Some(Tensor::from_slice(&order).f_to_device(device)?),
                Some(Tensor::from_slice(&inverse).f_to_device(device)?),
            )
        };

        let sorted_padded;
        let padded = match &sorted_indices {
            Some(indices) => {
                sorted_padded = padded.f_index_select(1, indices)?;
                &sorted_padded
            }
            None => padded,
        };

        // The lengths must be a CPU tensor, regardless of the device of the data.
        let lengths = Tensor::from_slice(&sorted_lengths);
        let (data, batch_sizes) = Tensor::f_internal_pack_padded_sequence(padded, &lengths, false)?;

        Ok(PackedSequence {
            batch_size,
            data,
            batch_sizes,
            sorted_indices,
            unsorted_indices,
        })
    }

    /// Number of sequences in the batch.
    pub fn batch_size(&self) -> i64 {
        self.batch_size
    }

    /// Number of active sequences per time step.
    pub fn batch_sizes(&self) -> &Tensor {
        &self.batch_sizes
    }

    /// Packed data of shape `[total_steps, dims]`.
    pub fn data(&self) -> &Tensor {
        &self.data
    }

    /// Restore the caller's batch order of a tensor computed from the
    /// packed (sorted) batch. The batch is in dimension `dim`.
    pub fn restore_batch_order(&self, tensor: &Tensor, dim: i64) -> Result<Tensor, EncoderError> {
        match &self.unsorted_indices {
            Some(indices) => Ok(tensor.f_index_select(dim, indices)?),
            None => Ok(tensor.shallow_clone()),
        }
    }

    /// Replace the data of the packed sequence.
    ///
    /// This is used to wrap the output of a network that was applied to
    /// the packed data, which shares the batch sizes and permutation.
    pub fn with_data(&self, data: Tensor) -> Self {
        PackedSequence {
            batch_size: self.batch_size,
            data,
            batch_sizes: self.batch_sizes.shallow_clone(),
            sorted_indices: self.sorted_indices.as_ref().map(Tensor::shallow_clone),
            unsorted_indices: self.unsorted_indices.as_ref().map(Tensor::shallow_clone),
        }
    }

    /// Expand to a padded batch of shape `[total_length, batch_size, dims]`.
    ///
    /// Inactive time steps are zero. The batch is returned in the order in
    /// which it was given to [`PackedSequence::pack`].
    pub fn unpack(&self, total_length: i64) -> Result<Tensor, EncoderError> {
        let (padded, _) = Tensor::f_internal_pad_packed_sequence(
            &self.data,
            &self.batch_sizes,
            false,
            0.0,
            total_length,
        )?;

        self.restore_batch_order(&padded, 1)
    }
}

/// Copy sequence lengths to the host as a flat vector.
pub fn lengths_to_vec(lengths: &Tensor) -> Result<Vec<i64>, EncoderError> {
    let lengths = lengths
        .f_view([-1])?
        .f_to_kind(Kind::Int64)?
        .f_to_device(tch::Device::Cpu)?;
    Ok(Vec::<i64>::try_from(&lengths)?)
}

fn is_identity(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(pos, &idx)| pos == idx)
}
