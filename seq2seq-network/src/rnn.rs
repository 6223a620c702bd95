//! Multi-layer recurrent networks.
//!
//! The Torch binding provides recurrent networks, but they cannot be
//! applied to packed sequences. This module provides a recurrent network
//! that uses the same parametrization as Torch and can be applied to both
//! padded and packed batches.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use seq2seq_tch_ext::PathExt;
use tch::nn::Init;
use tch::{Device, Kind, Tensor};

use crate::encoders::EncoderState;
use crate::error::EncoderError;
use crate::packing::PackedSequence;

/// Recurrent network cell types.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RnnType {
    /// Elman network with tanh non-linearity.
    #[serde(rename = "RNN")]
    Rnn,

    /// Long short-term memory.
    #[serde(rename = "LSTM")]
    Lstm,

    /// Gated recurrent unit.
    #[serde(rename = "GRU")]
    Gru,
}

impl RnnType {
    /// The number of gates, each gate has its own block of weights.
    fn n_gates(self) -> i64 {
        match self {
            RnnType::Rnn => 1,
            RnnType::Lstm => 4,
            RnnType::Gru => 3,
        }
    }
}

impl fmt::Display for RnnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RnnType::Rnn => "RNN",
            RnnType::Lstm => "LSTM",
            RnnType::Gru => "GRU",
        };

        f.write_str(name)
    }
}

impl FromStr for RnnType {
    type Err = EncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rnn" => Ok(RnnType::Rnn),
            "lstm" => Ok(RnnType::Lstm),
            "gru" => Ok(RnnType::Gru),
            _ => Err(EncoderError::UnknownRnnType {
                rnn_type: s.to_string(),
            }),
        }
    }
}

/// Stacked recurrent network.
///
/// Dropout is applied to the outputs of each layer, except the last
/// layer, during training.
#[derive(Debug)]
pub struct Rnn {
    dropout: f64,
    flat_weights: Vec<Tensor>,
    hidden_size: i64,
    input_size: i64,
    n_layers: i64,
    rnn_type: RnnType,
}

impl Rnn {
    pub fn new<'a>(
        vs: impl Borrow<PathExt<'a>>,
        rnn_type: RnnType,
        input_size: i64,
        hidden_size: i64,
        n_layers: i64,
        dropout: f64,
    ) -> Result<Self, EncoderError> {
        let vs = vs.borrow();

        if input_size < 1 || hidden_size < 1 || n_layers < 1 {
            return Err(EncoderError::IncorrectConfiguration(format!(
                "recurrent network sizes must be positive, got input size: {}, hidden size: {}, layers: {}",
                input_size, hidden_size, n_layers
            )));
        }

        if !(0.0..1.0).contains(&dropout) {
            return Err(EncoderError::IncorrectConfiguration(format!(
                "dropout probability must be in [0, 1), got: {}",
                dropout
            )));
        }

        let gates_size = rnn_type.n_gates() * hidden_size;
        let stdv = 1. / (hidden_size as f64).sqrt();
        let init = Init::Uniform {
            lo: -stdv,
            up: stdv,
        };

        let mut flat_weights = Vec::with_capacity(4 * n_layers as usize);
        for layer in 0..n_layers {
            let layer_input_size = if layer == 0 { input_size } else { hidden_size };

            flat_weights.push(vs.var(
                &format!("weight_ih_l{}", layer),
                &[gates_size, layer_input_size],
                init,
            )?);
            flat_weights.push(vs.var(
                &format!("weight_hh_l{}", layer),
                &[gates_size, hidden_size],
                init,
            )?);
            flat_weights.push(vs.var(&format!("bias_ih_l{}", layer), &[gates_size], init)?);
            flat_weights.push(vs.var(&format!("bias_hh_l{}", layer), &[gates_size], init)?);
        }

        Ok(Rnn {
            dropout,
            flat_weights,
            hidden_size,
            input_size,
            n_layers,
            rnn_type,
        })
    }

    /// Apply the network to a padded batch.
    ///
    /// The input has shape `[seq_len, batch_size, input_size]`. Returns the
    /// outputs of the last layer `[seq_len, batch_size, hidden_size]` and
    /// the final state of every layer.
    pub fn forward_t(
        &self,
        input: &Tensor,
        train: bool,
    ) -> Result<(Tensor, EncoderState), EncoderError> {
        let shape = input.size();
        if shape.len() != 3 {
            return Err(EncoderError::IncorrectInputShape { shape });
        }

        let h0 = self.initial_state(shape[1], (input.kind(), input.device()))?;
        let (n_layers, dropout) = (self.n_layers, self.dropout);

        match self.rnn_type {
            RnnType::Lstm => {
                let c0 = h0.f_zeros_like()?;
                let (output, hidden, cell) = Tensor::f_lstm(
                    input,
                    &[h0, c0],
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                    false,
                )?;
                Ok((output, EncoderState::HiddenAndCell { hidden, cell }))
            }
            RnnType::Gru => {
                let (output, hidden) = Tensor::f_gru(
                    input,
                    &h0,
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                    false,
                )?;
                Ok((output, EncoderState::Hidden(hidden)))
            }
            RnnType::Rnn => {
                let (output, hidden) = Tensor::f_rnn_tanh(
                    input,
                    &h0,
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                    false,
                )?;
                Ok((output, EncoderState::Hidden(hidden)))
            }
        }
    }

    /// Apply the network to a packed batch.
    ///
    /// Returns the packed outputs of the last layer and the final state
    /// of every layer. The final state of a sequence is the state at its
    /// last active time step. The final state is in the batch order of
    /// the padded batch that was packed.
    pub fn forward_packed_t(
        &self,
        input: &PackedSequence,
        train: bool,
    ) -> Result<(PackedSequence, EncoderState), EncoderError> {
        let data = input.data();
        let h0 = self.initial_state(input.batch_size(), (data.kind(), data.device()))?;
        let batch_sizes = input.batch_sizes();
        let (n_layers, dropout) = (self.n_layers, self.dropout);

        let (output, state) = match self.rnn_type {
            RnnType::Lstm => {
                let c0 = h0.f_zeros_like()?;
                let (output, hidden, cell) = Tensor::f_lstm_data(
                    data,
                    batch_sizes,
                    &[h0, c0],
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                )?;
                (output, EncoderState::HiddenAndCell { hidden, cell })
            }
            RnnType::Gru => {
                let (output, hidden) = Tensor::f_gru_data(
                    data,
                    batch_sizes,
                    &h0,
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                )?;
                (output, EncoderState::Hidden(hidden))
            }
            RnnType::Rnn => {
                let (output, hidden) = Tensor::f_rnn_tanh_data(
                    data,
                    batch_sizes,
                    &h0,
                    &self.flat_weights,
                    true,
                    n_layers,
                    dropout,
                    train,
                    false,
                )?;
                (output, EncoderState::Hidden(hidden))
            }
        };

        let state = state.map(|t| input.restore_batch_order(t, 1))?;

        Ok((input.with_data(output), state))
    }

    pub fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    pub fn input_size(&self) -> i64 {
        self.input_size
    }

    pub fn n_layers(&self) -> i64 {
        self.n_layers
    }

    pub fn rnn_type(&self) -> RnnType {
        self.rnn_type
    }

    fn initial_state(
        &self,
        batch_size: i64,
        options: (Kind, Device),
    ) -> Result<Tensor, EncoderError> {
        Ok(Tensor::f_zeros(
            &[self.n_layers, batch_size, self.hidden_size],
            options,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::convert::TryInto;

    use approx::assert_abs_diff_eq;
    use maplit::btreeset;
    use ndarray::ArrayD;
    use seq2seq_tch_ext::RootExt;
    use tch::nn::VarStore;
    use tch::{Device, Kind, Tensor};

    use super::{Rnn, RnnType};
    use crate::encoders::EncoderState;
    use crate::error::EncoderError;
    use crate::packing::PackedSequence;

    fn to_array(t: &Tensor) -> ArrayD<f32> {
        t.try_into().unwrap()
    }

    fn rnn(vs: &VarStore, rnn_type: RnnType, n_layers: i64) -> Rnn {
        Rnn::new(vs.root_ext(|_| 0).sub("rnn"), rnn_type, 3, 5, n_layers, 0.).unwrap()
    }

    #[test]
    fn rnn_type_from_str() {
        assert_eq!("LSTM".parse::<RnnType>().unwrap(), RnnType::Lstm);
        assert_eq!("gru".parse::<RnnType>().unwrap(), RnnType::Gru);
        assert_eq!("Rnn".parse::<RnnType>().unwrap(), RnnType::Rnn);
        assert!(matches!(
            "SRU".parse::<RnnType>(),
            Err(EncoderError::UnknownRnnType { rnn_type }) if rnn_type == "SRU"
        ));
    }

    #[test]
    fn rnn_type_serializes_to_torch_names() {
        assert_eq!(serde_json::to_string(&RnnType::Lstm).unwrap(), r#""LSTM""#);
        assert_eq!(
            serde_json::from_str::<RnnType>(r#""GRU""#).unwrap(),
            RnnType::Gru
        );
        assert_eq!(RnnType::Rnn.to_string(), "RNN");
    }

    #[test]
    fn rnn_names_and_shapes() {
        let vs = VarStore::new(Device::Cpu);
        rnn(&vs, RnnType::Lstm, 2);

        let variables = vs.variables();
        assert_eq!(
            variables.keys().cloned().collect::<BTreeSet<_>>(),
            btreeset![
                "rnn.bias_hh_l0".to_string(),
                "rnn.bias_hh_l1".to_string(),
                "rnn.bias_ih_l0".to_string(),
                "rnn.bias_ih_l1".to_string(),
                "rnn.weight_hh_l0".to_string(),
                "rnn.weight_hh_l1".to_string(),
                "rnn.weight_ih_l0".to_string(),
                "rnn.weight_ih_l1".to_string(),
            ]
        );

        assert_eq!(variables["rnn.weight_ih_l0"].size(), &[20, 3]);
        assert_eq!(variables["rnn.weight_ih_l1"].size(), &[20, 5]);
        assert_eq!(variables["rnn.weight_hh_l1"].size(), &[20, 5]);
        assert_eq!(variables["rnn.bias_ih_l1"].size(), &[20]);
    }

    #[test]
    fn rnn_rejects_incorrect_configuration() {
        let vs = VarStore::new(Device::Cpu);
        let root = vs.root_ext(|_| 0);
        assert!(matches!(
            Rnn::new(root.sub("rnn"), RnnType::Gru, 3, 0, 1, 0.),
            Err(EncoderError::IncorrectConfiguration(_))
        ));
        assert!(matches!(
            Rnn::new(root.sub("rnn"), RnnType::Gru, 3, 5, 0, 0.),
            Err(EncoderError::IncorrectConfiguration(_))
        ));
        assert!(matches!(
            Rnn::new(root.sub("rnn"), RnnType::Gru, 3, 5, 1, 1.),
            Err(EncoderError::IncorrectConfiguration(_))
        ));
    }

    #[test]
    fn padded_output_shapes() {
        tch::manual_seed(42);

        for &rnn_type in &[RnnType::Rnn, RnnType::Lstm, RnnType::Gru] {
            let vs = VarStore::new(Device::Cpu);
            let rnn = rnn(&vs, rnn_type, 2);

            let input = Tensor::randn(&[4, 2, 3], (Kind::Float, Device::Cpu));
            let (output, state) = rnn.forward_t(&input, false).unwrap();

            assert_eq!(output.size(), &[4, 2, 5]);
            assert_eq!(state.hidden().size(), &[2, 2, 5]);
            assert_eq!(
                state.cell().map(Tensor::size),
                if rnn_type == RnnType::Lstm {
                    Some(vec![2, 2, 5])
                } else {
                    None
                }
            );
        }
    }

    #[test]
    fn final_state_is_last_output() {
        tch::manual_seed(42);

        let vs = VarStore::new(Device::Cpu);
        let rnn = rnn(&vs, RnnType::Gru, 1);

        let input = Tensor::randn(&[4, 2, 3], (Kind::Float, Device::Cpu));
        let (output, state) = rnn.forward_t(&input, false).unwrap();

        assert_abs_diff_eq!(
            to_array(&output.get(3)),
            to_array(&state.hidden().get(0)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn packed_final_state_is_last_active_output() {
        tch::manual_seed(42);

        let vs = VarStore::new(Device::Cpu);
        let rnn = rnn(&vs, RnnType::Lstm, 1);

        let input = Tensor::randn(&[4, 2, 3], (Kind::Float, Device::Cpu));
        let packed = PackedSequence::pack(&input, &[2, 4]).unwrap();
        let (output, state) = rnn.forward_packed_t(&packed, false).unwrap();
        let output = output.unpack(4).unwrap();

        assert!(matches!(state, EncoderState::HiddenAndCell { .. }));

        let hidden = state.hidden().get(0);
        assert_abs_diff_eq!(
            to_array(&output.get(1).get(0)),
            to_array(&hidden.get(0)),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            to_array(&output.get(3).get(1)),
            to_array(&hidden.get(1)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn packing_does_not_change_active_outputs() {
        tch::manual_seed(42);

        let vs = VarStore::new(Device::Cpu);
        let rnn = rnn(&vs, RnnType::Rnn, 2);

        let input = Tensor::randn(&[4, 2, 3], (Kind::Float, Device::Cpu));
        let (padded_output, _) = rnn.forward_t(&input, false).unwrap();

        let packed = PackedSequence::pack(&input, &[2, 4]).unwrap();
        let (packed_output, _) = rnn.forward_packed_t(&packed, false).unwrap();
        let packed_output = packed_output.unpack(4).unwrap();

        // Padding only follows the active time steps, so it cannot
        // influence them.
        assert_abs_diff_eq!(
            to_array(&packed_output.narrow(0, 0, 2)),
            to_array(&padded_output.narrow(0, 0, 2)),
            epsilon = 1e-5
        );
        assert_abs_diff_eq!(
            to_array(&packed_output.select(1, 1)),
            to_array(&padded_output.select(1, 1)),
            epsilon = 1e-5
        );

        // Padding time steps are zero after unpacking.
        assert_abs_diff_eq!(
            to_array(&packed_output.narrow(0, 2, 2).select(1, 0)),
            ArrayD::<f32>::zeros(vec![2, 5])
        );
    }
}
