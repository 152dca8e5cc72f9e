//! Building blocks of the bidirectional sequence model.
//!
//! Every layer works on column-major batches: one sample per column, so a
//! batch of `B` one-hot inputs over a vocabulary of `V` IDs is a `(V, B)`
//! matrix.

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::optimizers::Optimizer;

pub mod bidirectional;
pub mod dropout;
pub mod gru_cell;
pub mod linear;
pub mod lstm_cell;

/// Recurrent variant used by both directions of the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Lstm,
    Gru,
}

impl CellKind {
    pub fn name(&self) -> &'static str {
        match self {
            CellKind::Lstm => "LSTM",
            CellKind::Gru => "GRU",
        }
    }
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Named trainable matrices of a layer.
///
/// The order of `parameters` and `parameters_mut` must match the order of the
/// layer's gradient tensors.
pub trait Parameters {
    fn parameters(&self) -> Vec<(&'static str, &Array2<f64>)>;

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Array2<f64>)>;

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|(_, p)| p.len()).sum()
    }
}

/// Gradient container that mirrors a layer's parameter list.
pub trait Gradients {
    fn tensors(&self) -> Vec<&Array2<f64>>;

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f64>>;

    /// Element-wise `self += other`
    fn accumulate(&mut self, other: &Self)
    where
        Self: Sized,
    {
        for (total, step) in self.tensors_mut().into_iter().zip(other.tensors()) {
            *total += step;
        }
    }

    /// Rescales every matrix whose L2 norm exceeds `max_norm`.
    fn clip(&mut self, max_norm: f64) {
        for tensor in self.tensors_mut() {
            let norm = tensor.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > max_norm {
                let scale = max_norm / norm;
                tensor.mapv_inplace(|x| x * scale);
            }
        }
    }
}

/// Applies `gradients` to `layer` through the optimizer, one matrix at a time.
///
/// Parameter ids are `"{prefix}_{name}"` so optimizer state stays separate per
/// layer.
pub fn apply_gradients<P, G>(layer: &mut P, gradients: &G, optimizer: &mut dyn Optimizer, prefix: &str)
where
    P: Parameters + ?Sized,
    G: Gradients + ?Sized,
{
    for ((name, param), grad) in layer.parameters_mut().into_iter().zip(gradients.tensors()) {
        optimizer.update(&format!("{}_{}", prefix, name), param, grad);
    }
}

/// A single recurrent step function with hand-written backpropagation.
///
/// `State` is what flows between timesteps (hidden and, for LSTM, cell
/// state). The same type carries the state gradient during BPTT.
pub trait RecurrentCell: Parameters + Clone {
    type State: Clone;
    type Cache;
    type Gradients: Gradients + Clone;

    const KIND: CellKind;

    fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self;

    fn input_size(&self) -> usize;

    fn hidden_size(&self) -> usize;

    fn zero_state(&self, batch_size: usize) -> Self::State;

    fn hidden(state: &Self::State) -> &Array2<f64>;

    /// Lifts a gradient w.r.t. the emitted hidden state into a full state gradient.
    fn state_gradient(&self, dh: Array2<f64>) -> Self::State;

    fn forward_with_cache(&self, input: &Array2<f64>, state: &Self::State) -> (Self::State, Self::Cache);

    /// Returns (parameter_gradients, input_gradient, previous_state_gradient)
    fn backward(&self, d_state: &Self::State, cache: &Self::Cache) -> (Self::Gradients, Array2<f64>, Self::State);

    fn zero_gradients(&self) -> Self::Gradients;

    fn step(&self, input: &Array2<f64>, state: &Self::State) -> Self::State {
        self.forward_with_cache(input, state).0
    }
}
