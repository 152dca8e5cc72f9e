use ndarray::{s, Array2};
use rand::Rng;

use crate::layers::{apply_gradients, Gradients, RecurrentCell};
use crate::optimizers::Optimizer;

/// Per-timestep caches of both directions, each in processing order.
pub struct BidirectionalCache<C: RecurrentCell> {
    pub forward_caches: Vec<C::Cache>,
    pub backward_caches: Vec<C::Cache>,
}

/// Bidirectional recurrent encoder
///
/// The forward cell reads the window from first to last element, the backward
/// cell from last to first. Only the final hidden state of each direction is
/// kept; the two are stacked into a `(2 * hidden_size, batch)` output.
#[derive(Clone, Debug)]
pub struct Bidirectional<C: RecurrentCell> {
    pub forward_cell: C,
    pub backward_cell: C,
}

impl<C: RecurrentCell> Bidirectional<C> {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let forward_cell = C::new(input_size, hidden_size, rng);
        let backward_cell = C::new(input_size, hidden_size, rng);
        Self { forward_cell, backward_cell }
    }

    pub fn from_cells(forward_cell: C, backward_cell: C) -> Self {
        Self { forward_cell, backward_cell }
    }

    pub fn input_size(&self) -> usize {
        self.forward_cell.input_size()
    }

    pub fn hidden_size(&self) -> usize {
        self.forward_cell.hidden_size()
    }

    pub fn output_size(&self) -> usize {
        2 * self.hidden_size()
    }

    /// Stack forward and backward outputs vertically
    fn concat(forward: &Array2<f64>, backward: &Array2<f64>) -> Array2<f64> {
        let mut combined = Array2::zeros((forward.nrows() + backward.nrows(), forward.ncols()));
        combined.slice_mut(s![..forward.nrows(), ..]).assign(forward);
        combined.slice_mut(s![forward.nrows().., ..]).assign(backward);
        combined
    }

    /// Inference pass over a window given as one `(input_size, batch)` matrix per timestep.
    pub fn forward(&self, sequence: &[Array2<f64>]) -> Array2<f64> {
        let batch = sequence.first().map_or(1, |x| x.ncols());

        let mut forward_state = self.forward_cell.zero_state(batch);
        for input in sequence {
            forward_state = self.forward_cell.step(input, &forward_state);
        }

        let mut backward_state = self.backward_cell.zero_state(batch);
        for input in sequence.iter().rev() {
            backward_state = self.backward_cell.step(input, &backward_state);
        }

        Self::concat(C::hidden(&forward_state), C::hidden(&backward_state))
    }

    /// Forward pass with caching for training
    pub fn forward_with_cache(&self, sequence: &[Array2<f64>]) -> (Array2<f64>, BidirectionalCache<C>) {
        let batch = sequence.first().map_or(1, |x| x.ncols());

        let mut forward_caches = Vec::with_capacity(sequence.len());
        let mut forward_state = self.forward_cell.zero_state(batch);
        for input in sequence {
            let (next, cache) = self.forward_cell.forward_with_cache(input, &forward_state);
            forward_state = next;
            forward_caches.push(cache);
        }

        let mut backward_caches = Vec::with_capacity(sequence.len());
        let mut backward_state = self.backward_cell.zero_state(batch);
        for input in sequence.iter().rev() {
            let (next, cache) = self.backward_cell.forward_with_cache(input, &backward_state);
            backward_state = next;
            backward_caches.push(cache);
        }

        let output = Self::concat(C::hidden(&forward_state), C::hidden(&backward_state));
        (output, BidirectionalCache { forward_caches, backward_caches })
    }

    /// Backpropagation through time for both directions
    ///
    /// `d_output` is the gradient w.r.t. the concatenated output. Returns
    /// (forward_gradients, backward_gradients).
    pub fn backward(&self, d_output: &Array2<f64>, cache: &BidirectionalCache<C>) -> (C::Gradients, C::Gradients) {
        let hidden = self.hidden_size();
        let d_forward = d_output.slice(s![..hidden, ..]).to_owned();
        let d_backward = d_output.slice(s![hidden.., ..]).to_owned();

        (
            Self::backprop_direction(&self.forward_cell, d_forward, &cache.forward_caches),
            Self::backprop_direction(&self.backward_cell, d_backward, &cache.backward_caches),
        )
    }

    fn backprop_direction(cell: &C, dh_final: Array2<f64>, caches: &[C::Cache]) -> C::Gradients {
        let mut total = cell.zero_gradients();
        let mut d_state = cell.state_gradient(dh_final);

        for cache in caches.iter().rev() {
            let (step_gradients, _dx, d_prev) = cell.backward(&d_state, cache);
            total.accumulate(&step_gradients);
            d_state = d_prev;
        }

        total
    }

    pub fn update_parameters(&mut self,
                             forward_gradients: &C::Gradients,
                             backward_gradients: &C::Gradients,
                             optimizer: &mut dyn Optimizer) {
        apply_gradients(&mut self.forward_cell, forward_gradients, optimizer, "forward");
        apply_gradients(&mut self.backward_cell, backward_gradients, optimizer, "backward");
    }

    pub fn num_parameters(&self) -> usize {
        self.forward_cell.num_parameters() + self.backward_cell.num_parameters()
    }
}
