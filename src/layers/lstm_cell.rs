use ndarray::{s, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::layers::{CellKind, Gradients, Parameters, RecurrentCell};
use crate::utils::{sigmoid, tanh_grad_from_output};

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

impl Gradients for LSTMCellGradients {
    fn tensors(&self) -> Vec<&Array2<f64>> {
        vec![&self.w_ih, &self.w_hh, &self.b_ih, &self.b_hh]
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.w_ih, &mut self.w_hh, &mut self.b_ih, &mut self.b_hh]
    }
}

/// Hidden and cell state of one LSTM timestep, each `(hidden_size, batch)`.
#[derive(Clone, Debug)]
pub struct LSTMState {
    pub h: Array2<f64>,
    pub c: Array2<f64>,
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub tanh_cy: Array2<f64>,
}

/// LSTM cell with trainable parameters
///
/// Implements the standard LSTM equations on a batch of column vectors:
/// - i_t = σ(W_xi * x_t + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * x_t + W_hf * h_t-1 + b_f)
/// - g_t = tanh(W_xg * x_t + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * x_t + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub w_ih: Array2<f64>,  // input-to-hidden weights (4*hidden_size, input_size)
    pub w_hh: Array2<f64>,  // hidden-to-hidden weights (4*hidden_size, hidden_size)
    pub b_ih: Array2<f64>,  // input-to-hidden bias (4*hidden_size, 1)
    pub b_hh: Array2<f64>,  // hidden-to-hidden bias (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
}

impl Parameters for LSTMCell {
    fn parameters(&self) -> Vec<(&'static str, &Array2<f64>)> {
        vec![("w_ih", &self.w_ih), ("w_hh", &self.w_hh), ("b_ih", &self.b_ih), ("b_hh", &self.b_hh)]
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Array2<f64>)> {
        vec![
            ("w_ih", &mut self.w_ih),
            ("w_hh", &mut self.w_hh),
            ("b_ih", &mut self.b_ih),
            ("b_hh", &mut self.b_hh),
        ]
    }
}

impl RecurrentCell for LSTMCell {
    type State = LSTMState;
    type Cache = LSTMCellCache;
    type Gradients = LSTMCellGradients;

    const KIND: CellKind = CellKind::Lstm;

    /// Uniform(-0.1, 0.1) weights, zero biases except the forget gate, which starts at 1.
    fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-0.1, 0.1);

        let w_ih = Array2::random_using((4 * hidden_size, input_size), dist, rng);
        let w_hh = Array2::random_using((4 * hidden_size, hidden_size), dist, rng);
        let mut b_ih = Array2::zeros((4 * hidden_size, 1));
        let b_hh = Array2::zeros((4 * hidden_size, 1));
        b_ih.slice_mut(s![hidden_size..2 * hidden_size, ..]).fill(1.0);

        LSTMCell { w_ih, w_hh, b_ih, b_hh, input_size, hidden_size }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn zero_state(&self, batch_size: usize) -> LSTMState {
        LSTMState {
            h: Array2::zeros((self.hidden_size, batch_size)),
            c: Array2::zeros((self.hidden_size, batch_size)),
        }
    }

    fn hidden(state: &LSTMState) -> &Array2<f64> {
        &state.h
    }

    fn state_gradient(&self, dh: Array2<f64>) -> LSTMState {
        let c = Array2::zeros(dh.raw_dim());
        LSTMState { h: dh, c }
    }

    fn forward_with_cache(&self, input: &Array2<f64>, state: &LSTMState) -> (LSTMState, LSTMCellCache) {
        let h = self.hidden_size;

        // Compute all gates in one product: [input_gate, forget_gate, cell_gate, output_gate]
        let gates = &self.w_ih.dot(input) + &self.b_ih + &self.w_hh.dot(&state.h) + &self.b_hh;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(f64::tanh);
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        // Cell state update: f_t ⊙ c_t-1 + i_t ⊙ g_t
        let cy = &forget_gate * &state.c + &input_gate * &cell_gate;
        let tanh_cy = cy.mapv(f64::tanh);

        // Hidden state: o_t ⊙ tanh(c_t)
        let hy = &output_gate * &tanh_cy;

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: state.h.clone(),
            cx: state.c.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            tanh_cy,
        };

        (LSTMState { h: hy, c: cy }, cache)
    }

    fn backward(&self, d_state: &LSTMState, cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, LSTMState) {
        let h = self.hidden_size;
        let batch = d_state.h.ncols();
        let dhy = &d_state.h;

        // Output gate gradients: ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let do_raw = dhy * &cache.tanh_cy * &cache.output_gate * &cache.output_gate.mapv(|x| 1.0 - x);

        // Cell state gradients from both tanh and direct paths
        let dcy_total = &d_state.c + &(dhy * &cache.output_gate * &cache.tanh_cy.mapv(tanh_grad_from_output));

        // Forget gate gradients: ∂L/∂f_t = ∂L/∂c_t ⊙ c_t-1
        let df_raw = &dcy_total * &cache.cx * &cache.forget_gate * &cache.forget_gate.mapv(|x| 1.0 - x);

        // Input gate gradients: ∂L/∂i_t = ∂L/∂c_t ⊙ g_t
        let di_raw = &dcy_total * &cache.cell_gate * &cache.input_gate * &cache.input_gate.mapv(|x| 1.0 - x);

        // Cell gate gradients: ∂L/∂g_t = ∂L/∂c_t ⊙ i_t
        let dg_raw = &dcy_total * &cache.input_gate * &cache.cell_gate.mapv(tanh_grad_from_output);

        // Same row order as the forward gate block
        let mut dgates: Array2<f64> = Array2::zeros((4 * h, batch));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        let db = dgates.sum_axis(Axis(1)).insert_axis(Axis(1));
        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            b_ih: db.clone(),
            b_hh: db,
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dcy_total * &cache.forget_gate;

        (gradients, dx, LSTMState { h: dhx, c: dcx })
    }

    fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }
}
